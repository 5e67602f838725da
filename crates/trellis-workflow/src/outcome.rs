//! Mapping from a task's exit code to the outcome that selects its branch.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The outcome a finished task resolves to.
///
/// Declaration order is the serialization order of branch maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
  OnCompletion,
  OnFailure,
  OnSuccess,
  Unknown,
}

impl TriggerOutcome {
  pub const ALL: [TriggerOutcome; 4] = [
    TriggerOutcome::OnCompletion,
    TriggerOutcome::OnFailure,
    TriggerOutcome::OnSuccess,
    TriggerOutcome::Unknown,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      TriggerOutcome::OnCompletion => "on_completion",
      TriggerOutcome::OnFailure => "on_failure",
      TriggerOutcome::OnSuccess => "on_success",
      TriggerOutcome::Unknown => "unknown",
    }
  }

  /// Whether the engine follows branches keyed by this outcome.
  pub fn routes(&self) -> bool {
    !matches!(self, TriggerOutcome::Unknown)
  }
}

impl fmt::Display for TriggerOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Returned when a string is not in the outcome vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown trigger outcome: {0}")]
pub struct UnknownOutcome(pub String);

impl FromStr for TriggerOutcome {
  type Err = UnknownOutcome;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    TriggerOutcome::ALL
      .into_iter()
      .find(|outcome| outcome.as_str() == s)
      .ok_or_else(|| UnknownOutcome(s.to_string()))
  }
}

/// Translate a task's exit code into its trigger outcome.
///
/// `0` is completion, `1` failure, `2` success; anything else is `Unknown`.
pub fn map_outcome(exit_code: i32) -> TriggerOutcome {
  match exit_code {
    0 => TriggerOutcome::OnCompletion,
    1 => TriggerOutcome::OnFailure,
    2 => TriggerOutcome::OnSuccess,
    _ => TriggerOutcome::Unknown,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_canonical_exit_codes() {
    assert_eq!(map_outcome(0), TriggerOutcome::OnCompletion);
    assert_eq!(map_outcome(1), TriggerOutcome::OnFailure);
    assert_eq!(map_outcome(2), TriggerOutcome::OnSuccess);
    assert_eq!(map_outcome(99), TriggerOutcome::Unknown);
  }

  #[test]
  fn test_mapping_is_total() {
    for code in [i32::MIN, -1, 3, 127, 255, i32::MAX] {
      assert_eq!(map_outcome(code), TriggerOutcome::Unknown);
    }
  }

  #[test]
  fn test_parse_round_trips_names() {
    for outcome in TriggerOutcome::ALL {
      assert_eq!(outcome.as_str().parse::<TriggerOutcome>(), Ok(outcome));
    }
    assert!("on_retry".parse::<TriggerOutcome>().is_err());
  }

  #[test]
  fn test_serde_uses_snake_case() {
    let json = serde_json::to_string(&TriggerOutcome::OnSuccess).unwrap();
    assert_eq!(json, "\"on_success\"");
  }

  #[test]
  fn test_unknown_does_not_route() {
    assert!(!TriggerOutcome::Unknown.routes());
    assert!(TriggerOutcome::OnFailure.routes());
  }
}
