use serde::{Deserialize, Serialize};

/// Metadata stored next to a task's script as `task.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskManifest {
  /// Display name shown in run logs.
  pub name: String,

  #[serde(default)]
  pub description: String,

  /// Script file name, relative to the task directory.
  pub script: String,

  /// Interpreter used to run the script. Falls back to the registry default.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub interpreter: Option<String>,
}
