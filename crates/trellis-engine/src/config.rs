use std::num::NonZeroUsize;
use std::time::Duration;

/// Limits applied to every run an engine drives.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
  /// Longest a single task may run before it is treated as a fault.
  pub task_timeout: Option<Duration>,
  /// Longest a whole run may take before it is marked `FAILED`.
  pub run_timeout: Option<Duration>,
  /// Cap on concurrently executing nodes within one run. Unbounded if unset.
  pub max_parallel_tasks: Option<NonZeroUsize>,
}
