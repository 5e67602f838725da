use async_trait::async_trait;

use crate::error::TaskError;

/// A task's raw completion signal.
pub type ExitCode = i32;

/// Registry that knows how to run tasks.
#[async_trait]
pub trait TaskRegistry: Send + Sync {
  /// Run a task in the given environment and return its exit code.
  async fn run_task(&self, task_id: &str, environment_id: &str) -> Result<ExitCode, TaskError>;

  /// Human-readable name of a task, if the registry knows it.
  async fn task_name(&self, _task_id: &str) -> Option<String> {
    None
  }
}
