use thiserror::Error;

/// Errors that prevent a task from producing an exit code.
///
/// A script that runs and exits non-zero is not an error; these are
/// failures of the platform to run it at all.
#[derive(Debug, Error)]
pub enum TaskError {
  /// No task is registered under this id.
  #[error("task not found: {task_id}")]
  NotFound { task_id: String },

  /// A task or environment id that does not name a single directory entry.
  #[error("invalid {kind} id: '{id}'")]
  InvalidId { kind: &'static str, id: String },

  /// The task manifest could not be parsed.
  #[error("invalid manifest for task '{task_id}': {source}")]
  InvalidManifest {
    task_id: String,
    #[source]
    source: serde_json::Error,
  },

  /// The named environment does not exist.
  #[error("environment not found: {environment_id}")]
  EnvironmentNotFound { environment_id: String },

  /// The environment file could not be read.
  #[error("invalid environment '{environment_id}': {source}")]
  InvalidEnvironment {
    environment_id: String,
    #[source]
    source: dotenvy::Error,
  },

  /// The script process could not be started or awaited.
  #[error("failed to launch task '{task_id}': {source}")]
  Launch {
    task_id: String,
    #[source]
    source: std::io::Error,
  },

  /// IO error when reading task files.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}
