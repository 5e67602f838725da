//! Error types for workflow execution.

use std::time::Duration;

use thiserror::Error;
use trellis_task_runtime::TaskError;
use trellis_workflow::{FlatTreeError, ValidationErrors};

/// An infrastructure failure during a run.
///
/// A task exiting with a failure code is not a fault; it is branching data.
/// Faults are the only thing that marks a run `FAILED`.
#[derive(Debug, Error)]
pub enum EngineFault {
  /// The task registry could not run the task.
  #[error("task '{task_id}' could not run at node '{node_id}': {source}")]
  Task {
    node_id: String,
    task_id: String,
    #[source]
    source: TaskError,
  },

  /// The task did not finish within the per-task timeout.
  #[error("task '{task_id}' at node '{node_id}' timed out after {timeout:?}")]
  TaskTimeout {
    node_id: String,
    task_id: String,
    timeout: Duration,
  },

  /// The run did not finish within the per-run timeout.
  #[error("run timed out after {timeout:?}")]
  RunTimeout { timeout: Duration },

  /// The run was cancelled by its caller.
  #[error("run cancelled")]
  Cancelled,

  /// A ledger write failed.
  #[error("ledger write failed: {0}")]
  Store(#[from] trellis_store::Error),

  /// A node execution panicked or was aborted.
  #[error("node execution aborted: {message}")]
  Join { message: String },
}

/// Errors returned to the caller of an execution.
#[derive(Debug, Error)]
pub enum ExecutionError {
  /// The run could not be created, so no run exists.
  #[error("failed to start run: {0}")]
  Store(#[from] trellis_store::Error),

  /// The run was created and then faulted. It is recorded as `FAILED`.
  #[error("run {run_id} failed: {fault}")]
  Faulted {
    run_id: String,
    #[source]
    fault: EngineFault,
  },
}

impl ExecutionError {
  /// The id of the failed run, if one was created.
  pub fn run_id(&self) -> Option<&str> {
    match self {
      ExecutionError::Faulted { run_id, .. } => Some(run_id),
      ExecutionError::Store(_) => None,
    }
  }

  /// The fault that ended the run, if one was created.
  pub fn fault(&self) -> Option<&EngineFault> {
    match self {
      ExecutionError::Faulted { fault, .. } => Some(fault),
      ExecutionError::Store(_) => None,
    }
  }
}

/// Errors from workflow definition storage.
#[derive(Debug, Error)]
pub enum RepositoryError {
  /// The submitted task tree failed validation.
  #[error("invalid workflow: {0}")]
  Invalid(#[from] ValidationErrors),

  /// No workflow has this id.
  #[error("workflow not found: {workflow_id}")]
  NotFound { workflow_id: String },

  /// A stored task tree could not be decoded.
  #[error("stored workflow '{workflow_id}' is corrupt: {source}")]
  Corrupt {
    workflow_id: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("stored task tree of workflow '{workflow_id}' is broken")]
  CorruptTree {
    workflow_id: String,
    #[source]
    source: FlatTreeError,
  },

  /// The task tree could not be encoded for storage.
  #[error("failed to encode workflow: {0}")]
  Encode(#[from] serde_json::Error),

  #[error(transparent)]
  Store(#[from] trellis_store::Error),
}

/// Errors surfaced by [`WorkflowService`](crate::WorkflowService).
#[derive(Debug, Error)]
pub enum ServiceError {
  #[error(transparent)]
  Repository(#[from] RepositoryError),

  #[error(transparent)]
  Execution(#[from] ExecutionError),

  #[error(transparent)]
  Store(#[from] trellis_store::Error),
}

impl ServiceError {
  /// Whether the caller asked for something that does not exist.
  pub fn is_not_found(&self) -> bool {
    match self {
      ServiceError::Repository(RepositoryError::NotFound { .. }) => true,
      ServiceError::Repository(RepositoryError::Store(e)) | ServiceError::Store(e) => {
        e.is_not_found()
      }
      _ => false,
    }
  }

  /// Whether the caller submitted an invalid workflow.
  pub fn is_invalid(&self) -> bool {
    matches!(self, ServiceError::Repository(RepositoryError::Invalid(_)))
  }
}
