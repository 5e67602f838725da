//! Trellis Store
//!
//! This crate provides the storage trait and implementations for workflow
//! definitions, workflow runs, and task run logs. Data is persisted to SQLite,
//! or kept in memory for tests and throwaway runs.
//!
//! The [`Store`] trait defines operations for:
//! - Persisting and looking up workflow definitions (and project display names)
//! - Creating and finishing workflow runs
//! - Appending and updating task run logs
//!
//! Writes are insert or update only; nothing is ever deleted. Each row is
//! keyed independently so concurrent branches of one run can append logs
//! without coordinating.

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{Project, RunStatus, TaskLogStatus, TaskRunLog, WorkflowRecord, WorkflowRun};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A record with the same key already exists.
  #[error("already exists: {0}")]
  Conflict(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Running migrations failed.
  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}

impl Error {
  pub fn is_not_found(&self) -> bool {
    matches!(self, Error::NotFound(_))
  }
}

/// Storage trait for workflow definitions and run history.
#[async_trait]
pub trait Store: Send + Sync {
  /// Persist a new workflow definition.
  async fn put_workflow(&self, workflow: &WorkflowRecord) -> Result<(), Error>;

  /// Get a workflow definition by ID.
  async fn get_workflow(&self, workflow_id: &str) -> Result<WorkflowRecord, Error>;

  /// List workflow definitions belonging to a project.
  async fn list_workflows(&self, project_id: &str) -> Result<Vec<WorkflowRecord>, Error>;

  /// Persist a project's display record.
  async fn put_project(&self, project: &Project) -> Result<(), Error>;

  /// Get a project by ID.
  async fn get_project(&self, project_id: &str) -> Result<Project, Error>;

  /// Create a new workflow run.
  async fn create_run(&self, run: &WorkflowRun) -> Result<(), Error>;

  /// Get a workflow run by ID.
  async fn get_run(&self, run_id: &str) -> Result<WorkflowRun, Error>;

  /// Set the terminal status of a workflow run.
  async fn finish_run(
    &self,
    run_id: &str,
    status: RunStatus,
    end_date: DateTime<Utc>,
  ) -> Result<(), Error>;

  /// List runs for a workflow, newest first.
  async fn list_runs(&self, workflow_id: &str) -> Result<Vec<WorkflowRun>, Error>;

  /// Create a new task run log.
  async fn create_task_log(&self, log: &TaskRunLog) -> Result<(), Error>;

  /// Update a task run log in place.
  async fn update_task_log(&self, log: &TaskRunLog) -> Result<(), Error>;

  /// List task run logs for a run, in start order.
  async fn list_task_logs(&self, run_id: &str) -> Result<Vec<TaskRunLog>, Error>;
}
