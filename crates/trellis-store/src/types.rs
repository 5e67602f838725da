use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

/// Status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
  Executing,
  Completed,
  Failed,
}

impl RunStatus {
  pub fn is_terminal(&self) -> bool {
    !matches!(self, RunStatus::Executing)
  }
}

/// Status of a task run log: in progress, or the outcome the task resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum TaskLogStatus {
  #[serde(rename = "IN_PROGRESS")]
  #[sqlx(rename = "IN_PROGRESS")]
  InProgress,
  #[serde(rename = "on_completion")]
  #[sqlx(rename = "on_completion")]
  OnCompletion,
  #[serde(rename = "on_failure")]
  #[sqlx(rename = "on_failure")]
  OnFailure,
  #[serde(rename = "on_success")]
  #[sqlx(rename = "on_success")]
  OnSuccess,
  #[serde(rename = "unknown")]
  #[sqlx(rename = "unknown")]
  Unknown,
}

/// A workflow definition as stored in the database.
///
/// The task tree is kept as an opaque JSON blob; decoding it is the
/// repository's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WorkflowRecord {
  pub workflow_id: String,
  pub name: String,
  pub project_id: String,
  pub environment_id: String,
  pub scheduler_detail: Option<Json<serde_json::Value>>,
  pub tasks: Json<serde_json::Value>,
  pub created_at: DateTime<Utc>,
}

/// A project's display record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Project {
  pub project_id: String,
  pub name: String,
}

/// A workflow run as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WorkflowRun {
  pub run_id: String,
  pub workflow_id: String,
  pub status: RunStatus,
  pub start_date: DateTime<Utc>,
  pub end_date: Option<DateTime<Utc>>,
}

/// One executed task node within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TaskRunLog {
  pub id: String,
  pub run_id: String,
  pub task_id: String,
  pub node_id: String,
  pub status: TaskLogStatus,
  pub start_date: DateTime<Utc>,
  pub end_date: Option<DateTime<Utc>>,
  pub error: Option<String>,
}
