use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::{Error, Project, RunStatus, Store, TaskRunLog, WorkflowRecord, WorkflowRun};

/// SQLite-based store implementation.
#[derive(Debug, Clone)]
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Connect to the database at `url`, creating the file if needed, and run
  /// migrations.
  pub async fn connect(url: &str) -> Result<Self, Error> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Open a migrated in-memory database.
  ///
  /// Every connection to `sqlite::memory:` sees its own database, so the pool
  /// is pinned to a single connection.
  pub async fn in_memory() -> Result<Self, Error> {
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect("sqlite::memory:")
      .await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await
  }
}

/// Map a unique-key violation to [`Error::Conflict`].
fn insert_error(key: &str, err: sqlx::Error) -> Error {
  match &err {
    sqlx::Error::Database(db) if db.is_unique_violation() => Error::Conflict(key.to_string()),
    _ => Error::Database(err),
  }
}

#[async_trait]
impl Store for SqliteStore {
  async fn put_workflow(&self, workflow: &WorkflowRecord) -> Result<(), Error> {
    sqlx::query(
      r#"
      INSERT INTO workflows (workflow_id, name, project_id, environment_id, scheduler_detail, tasks, created_at)
      VALUES (?, ?, ?, ?, ?, ?, ?)
      "#,
    )
    .bind(&workflow.workflow_id)
    .bind(&workflow.name)
    .bind(&workflow.project_id)
    .bind(&workflow.environment_id)
    .bind(&workflow.scheduler_detail)
    .bind(&workflow.tasks)
    .bind(workflow.created_at)
    .execute(&self.pool)
    .await
    .map_err(|e| insert_error(&workflow.workflow_id, e))?;

    Ok(())
  }

  async fn get_workflow(&self, workflow_id: &str) -> Result<WorkflowRecord, Error> {
    sqlx::query_as(
      r#"
      SELECT workflow_id, name, project_id, environment_id, scheduler_detail, tasks, created_at
      FROM workflows
      WHERE workflow_id = ?
      "#,
    )
    .bind(workflow_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("workflow {}", workflow_id)))
  }

  async fn list_workflows(&self, project_id: &str) -> Result<Vec<WorkflowRecord>, Error> {
    let workflows = sqlx::query_as(
      r#"
      SELECT workflow_id, name, project_id, environment_id, scheduler_detail, tasks, created_at
      FROM workflows
      WHERE project_id = ?
      ORDER BY created_at ASC
      "#,
    )
    .bind(project_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(workflows)
  }

  async fn put_project(&self, project: &Project) -> Result<(), Error> {
    sqlx::query("INSERT INTO projects (project_id, name) VALUES (?, ?)")
      .bind(&project.project_id)
      .bind(&project.name)
      .execute(&self.pool)
      .await
      .map_err(|e| insert_error(&project.project_id, e))?;

    Ok(())
  }

  async fn get_project(&self, project_id: &str) -> Result<Project, Error> {
    sqlx::query_as("SELECT project_id, name FROM projects WHERE project_id = ?")
      .bind(project_id)
      .fetch_optional(&self.pool)
      .await?
      .ok_or_else(|| Error::NotFound(format!("project {}", project_id)))
  }

  async fn create_run(&self, run: &WorkflowRun) -> Result<(), Error> {
    sqlx::query(
      r#"
      INSERT INTO workflow_runs (run_id, workflow_id, status, start_date, end_date)
      VALUES (?, ?, ?, ?, ?)
      "#,
    )
    .bind(&run.run_id)
    .bind(&run.workflow_id)
    .bind(run.status)
    .bind(run.start_date)
    .bind(run.end_date)
    .execute(&self.pool)
    .await
    .map_err(|e| insert_error(&run.run_id, e))?;

    Ok(())
  }

  async fn get_run(&self, run_id: &str) -> Result<WorkflowRun, Error> {
    sqlx::query_as(
      r#"
      SELECT run_id, workflow_id, status, start_date, end_date
      FROM workflow_runs
      WHERE run_id = ?
      "#,
    )
    .bind(run_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("run {}", run_id)))
  }

  async fn finish_run(
    &self,
    run_id: &str,
    status: RunStatus,
    end_date: DateTime<Utc>,
  ) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
      UPDATE workflow_runs
      SET status = ?, end_date = ?
      WHERE run_id = ?
      "#,
    )
    .bind(status)
    .bind(end_date)
    .bind(run_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(format!("run {}", run_id)));
    }
    Ok(())
  }

  async fn list_runs(&self, workflow_id: &str) -> Result<Vec<WorkflowRun>, Error> {
    let runs = sqlx::query_as(
      r#"
      SELECT run_id, workflow_id, status, start_date, end_date
      FROM workflow_runs
      WHERE workflow_id = ?
      ORDER BY start_date DESC
      "#,
    )
    .bind(workflow_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(runs)
  }

  async fn create_task_log(&self, log: &TaskRunLog) -> Result<(), Error> {
    sqlx::query(
      r#"
      INSERT INTO task_run_logs (id, run_id, task_id, node_id, status, start_date, end_date, error)
      VALUES (?, ?, ?, ?, ?, ?, ?, ?)
      "#,
    )
    .bind(&log.id)
    .bind(&log.run_id)
    .bind(&log.task_id)
    .bind(&log.node_id)
    .bind(log.status)
    .bind(log.start_date)
    .bind(log.end_date)
    .bind(&log.error)
    .execute(&self.pool)
    .await
    .map_err(|e| insert_error(&log.id, e))?;

    Ok(())
  }

  async fn update_task_log(&self, log: &TaskRunLog) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
      UPDATE task_run_logs
      SET status = ?, end_date = ?, error = ?
      WHERE id = ?
      "#,
    )
    .bind(log.status)
    .bind(log.end_date)
    .bind(&log.error)
    .bind(&log.id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(format!("task log {}", log.id)));
    }
    Ok(())
  }

  async fn list_task_logs(&self, run_id: &str) -> Result<Vec<TaskRunLog>, Error> {
    let logs = sqlx::query_as(
      r#"
      SELECT id, run_id, task_id, node_id, status, start_date, end_date, error
      FROM task_run_logs
      WHERE run_id = ?
      ORDER BY start_date ASC, rowid ASC
      "#,
    )
    .bind(run_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(logs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::TaskLogStatus;
  use sqlx::types::Json;

  fn workflow(id: &str, project_id: &str) -> WorkflowRecord {
    WorkflowRecord {
      workflow_id: id.to_string(),
      name: format!("workflow {}", id),
      project_id: project_id.to_string(),
      environment_id: "env-1".to_string(),
      scheduler_detail: Some(Json(serde_json::json!({ "cron": "0 * * * *" }))),
      tasks: Json(serde_json::json!({ "node_id": "n1", "task_id": "t1" })),
      created_at: Utc::now(),
    }
  }

  fn run(run_id: &str, workflow_id: &str) -> WorkflowRun {
    WorkflowRun {
      run_id: run_id.to_string(),
      workflow_id: workflow_id.to_string(),
      status: RunStatus::Executing,
      start_date: Utc::now(),
      end_date: None,
    }
  }

  fn task_log(id: &str, run_id: &str) -> TaskRunLog {
    TaskRunLog {
      id: id.to_string(),
      run_id: run_id.to_string(),
      task_id: "t1".to_string(),
      node_id: format!("node-{}", id),
      status: TaskLogStatus::InProgress,
      start_date: Utc::now(),
      end_date: None,
      error: None,
    }
  }

  #[tokio::test]
  async fn test_workflow_round_trip() {
    let store = SqliteStore::in_memory().await.unwrap();
    let record = workflow("wf-1", "proj-1");
    store.put_workflow(&record).await.unwrap();

    let loaded = store.get_workflow("wf-1").await.unwrap();
    assert_eq!(loaded.name, record.name);
    assert_eq!(loaded.tasks, record.tasks);
    assert_eq!(loaded.scheduler_detail, record.scheduler_detail);
  }

  #[tokio::test]
  async fn test_list_workflows_filters_by_project() {
    let store = SqliteStore::in_memory().await.unwrap();
    store.put_workflow(&workflow("wf-1", "proj-1")).await.unwrap();
    store.put_workflow(&workflow("wf-2", "proj-2")).await.unwrap();
    store.put_workflow(&workflow("wf-3", "proj-1")).await.unwrap();

    let listed = store.list_workflows("proj-1").await.unwrap();
    let ids: Vec<_> = listed.iter().map(|w| w.workflow_id.as_str()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&"wf-1"));
    assert!(ids.contains(&"wf-3"));
  }

  #[tokio::test]
  async fn test_duplicate_workflow_conflicts() {
    let store = SqliteStore::in_memory().await.unwrap();
    store.put_workflow(&workflow("wf-1", "proj-1")).await.unwrap();

    let err = store.put_workflow(&workflow("wf-1", "proj-1")).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
  }

  #[tokio::test]
  async fn test_missing_records_are_not_found() {
    let store = SqliteStore::in_memory().await.unwrap();

    assert!(store.get_workflow("nope").await.unwrap_err().is_not_found());
    assert!(store.get_run("nope").await.unwrap_err().is_not_found());
    assert!(store.get_project("nope").await.unwrap_err().is_not_found());
    assert!(
      store
        .finish_run("nope", RunStatus::Failed, Utc::now())
        .await
        .unwrap_err()
        .is_not_found()
    );
  }

  #[tokio::test]
  async fn test_run_lifecycle() {
    let store = SqliteStore::in_memory().await.unwrap();
    store.create_run(&run("run-1", "wf-1")).await.unwrap();

    let end = Utc::now();
    store
      .finish_run("run-1", RunStatus::Completed, end)
      .await
      .unwrap();

    let loaded = store.get_run("run-1").await.unwrap();
    assert_eq!(loaded.status, RunStatus::Completed);
    assert!(loaded.end_date.is_some());
  }

  #[tokio::test]
  async fn test_task_log_update_in_place() {
    let store = SqliteStore::in_memory().await.unwrap();
    store.create_run(&run("run-1", "wf-1")).await.unwrap();

    let mut log = task_log("log-1", "run-1");
    store.create_task_log(&log).await.unwrap();
    store.create_task_log(&task_log("log-2", "run-1")).await.unwrap();
    store.create_task_log(&task_log("log-3", "run-2")).await.unwrap();

    log.status = TaskLogStatus::OnFailure;
    log.end_date = Some(Utc::now());
    store.update_task_log(&log).await.unwrap();

    let logs = store.list_task_logs("run-1").await.unwrap();
    assert_eq!(logs.len(), 2);
    let updated = logs.iter().find(|l| l.id == "log-1").unwrap();
    assert_eq!(updated.status, TaskLogStatus::OnFailure);
    assert!(updated.end_date.is_some());
  }

  #[tokio::test]
  async fn test_project_round_trip() {
    let store = SqliteStore::in_memory().await.unwrap();
    let project = Project {
      project_id: "proj-1".to_string(),
      name: "Field Ops".to_string(),
    };
    store.put_project(&project).await.unwrap();

    assert_eq!(store.get_project("proj-1").await.unwrap(), project);
  }
}
