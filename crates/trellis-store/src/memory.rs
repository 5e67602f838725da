use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{Error, Project, RunStatus, Store, TaskRunLog, WorkflowRecord, WorkflowRun};

#[derive(Debug, Default)]
struct State {
  workflows: Vec<WorkflowRecord>,
  projects: HashMap<String, Project>,
  runs: Vec<WorkflowRun>,
  task_logs: Vec<TaskRunLog>,
}

/// In-memory store implementation.
///
/// Suitable for tests and one-off runs where history does not need to
/// outlive the process. Records are scanned and filtered, never indexed.
#[derive(Debug, Default)]
pub struct MemoryStore {
  state: RwLock<State>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn put_workflow(&self, workflow: &WorkflowRecord) -> Result<(), Error> {
    let mut state = self.state.write().await;
    if state
      .workflows
      .iter()
      .any(|w| w.workflow_id == workflow.workflow_id)
    {
      return Err(Error::Conflict(workflow.workflow_id.clone()));
    }
    state.workflows.push(workflow.clone());
    Ok(())
  }

  async fn get_workflow(&self, workflow_id: &str) -> Result<WorkflowRecord, Error> {
    let state = self.state.read().await;
    state
      .workflows
      .iter()
      .find(|w| w.workflow_id == workflow_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(format!("workflow {}", workflow_id)))
  }

  async fn list_workflows(&self, project_id: &str) -> Result<Vec<WorkflowRecord>, Error> {
    let state = self.state.read().await;
    Ok(
      state
        .workflows
        .iter()
        .filter(|w| w.project_id == project_id)
        .cloned()
        .collect(),
    )
  }

  async fn put_project(&self, project: &Project) -> Result<(), Error> {
    let mut state = self.state.write().await;
    if state.projects.contains_key(&project.project_id) {
      return Err(Error::Conflict(project.project_id.clone()));
    }
    state
      .projects
      .insert(project.project_id.clone(), project.clone());
    Ok(())
  }

  async fn get_project(&self, project_id: &str) -> Result<Project, Error> {
    let state = self.state.read().await;
    state
      .projects
      .get(project_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(format!("project {}", project_id)))
  }

  async fn create_run(&self, run: &WorkflowRun) -> Result<(), Error> {
    let mut state = self.state.write().await;
    if state.runs.iter().any(|r| r.run_id == run.run_id) {
      return Err(Error::Conflict(run.run_id.clone()));
    }
    state.runs.push(run.clone());
    Ok(())
  }

  async fn get_run(&self, run_id: &str) -> Result<WorkflowRun, Error> {
    let state = self.state.read().await;
    state
      .runs
      .iter()
      .find(|r| r.run_id == run_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(format!("run {}", run_id)))
  }

  async fn finish_run(
    &self,
    run_id: &str,
    status: RunStatus,
    end_date: DateTime<Utc>,
  ) -> Result<(), Error> {
    let mut state = self.state.write().await;
    let run = state
      .runs
      .iter_mut()
      .find(|r| r.run_id == run_id)
      .ok_or_else(|| Error::NotFound(format!("run {}", run_id)))?;
    run.status = status;
    run.end_date = Some(end_date);
    Ok(())
  }

  async fn list_runs(&self, workflow_id: &str) -> Result<Vec<WorkflowRun>, Error> {
    let state = self.state.read().await;
    let mut runs: Vec<WorkflowRun> = state
      .runs
      .iter()
      .filter(|r| r.workflow_id == workflow_id)
      .cloned()
      .collect();
    runs.reverse();
    runs.sort_by(|a, b| b.start_date.cmp(&a.start_date));
    Ok(runs)
  }

  async fn create_task_log(&self, log: &TaskRunLog) -> Result<(), Error> {
    let mut state = self.state.write().await;
    if state.task_logs.iter().any(|l| l.id == log.id) {
      return Err(Error::Conflict(log.id.clone()));
    }
    state.task_logs.push(log.clone());
    Ok(())
  }

  async fn update_task_log(&self, log: &TaskRunLog) -> Result<(), Error> {
    let mut state = self.state.write().await;
    let existing = state
      .task_logs
      .iter_mut()
      .find(|l| l.id == log.id)
      .ok_or_else(|| Error::NotFound(format!("task log {}", log.id)))?;
    existing.status = log.status;
    existing.end_date = log.end_date;
    existing.error = log.error.clone();
    Ok(())
  }

  async fn list_task_logs(&self, run_id: &str) -> Result<Vec<TaskRunLog>, Error> {
    let state = self.state.read().await;
    let mut logs: Vec<TaskRunLog> = state
      .task_logs
      .iter()
      .filter(|l| l.run_id == run_id)
      .cloned()
      .collect();
    logs.sort_by(|a, b| a.start_date.cmp(&b.start_date));
    Ok(logs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::TaskLogStatus;
  use chrono::Duration;

  fn run_at(run_id: &str, start_date: DateTime<Utc>) -> WorkflowRun {
    WorkflowRun {
      run_id: run_id.to_string(),
      workflow_id: "wf-1".to_string(),
      status: RunStatus::Executing,
      start_date,
      end_date: None,
    }
  }

  #[tokio::test]
  async fn test_runs_are_listed_newest_first() {
    let store = MemoryStore::new();
    let now = Utc::now();
    store.create_run(&run_at("old", now - Duration::seconds(10))).await.unwrap();
    store.create_run(&run_at("new", now)).await.unwrap();

    let runs = store.list_runs("wf-1").await.unwrap();
    let ids: Vec<_> = runs.iter().map(|r| r.run_id.as_str()).collect();
    assert_eq!(ids, vec!["new", "old"]);
  }

  #[tokio::test]
  async fn test_update_unknown_log_is_not_found() {
    let store = MemoryStore::new();
    let log = TaskRunLog {
      id: "missing".to_string(),
      run_id: "run-1".to_string(),
      task_id: "t1".to_string(),
      node_id: "n1".to_string(),
      status: TaskLogStatus::OnSuccess,
      start_date: Utc::now(),
      end_date: Some(Utc::now()),
      error: None,
    };

    let err = store.update_task_log(&log).await.unwrap_err();
    assert!(err.is_not_found());
  }

  #[tokio::test]
  async fn test_finish_run_sets_end_date() {
    let store = MemoryStore::new();
    store.create_run(&run_at("run-1", Utc::now())).await.unwrap();
    store
      .finish_run("run-1", RunStatus::Failed, Utc::now())
      .await
      .unwrap();

    let run = store.get_run("run-1").await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.end_date.is_some());
  }
}
