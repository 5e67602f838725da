//! Run ledger: the durable record of every run and every executed node.
//!
//! The engine writes through the ledger; callers read history back through
//! [`RunLedger::query_runs`] and [`RunLedger::query_task_logs`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use trellis_store::{Error, RunStatus, Store, TaskLogStatus, TaskRunLog, WorkflowRun};
use trellis_workflow::TriggerOutcome;
use uuid::Uuid;

/// One run of a workflow, with the display fields a history view needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
  pub run_id: String,
  pub workflow_id: String,
  pub workflow_name: String,
  pub project_name: Option<String>,
  pub status: RunStatus,
  pub start_date: DateTime<Utc>,
  pub end_date: Option<DateTime<Utc>>,
  pub task_count: usize,
}

impl RunSummary {
  /// Wall-clock time of the run, once it has finished.
  pub fn duration(&self) -> Option<chrono::Duration> {
    self.end_date.map(|end| end - self.start_date)
  }
}

/// Append-and-update log of runs over a [`Store`].
#[derive(Clone)]
pub struct RunLedger {
  store: Arc<dyn Store>,
}

impl RunLedger {
  pub fn new(store: Arc<dyn Store>) -> Self {
    Self { store }
  }

  pub fn store(&self) -> &Arc<dyn Store> {
    &self.store
  }

  /// Record a new `EXECUTING` run for a workflow.
  pub async fn start_run(&self, workflow_id: &str) -> Result<WorkflowRun, Error> {
    let run = WorkflowRun {
      run_id: Uuid::new_v4().to_string(),
      workflow_id: workflow_id.to_string(),
      status: RunStatus::Executing,
      start_date: Utc::now(),
      end_date: None,
    };
    self.store.create_run(&run).await?;
    Ok(run)
  }

  /// Mark a run terminal and stamp its end date.
  pub async fn finish_run(&self, run_id: &str, status: RunStatus) -> Result<(), Error> {
    self.store.finish_run(run_id, status, Utc::now()).await
  }

  /// Record that a node started executing.
  pub async fn log_task_start(
    &self,
    run_id: &str,
    node_id: &str,
    task_id: &str,
  ) -> Result<TaskRunLog, Error> {
    let log = TaskRunLog {
      id: Uuid::new_v4().to_string(),
      run_id: run_id.to_string(),
      task_id: task_id.to_string(),
      node_id: node_id.to_string(),
      status: TaskLogStatus::InProgress,
      start_date: Utc::now(),
      end_date: None,
      error: None,
    };
    self.store.create_task_log(&log).await?;
    Ok(log)
  }

  /// Record the outcome a node resolved to.
  pub async fn log_task_outcome(
    &self,
    mut log: TaskRunLog,
    outcome: TriggerOutcome,
  ) -> Result<TaskRunLog, Error> {
    log.status = log_status(outcome);
    log.end_date = Some(Utc::now());
    self.store.update_task_log(&log).await?;
    Ok(log)
  }

  /// Record that a node faulted before producing an outcome.
  ///
  /// The status stays `IN_PROGRESS`; the end date and error mark the fault.
  pub async fn log_task_fault(
    &self,
    mut log: TaskRunLog,
    error: impl Into<String>,
  ) -> Result<TaskRunLog, Error> {
    log.end_date = Some(Utc::now());
    log.error = Some(error.into());
    self.store.update_task_log(&log).await?;
    Ok(log)
  }

  pub async fn get_run(&self, run_id: &str) -> Result<WorkflowRun, Error> {
    self.store.get_run(run_id).await
  }

  /// All runs of a workflow, newest first.
  pub async fn query_runs(&self, workflow_id: &str) -> Result<Vec<RunSummary>, Error> {
    let workflow = self.store.get_workflow(workflow_id).await?;
    let project_name = match self.store.get_project(&workflow.project_id).await {
      Ok(project) => Some(project.name),
      Err(e) if e.is_not_found() => None,
      Err(e) => return Err(e),
    };

    let runs = self.store.list_runs(workflow_id).await?;
    let mut summaries = Vec::with_capacity(runs.len());
    for run in runs {
      let task_count = self.store.list_task_logs(&run.run_id).await?.len();
      summaries.push(RunSummary {
        run_id: run.run_id,
        workflow_id: run.workflow_id,
        workflow_name: workflow.name.clone(),
        project_name: project_name.clone(),
        status: run.status,
        start_date: run.start_date,
        end_date: run.end_date,
        task_count,
      });
    }
    Ok(summaries)
  }

  /// Task logs of one run, in start order.
  pub async fn query_task_logs(&self, run_id: &str) -> Result<Vec<TaskRunLog>, Error> {
    self.store.get_run(run_id).await?;
    self.store.list_task_logs(run_id).await
  }
}

fn log_status(outcome: TriggerOutcome) -> TaskLogStatus {
  match outcome {
    TriggerOutcome::OnCompletion => TaskLogStatus::OnCompletion,
    TriggerOutcome::OnFailure => TaskLogStatus::OnFailure,
    TriggerOutcome::OnSuccess => TaskLogStatus::OnSuccess,
    TriggerOutcome::Unknown => TaskLogStatus::Unknown,
  }
}
