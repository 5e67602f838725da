//! The inbound surface of Trellis.
//!
//! `WorkflowService` wires the repository, engine, and ledger together and
//! exposes the operations a transport (CLI, HTTP, scheduler) calls.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use trellis_config::WorkflowDef;
use trellis_store::{Project, RunStatus, Store, TaskLogStatus, TaskRunLog};
use trellis_task_runtime::TaskRegistry;
use trellis_workflow::WorkflowDefinition;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::{RunHandle, RunReport, WorkflowEngine};
use crate::error::ServiceError;
use crate::events::ExecutionNotifier;
use crate::ledger::{RunLedger, RunSummary};
use crate::repository::WorkflowRepository;

/// One run in the workflow log view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowLog {
  pub run_id: String,
  pub workflow_id: String,
  pub project_name: Option<String>,
  pub workflow_status: RunStatus,
  pub start_date: DateTime<Utc>,
  pub end_date: Option<DateTime<Utc>>,
  pub task_logs: Vec<TaskLogEntry>,
}

/// One executed node in the workflow log view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskLogEntry {
  pub task_name: Option<String>,
  pub status: TaskLogStatus,
  pub start_date: DateTime<Utc>,
  pub end_date: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

#[derive(Clone)]
pub struct WorkflowService {
  repository: WorkflowRepository,
  engine: WorkflowEngine,
  registry: Arc<dyn TaskRegistry>,
}

impl WorkflowService {
  pub fn new(store: Arc<dyn Store>, registry: Arc<dyn TaskRegistry>, config: EngineConfig) -> Self {
    let engine = WorkflowEngine::new(RunLedger::new(store.clone()), registry.clone(), config);
    Self::from_parts(WorkflowRepository::new(store), engine, registry)
  }

  /// Like [`WorkflowService::new`], with run progress sent to `notifier`.
  pub fn with_notifier(
    store: Arc<dyn Store>,
    registry: Arc<dyn TaskRegistry>,
    config: EngineConfig,
    notifier: Arc<dyn ExecutionNotifier>,
  ) -> Self {
    let engine = WorkflowEngine::with_notifier(
      RunLedger::new(store.clone()),
      registry.clone(),
      config,
      notifier,
    );
    Self::from_parts(WorkflowRepository::new(store), engine, registry)
  }

  fn from_parts(
    repository: WorkflowRepository,
    engine: WorkflowEngine,
    registry: Arc<dyn TaskRegistry>,
  ) -> Self {
    Self {
      repository,
      engine,
      registry,
    }
  }

  pub fn repository(&self) -> &WorkflowRepository {
    &self.repository
  }

  pub fn engine(&self) -> &WorkflowEngine {
    &self.engine
  }

  pub fn ledger(&self) -> &RunLedger {
    self.engine.ledger()
  }

  /// Register a project so run history can show its name.
  pub async fn create_project(
    &self,
    name: &str,
    project_id: Option<String>,
  ) -> Result<Project, ServiceError> {
    let project = Project {
      project_id: project_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
      name: name.to_string(),
    };
    self.ledger().store().put_project(&project).await?;
    Ok(project)
  }

  pub async fn create_workflow(&self, def: WorkflowDef) -> Result<WorkflowDefinition, ServiceError> {
    Ok(self.repository.create(def).await?)
  }

  pub async fn get_workflow(&self, workflow_id: &str) -> Result<WorkflowDefinition, ServiceError> {
    Ok(self.repository.get_by_id(workflow_id).await?)
  }

  pub async fn list_workflows(
    &self,
    project_id: &str,
  ) -> Result<Vec<WorkflowDefinition>, ServiceError> {
    Ok(self.repository.list_by_project(project_id).await?)
  }

  /// Run a workflow and wait for it to become terminal.
  pub async fn execute_workflow(
    &self,
    workflow_id: &str,
    cancel: CancellationToken,
  ) -> Result<RunReport, ServiceError> {
    let workflow = self.repository.get_by_id(workflow_id).await?;
    Ok(self.engine.execute(workflow, cancel).await?)
  }

  /// Start a workflow and return as soon as its run exists.
  pub async fn dispatch_workflow(
    &self,
    workflow_id: &str,
    cancel: CancellationToken,
  ) -> Result<RunHandle, ServiceError> {
    let workflow = self.repository.get_by_id(workflow_id).await?;
    Ok(self.engine.start(workflow, cancel).await?)
  }

  /// Run history of a workflow, newest first.
  pub async fn run_history(&self, workflow_id: &str) -> Result<Vec<RunSummary>, ServiceError> {
    self.repository.get_by_id(workflow_id).await?;
    Ok(self.ledger().query_runs(workflow_id).await?)
  }

  pub async fn run_logs(&self, run_id: &str) -> Result<Vec<TaskRunLog>, ServiceError> {
    Ok(self.ledger().query_task_logs(run_id).await?)
  }

  /// Every run of a workflow with its task logs, newest run first.
  pub async fn workflow_logs(&self, workflow_id: &str) -> Result<Vec<WorkflowLog>, ServiceError> {
    let runs = self.run_history(workflow_id).await?;

    let mut entries = Vec::with_capacity(runs.len());
    let mut names: HashMap<String, Option<String>> = HashMap::new();
    for run in runs {
      let logs = self.ledger().query_task_logs(&run.run_id).await?;
      self.resolve_task_names(&logs, &mut names).await;

      let task_logs = logs
        .into_iter()
        .map(|log| TaskLogEntry {
          task_name: names.get(&log.task_id).cloned().flatten(),
          status: log.status,
          start_date: log.start_date,
          end_date: log.end_date,
          error: log.error,
        })
        .collect();

      entries.push(WorkflowLog {
        run_id: run.run_id,
        workflow_id: run.workflow_id,
        project_name: run.project_name,
        workflow_status: run.status,
        start_date: run.start_date,
        end_date: run.end_date,
        task_logs,
      });
    }
    Ok(entries)
  }

  async fn resolve_task_names(
    &self,
    logs: &[TaskRunLog],
    names: &mut HashMap<String, Option<String>>,
  ) {
    let mut missing: Vec<&str> = logs
      .iter()
      .map(|log| log.task_id.as_str())
      .filter(|task_id| !names.contains_key(*task_id))
      .collect();
    missing.sort_unstable();
    missing.dedup();

    let resolved = join_all(missing.iter().map(|task_id| self.registry.task_name(task_id))).await;
    for (task_id, name) in missing.into_iter().zip(resolved) {
      names.insert(task_id.to_string(), name);
    }
  }
}
