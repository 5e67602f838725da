//! Workflow definition storage.
//!
//! Submitted trees are normalized and validated here, so everything that
//! comes back out of the repository is a locked tree ready for execution.

use std::sync::Arc;

use chrono::Utc;
use sqlx::types::Json;
use tracing::{info, warn};
use trellis_config::WorkflowDef;
use trellis_store::{Store, WorkflowRecord};
use trellis_workflow::{FlatTree, WorkflowDefinition, normalize};
use uuid::Uuid;

use crate::error::RepositoryError;

#[derive(Clone)]
pub struct WorkflowRepository {
  store: Arc<dyn Store>,
}

impl WorkflowRepository {
  pub fn new(store: Arc<dyn Store>) -> Self {
    Self { store }
  }

  /// Normalize, validate, and persist a submitted workflow.
  ///
  /// Nothing is stored if the tree has any validation problem; every problem
  /// found is reported at once.
  pub async fn create(&self, def: WorkflowDef) -> Result<WorkflowDefinition, RepositoryError> {
    let root_task = match normalize(def.tasks).lock() {
      Ok(root) => root,
      Err(errors) => {
        warn!(
          workflow_name = %def.workflow_name,
          problems = errors.len(),
          "workflow rejected"
        );
        return Err(errors.into());
      }
    };

    let definition = WorkflowDefinition {
      id: Uuid::new_v4().to_string(),
      name: def.workflow_name,
      project_id: def.project_id,
      environment_id: def.environment_id,
      scheduler_detail: def.scheduler_detail,
      root_task,
      created_at: Utc::now(),
    };
    self.store.put_workflow(&to_record(&definition)?).await?;

    info!(
      workflow_id = %definition.id,
      workflow_name = %definition.name,
      nodes = definition.node_count(),
      "workflow created"
    );
    Ok(definition)
  }

  pub async fn get_by_id(&self, workflow_id: &str) -> Result<WorkflowDefinition, RepositoryError> {
    match self.store.get_workflow(workflow_id).await {
      Ok(record) => from_record(record),
      Err(e) if e.is_not_found() => Err(RepositoryError::NotFound {
        workflow_id: workflow_id.to_string(),
      }),
      Err(e) => Err(e.into()),
    }
  }

  pub async fn list_by_project(
    &self,
    project_id: &str,
  ) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
    self
      .store
      .list_workflows(project_id)
      .await?
      .into_iter()
      .map(from_record)
      .collect()
  }
}

fn to_record(definition: &WorkflowDefinition) -> Result<WorkflowRecord, RepositoryError> {
  let scheduler_detail = definition
    .scheduler_detail
    .as_ref()
    .map(serde_json::to_value)
    .transpose()?
    .map(Json);

  Ok(WorkflowRecord {
    workflow_id: definition.id.clone(),
    name: definition.name.clone(),
    project_id: definition.project_id.clone(),
    environment_id: definition.environment_id.clone(),
    scheduler_detail,
    tasks: Json(serde_json::to_value(FlatTree::from_tree(&definition.root_task))?),
    created_at: definition.created_at,
  })
}

fn from_record(record: WorkflowRecord) -> Result<WorkflowDefinition, RepositoryError> {
  let corrupt = |source| RepositoryError::Corrupt {
    workflow_id: record.workflow_id.clone(),
    source,
  };

  let flat: FlatTree = serde_json::from_value(record.tasks.0.clone()).map_err(corrupt)?;
  let root_task = flat
    .into_tree()
    .map_err(|source| RepositoryError::CorruptTree {
      workflow_id: record.workflow_id.clone(),
      source,
    })?;
  let scheduler_detail = record
    .scheduler_detail
    .as_ref()
    .map(|detail| serde_json::from_value(detail.0.clone()))
    .transpose()
    .map_err(corrupt)?;

  Ok(WorkflowDefinition {
    id: record.workflow_id,
    name: record.name,
    project_id: record.project_id,
    environment_id: record.environment_id,
    scheduler_detail,
    root_task,
    created_at: record.created_at,
  })
}
