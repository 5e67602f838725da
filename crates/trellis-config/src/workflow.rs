use serde::{Deserialize, Serialize};

use crate::node::TaskNodeDef;

/// A workflow definition as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  pub workflow_name: String,
  pub project_id: String,
  #[serde(default)]
  pub environment_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub scheduler_detail: Option<SchedulerDetail>,
  pub tasks: TaskNodeDef,
}

/// Scheduling metadata carried alongside a workflow.
///
/// Opaque to the engine: an external scheduler reads it and calls
/// "execute workflow" when the expression fires.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchedulerDetail {
  #[serde(default)]
  pub cron: String,
  #[serde(default)]
  pub description: String,
}
