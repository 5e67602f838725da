use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trellis_config::SchedulerDetail;

use crate::node::TaskNode;

/// A named, validated task tree ready for execution.
///
/// Definitions are immutable once created; editing a workflow means
/// creating a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
  pub id: String,
  #[serde(rename = "workflow_name")]
  pub name: String,
  pub project_id: String,
  pub environment_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub scheduler_detail: Option<SchedulerDetail>,
  #[serde(rename = "tasks")]
  pub root_task: TaskNode,
  pub created_at: DateTime<Utc>,
}

impl WorkflowDefinition {
  /// Get a node by ID.
  pub fn get_node(&self, node_id: &str) -> Option<&TaskNode> {
    self.root_task.find(node_id)
  }

  /// Number of nodes in the task tree.
  pub fn node_count(&self) -> usize {
    self.root_task.len()
  }
}
