use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A task node as submitted by a caller.
///
/// `children` is keyed by the raw outcome name so that unknown keys survive
/// deserialization and can be reported during validation instead of failing
/// the whole parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNodeDef {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub node_id: Option<String>,
  #[serde(default)]
  pub task_id: String,
  #[serde(default)]
  pub identifier: String,
  #[serde(default)]
  pub description: String,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub children: BTreeMap<String, Branch>,
}

impl TaskNodeDef {
  /// Create a leaf node for the given task.
  pub fn new(task_id: impl Into<String>) -> Self {
    Self {
      node_id: None,
      task_id: task_id.into(),
      identifier: String::new(),
      description: String::new(),
      children: BTreeMap::new(),
    }
  }

  /// Append a child under the given outcome key.
  pub fn with_child(mut self, outcome: impl Into<String>, child: TaskNodeDef) -> Self {
    let branch = self
      .children
      .entry(outcome.into())
      .or_insert_with(|| Branch::Many(Vec::new()));
    branch.push(child);
    self
  }

  /// Set the node id.
  pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
    self.node_id = Some(node_id.into());
    self
  }

  /// Set the human label.
  pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
    self.identifier = identifier.into();
    self
  }
}

/// The downstream nodes registered under one outcome.
///
/// Older editors emitted a single object per outcome; current ones emit a
/// list. Both are accepted, lists are always emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Branch {
  Many(Vec<TaskNodeDef>),
  One(Box<TaskNodeDef>),
}

impl Branch {
  /// Normalize into the list form.
  pub fn into_vec(self) -> Vec<TaskNodeDef> {
    match self {
      Branch::Many(nodes) => nodes,
      Branch::One(node) => vec![*node],
    }
  }

  /// Borrow the nodes in this branch.
  pub fn nodes(&self) -> &[TaskNodeDef] {
    match self {
      Branch::Many(nodes) => nodes,
      Branch::One(node) => std::slice::from_ref(node.as_ref()),
    }
  }

  /// Mutably borrow the nodes in this branch.
  pub fn nodes_mut(&mut self) -> &mut [TaskNodeDef] {
    match self {
      Branch::Many(nodes) => nodes,
      Branch::One(node) => std::slice::from_mut(node.as_mut()),
    }
  }

  fn push(&mut self, node: TaskNodeDef) {
    match self {
      Branch::Many(nodes) => nodes.push(node),
      Branch::One(existing) => {
        let first = (**existing).clone();
        *self = Branch::Many(vec![first, node]);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_minimal_node_parses() {
    let node: TaskNodeDef = serde_json::from_value(json!({ "task_id": "t1" })).unwrap();

    assert_eq!(node.task_id, "t1");
    assert_eq!(node.node_id, None);
    assert!(node.children.is_empty());
  }

  #[test]
  fn test_single_child_is_accepted() {
    let node: TaskNodeDef = serde_json::from_value(json!({
      "task_id": "root",
      "children": {
        "on_failure": { "task_id": "cleanup" }
      }
    }))
    .unwrap();

    let branch = node.children.get("on_failure").unwrap();
    assert_eq!(branch.nodes().len(), 1);
    assert_eq!(branch.nodes()[0].task_id, "cleanup");
  }

  #[test]
  fn test_list_children_preserve_order() {
    let node: TaskNodeDef = serde_json::from_value(json!({
      "task_id": "root",
      "children": {
        "on_success": [{ "task_id": "a" }, { "task_id": "b" }]
      }
    }))
    .unwrap();

    let ids: Vec<_> = node.children["on_success"]
      .nodes()
      .iter()
      .map(|n| n.task_id.as_str())
      .collect();
    assert_eq!(ids, vec!["a", "b"]);
  }

  #[test]
  fn test_unknown_outcome_key_survives_parse() {
    let node: TaskNodeDef = serde_json::from_value(json!({
      "task_id": "root",
      "children": { "on_retry": [] }
    }))
    .unwrap();

    assert!(node.children.contains_key("on_retry"));
  }

  #[test]
  fn test_with_child_upgrades_single_branch() {
    let mut node = TaskNodeDef::new("root");
    node
      .children
      .insert("on_success".to_string(), Branch::One(Box::new(TaskNodeDef::new("a"))));

    let node = node.with_child("on_success", TaskNodeDef::new("b"));
    let ids: Vec<_> = node.children["on_success"]
      .nodes()
      .iter()
      .map(|n| n.task_id.clone())
      .collect();
    assert_eq!(ids, vec!["a", "b"]);
  }
}
