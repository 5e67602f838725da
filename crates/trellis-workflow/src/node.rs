use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::outcome::TriggerOutcome;

/// One scripted step in a validated task tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
  pub node_id: String,
  pub task_id: String,
  #[serde(default)]
  pub identifier: String,
  #[serde(default)]
  pub description: String,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub children: BTreeMap<TriggerOutcome, Vec<TaskNode>>,
}

impl TaskNode {
  /// The nodes to run next when this node resolves to `outcome`.
  ///
  /// Outcomes that do not route always yield an empty branch.
  pub fn branch(&self, outcome: TriggerOutcome) -> &[TaskNode] {
    if !outcome.routes() {
      return &[];
    }
    self
      .children
      .get(&outcome)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Check if this node has no branches at all.
  pub fn is_leaf(&self) -> bool {
    self.children.values().all(|v| v.is_empty())
  }

  /// Depth-first, pre-order traversal of this node and its descendants.
  pub fn walk(&self) -> Walk<'_> {
    Walk { stack: vec![self] }
  }

  /// Total number of nodes in this subtree.
  pub fn len(&self) -> usize {
    self.walk().count()
  }

  /// Number of nodes on the longest root-to-leaf path.
  pub fn depth(&self) -> usize {
    let mut deepest = 0;
    let mut stack = vec![(self, 1usize)];
    while let Some((node, depth)) = stack.pop() {
      deepest = deepest.max(depth);
      for child in node.children.values().flatten() {
        stack.push((child, depth + 1));
      }
    }
    deepest
  }

  /// Find a node in this subtree by id.
  pub fn find(&self, node_id: &str) -> Option<&TaskNode> {
    self.walk().find(|node| node.node_id == node_id)
  }
}

/// Iterator returned by [`TaskNode::walk`].
pub struct Walk<'a> {
  stack: Vec<&'a TaskNode>,
}

impl<'a> Iterator for Walk<'a> {
  type Item = &'a TaskNode;

  fn next(&mut self) -> Option<Self::Item> {
    let node = self.stack.pop()?;
    // Reverse so siblings come out in declaration order
    for branch in node.children.values().rev() {
      self.stack.extend(branch.iter().rev());
    }
    Some(node)
  }
}
