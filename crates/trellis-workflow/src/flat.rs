//! Edge-list form of a locked task tree.
//!
//! Nested JSON grows one level per tree level, and JSON decoders cap how deep
//! they will go. The flat form keeps nodes and `parent --outcome--> child`
//! edges side by side, so its encoding has the same shape at any tree depth.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::FlatTreeError;
use crate::node::TaskNode;
use crate::outcome::TriggerOutcome;

/// A node without its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatNode {
  pub node_id: String,
  pub task_id: String,
  #[serde(default)]
  pub identifier: String,
  #[serde(default)]
  pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatEdge {
  pub from: String,
  pub outcome: TriggerOutcome,
  pub to: String,
}

/// A task tree as a preorder node list plus edges. The first node is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatTree {
  pub nodes: Vec<FlatNode>,
  pub edges: Vec<FlatEdge>,
}

impl FlatTree {
  /// Flatten a tree. Sibling order within each branch is kept.
  pub fn from_tree(root: &TaskNode) -> Self {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();

    for node in root.walk() {
      nodes.push(FlatNode {
        node_id: node.node_id.clone(),
        task_id: node.task_id.clone(),
        identifier: node.identifier.clone(),
        description: node.description.clone(),
      });
      for (outcome, children) in &node.children {
        edges.extend(children.iter().map(|child| FlatEdge {
          from: node.node_id.clone(),
          outcome: *outcome,
          to: child.node_id.clone(),
        }));
      }
    }

    Self { nodes, edges }
  }

  /// Rebuild the nested tree.
  ///
  /// Fails if the edges do not describe a single tree rooted at the first
  /// node.
  pub fn into_tree(self) -> Result<TaskNode, FlatTreeError> {
    let root_id = match self.nodes.first() {
      Some(root) => root.node_id.clone(),
      None => return Err(FlatTreeError::Empty),
    };

    let mut built: HashMap<String, TaskNode> = HashMap::with_capacity(self.nodes.len());
    for node in self.nodes {
      let node_id = node.node_id.clone();
      let task_node = TaskNode {
        node_id: node.node_id,
        task_id: node.task_id,
        identifier: node.identifier,
        description: node.description,
        children: Default::default(),
      };
      if built.insert(node_id.clone(), task_node).is_some() {
        return Err(FlatTreeError::DuplicateNode { node_id });
      }
    }

    let mut children_of: HashMap<String, Vec<(TriggerOutcome, String)>> = HashMap::new();
    let mut has_parent: HashSet<String> = HashSet::new();
    for edge in self.edges {
      for end in [&edge.from, &edge.to] {
        if !built.contains_key(end) {
          return Err(FlatTreeError::UnknownNode {
            node_id: end.clone(),
          });
        }
      }
      if !has_parent.insert(edge.to.clone()) {
        return Err(FlatTreeError::MultipleParents { node_id: edge.to });
      }
      children_of
        .entry(edge.from)
        .or_default()
        .push((edge.outcome, edge.to));
    }

    // Preorder from the root; every node has at most one parent, so a
    // revisit can only mean an edge back into the root.
    let mut order: Vec<String> = Vec::with_capacity(built.len());
    let mut visited: HashSet<String> = HashSet::with_capacity(built.len());
    let mut stack = vec![root_id.clone()];
    while let Some(node_id) = stack.pop() {
      if !visited.insert(node_id.clone()) {
        return Err(FlatTreeError::Cycle { node_id });
      }
      if let Some(children) = children_of.get(&node_id) {
        stack.extend(children.iter().rev().map(|(_, child)| child.clone()));
      }
      order.push(node_id);
    }
    if let Some(node_id) = built.keys().find(|id| !visited.contains(*id)) {
      return Err(FlatTreeError::Detached {
        node_id: node_id.clone(),
      });
    }

    // Children come after their parent in preorder, so walking it backwards
    // finishes every subtree before it is attached.
    for node_id in order.iter().rev() {
      let Some(children) = children_of.remove(node_id) else {
        continue;
      };
      let mut parent = built
        .remove(node_id)
        .ok_or_else(|| FlatTreeError::UnknownNode {
          node_id: node_id.clone(),
        })?;
      for (outcome, child_id) in children {
        let child = built
          .remove(&child_id)
          .ok_or(FlatTreeError::UnknownNode { node_id: child_id })?;
        parent.children.entry(outcome).or_default().push(child);
      }
      built.insert(node_id.clone(), parent);
    }

    built.remove(&root_id).ok_or(FlatTreeError::Empty)
  }
}
