use std::collections::{BTreeMap, HashSet};

use trellis_config::{Branch, TaskNodeDef};

use crate::error::{ValidationError, ValidationErrors};
use crate::node::TaskNode;
use crate::outcome::TriggerOutcome;

/// A caller-supplied task tree whose nodes all carry a `node_id`.
///
/// Only [`normalize`] builds one, so holding a `TaskGraph` means identities
/// have been assigned. It still has to pass [`validate`] before it can be
/// locked into a typed [`TaskNode`] tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskGraph {
  root: TaskNodeDef,
}

impl TaskGraph {
  /// Get the root of the normalized tree.
  pub fn root(&self) -> &TaskNodeDef {
    &self.root
  }

  /// Take the normalized tree back, e.g. to resubmit it later.
  pub fn into_root(self) -> TaskNodeDef {
    self.root
  }

  /// Validate the tree, returning every problem found.
  pub fn validate(&self) -> Vec<ValidationError> {
    validate(self)
  }

  /// Validate and convert into the typed tree the engine executes.
  pub fn lock(self) -> Result<TaskNode, ValidationErrors> {
    let errors = self.validate();
    if !errors.is_empty() {
      return Err(errors.into());
    }
    Ok(into_task_node(self.root))
  }
}

/// Assign a fresh `node_id` to every node that lacks one.
///
/// Existing ids are kept, so normalizing an already-normalized tree is a
/// no-op. Single-node branches are rewritten into the list form.
pub fn normalize(tree: TaskNodeDef) -> TaskGraph {
  let mut root = tree;
  let mut stack = vec![&mut root];

  while let Some(node) = stack.pop() {
    if node.node_id.as_deref().is_none_or(str::is_empty) {
      node.node_id = Some(uuid::Uuid::new_v4().to_string());
    }

    for branch in node.children.values_mut() {
      if let Branch::One(_) = branch {
        let single = std::mem::replace(branch, Branch::Many(Vec::new()));
        *branch = Branch::Many(single.into_vec());
      }
      stack.extend(branch.nodes_mut().iter_mut());
    }
  }

  TaskGraph { root }
}

enum Visit<'a> {
  Enter(&'a TaskNodeDef),
  Exit,
}

/// Check a normalized tree for duplicate ids, cycles, bad outcome keys, and
/// missing task references.
pub fn validate(graph: &TaskGraph) -> Vec<ValidationError> {
  let mut errors = Vec::new();
  let mut seen: HashSet<&str> = HashSet::new();
  // Ids of the nodes between the root and the current node
  let mut path: Vec<&str> = Vec::new();
  let mut stack = vec![Visit::Enter(&graph.root)];

  while let Some(visit) = stack.pop() {
    let node = match visit {
      Visit::Exit => {
        path.pop();
        continue;
      }
      Visit::Enter(node) => node,
    };

    let node_id = node.node_id.as_deref().unwrap_or_default();

    if node_id.is_empty() {
      errors.push(ValidationError::MissingNodeId {
        task_id: node.task_id.clone(),
      });
    } else if path.contains(&node_id) {
      errors.push(ValidationError::Cycle {
        node_id: node_id.to_string(),
      });
    } else if !seen.insert(node_id) {
      errors.push(ValidationError::DuplicateNodeId {
        node_id: node_id.to_string(),
      });
    }

    if node.task_id.trim().is_empty() {
      errors.push(ValidationError::MissingTaskId {
        node_id: node_id.to_string(),
      });
    }

    for key in node.children.keys() {
      if key.parse::<TriggerOutcome>().is_err() {
        errors.push(ValidationError::UnknownOutcome {
          node_id: node_id.to_string(),
          key: key.clone(),
        });
      }
    }

    path.push(node_id);
    stack.push(Visit::Exit);
    for branch in node.children.values().rev() {
      for child in branch.nodes().iter().rev() {
        stack.push(Visit::Enter(child));
      }
    }
  }

  errors
}

/// Convert a validated raw node into a typed node.
fn into_task_node(def: TaskNodeDef) -> TaskNode {
  let mut children: BTreeMap<TriggerOutcome, Vec<TaskNode>> = BTreeMap::new();
  for (key, branch) in def.children {
    let Ok(outcome) = key.parse::<TriggerOutcome>() else {
      continue;
    };
    let nodes: Vec<TaskNode> = branch.into_vec().into_iter().map(into_task_node).collect();
    if !nodes.is_empty() {
      children.entry(outcome).or_default().extend(nodes);
    }
  }

  TaskNode {
    node_id: def.node_id.unwrap_or_default(),
    task_id: def.task_id,
    identifier: def.identifier,
    description: def.description,
    children,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tree() -> TaskNodeDef {
    TaskNodeDef::new("extract")
      .with_child(
        "on_failure",
        TaskNodeDef::new("notify").with_child("on_completion", TaskNodeDef::new("archive")),
      )
      .with_child("on_success", TaskNodeDef::new("load"))
      .with_child("on_success", TaskNodeDef::new("report"))
  }

  fn ids(graph: &TaskGraph) -> Vec<String> {
    let mut ids = Vec::new();
    let mut stack = vec![graph.root()];
    while let Some(node) = stack.pop() {
      ids.push(node.node_id.clone().unwrap_or_default());
      for branch in node.children.values() {
        stack.extend(branch.nodes());
      }
    }
    ids
  }

  #[test]
  fn test_normalize_assigns_every_id() {
    let graph = normalize(tree());
    let ids = ids(&graph);

    assert_eq!(ids.len(), 5);
    assert!(ids.iter().all(|id| !id.is_empty()));
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), 5);
  }

  #[test]
  fn test_normalize_is_idempotent() {
    let once = normalize(tree());
    let twice = normalize(once.clone().into_root());
    assert_eq!(once, twice);
  }

  #[test]
  fn test_normalize_keeps_existing_ids() {
    let def = TaskNodeDef::new("root")
      .with_node_id("keep-me")
      .with_child("on_success", TaskNodeDef::new("child"));
    let graph = normalize(def);

    assert_eq!(graph.root().node_id.as_deref(), Some("keep-me"));
  }

  #[test]
  fn test_normalize_replaces_empty_id() {
    let graph = normalize(TaskNodeDef::new("root").with_node_id(""));
    let id = graph.root().node_id.clone().unwrap();
    assert!(!id.is_empty());
  }

  #[test]
  fn test_normalize_rewrites_single_branch() {
    let mut def = TaskNodeDef::new("root");
    def.children.insert(
      "on_failure".to_string(),
      Branch::One(Box::new(TaskNodeDef::new("child"))),
    );
    let graph = normalize(def);

    assert!(matches!(graph.root().children["on_failure"], Branch::Many(_)));
  }

  #[test]
  fn test_valid_tree_locks() {
    let node = normalize(tree()).lock().unwrap();
    assert_eq!(node.len(), 5);
    assert_eq!(node.branch(TriggerOutcome::OnSuccess).len(), 2);
    assert_eq!(node.branch(TriggerOutcome::OnSuccess)[0].task_id, "load");
  }

  #[test]
  fn test_ancestor_id_is_a_cycle() {
    let def = TaskNodeDef::new("root").with_node_id("n1").with_child(
      "on_success",
      TaskNodeDef::new("child")
        .with_node_id("n2")
        .with_child("on_failure", TaskNodeDef::new("again").with_node_id("n1")),
    );

    let errors = normalize(def).validate();
    assert_eq!(
      errors,
      vec![ValidationError::Cycle {
        node_id: "n1".to_string()
      }]
    );
  }

  #[test]
  fn test_sibling_reuse_is_a_duplicate() {
    let def = TaskNodeDef::new("root")
      .with_node_id("n1")
      .with_child("on_success", TaskNodeDef::new("a").with_node_id("dup"))
      .with_child("on_failure", TaskNodeDef::new("b").with_node_id("dup"));

    let errors = normalize(def).validate();
    assert_eq!(
      errors,
      vec![ValidationError::DuplicateNodeId {
        node_id: "dup".to_string()
      }]
    );
  }

  #[test]
  fn test_reports_all_problems_at_once() {
    let def = TaskNodeDef::new("")
      .with_node_id("root")
      .with_child("on_retry", TaskNodeDef::new("a").with_node_id("a"))
      .with_child("on_success", TaskNodeDef::new(" ").with_node_id("b"));

    let errors = normalize(def).lock().unwrap_err();
    assert_eq!(errors.len(), 3);
    assert!(errors.errors().contains(&ValidationError::MissingTaskId {
      node_id: "root".to_string()
    }));
    assert!(errors.errors().contains(&ValidationError::MissingTaskId {
      node_id: "b".to_string()
    }));
    assert!(errors.errors().contains(&ValidationError::UnknownOutcome {
      node_id: "root".to_string(),
      key: "on_retry".to_string()
    }));
  }

  #[test]
  fn test_unknown_key_is_accepted_but_never_followed() {
    let def = TaskNodeDef::new("root").with_child("unknown", TaskNodeDef::new("x"));

    let node = normalize(def).lock().unwrap();
    assert_eq!(node.len(), 2);
    assert_eq!(node.children[&TriggerOutcome::Unknown].len(), 1);
    assert!(node.branch(TriggerOutcome::Unknown).is_empty());
  }

  #[test]
  fn test_long_description_is_accepted() {
    let mut def = TaskNodeDef::new("root");
    def.description = "x".repeat(1000);
    assert!(normalize(def).lock().is_ok());
  }
}
