use std::fmt;

use thiserror::Error;

/// A single problem found while validating a task tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("node for task '{task_id}' has no node_id")]
  MissingNodeId { task_id: String },

  #[error("duplicate node id: {node_id}")]
  DuplicateNodeId { node_id: String },

  #[error("node '{node_id}' appears beneath itself")]
  Cycle { node_id: String },

  #[error("node '{node_id}' has an unknown outcome key '{key}'")]
  UnknownOutcome { node_id: String, key: String },

  #[error("node '{node_id}' has an empty task_id")]
  MissingTaskId { node_id: String },
}

/// Every problem found in one validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
  pub fn errors(&self) -> &[ValidationError] {
    &self.0
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl fmt::Display for ValidationErrors {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} validation error(s)", self.0.len())?;
    for error in &self.0 {
      write!(f, "; {}", error)?;
    }
    Ok(())
  }
}

impl std::error::Error for ValidationErrors {}

impl From<Vec<ValidationError>> for ValidationErrors {
  fn from(errors: Vec<ValidationError>) -> Self {
    Self(errors)
  }
}

/// A stored flat tree that does not describe a single rooted tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlatTreeError {
  #[error("flat tree has no nodes")]
  Empty,

  #[error("flat tree lists node '{node_id}' twice")]
  DuplicateNode { node_id: String },

  #[error("edge references unknown node '{node_id}'")]
  UnknownNode { node_id: String },

  #[error("node '{node_id}' has more than one parent")]
  MultipleParents { node_id: String },

  #[error("edge leads back into node '{node_id}'")]
  Cycle { node_id: String },

  #[error("node '{node_id}' is not reachable from the root")]
  Detached { node_id: String },
}
