//! Trellis Workflow
//!
//! This crate provides the validated task tree representation for Trellis.
//! A caller submits a [`TaskNodeDef`](trellis_config::TaskNodeDef) tree; it is
//! normalized (every node gets a stable `node_id`), validated, and locked into
//! a typed [`TaskNode`] tree that is ready for execution.
//!
//! Key differences from `trellis-config`:
//! - Every node has a unique, stable `node_id`
//! - Branches are keyed by [`TriggerOutcome`], never by free-form strings
//! - Every branch is a list (fan-out), never a single node
//!
//! The crate also owns the mapping from a task's exit code to the
//! [`TriggerOutcome`] that selects the next branch.

mod error;
mod flat;
mod graph;
mod node;
mod outcome;
mod workflow;

pub use error::{FlatTreeError, ValidationError, ValidationErrors};
pub use flat::{FlatEdge, FlatNode, FlatTree};
pub use graph::{TaskGraph, normalize, validate};
pub use node::{TaskNode, Walk};
pub use outcome::{TriggerOutcome, UnknownOutcome, map_outcome};
pub use workflow::WorkflowDefinition;
