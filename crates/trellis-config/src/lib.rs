//! Trellis Config
//!
//! This crate contains the serializable workflow configuration types for Trellis.
//! These types represent workflow definitions exactly as a caller (the graph
//! editor, a JSON file, the CLI) submits them, before node identities are
//! assigned and the tree is validated.
//!
//! Configuration can be loaded from:
//! - JSON files (via CLI with `trellis workflow create workflow.json`)
//! - Database storage (as JSON blobs)
//!
//! `trellis-workflow` takes these types, normalizes and validates them, and
//! produces the typed task tree the engine executes.

mod node;
mod workflow;

pub use node::{Branch, TaskNodeDef};
pub use workflow::{SchedulerDetail, WorkflowDef};
