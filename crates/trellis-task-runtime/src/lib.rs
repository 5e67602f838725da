//! Task registry abstraction for Trellis.
//!
//! The engine never knows how a task's script is stored or run. It calls
//! [`TaskRegistry::run_task`] and gets back either an exit code, which it
//! maps to a branch, or a [`TaskError`], which is an engine fault.
//!
//! [`ScriptTaskRegistry`] is the bundled implementation: tasks are
//! directories holding a `task.json` manifest and a script, environments are
//! dotenv files.

mod error;
mod manifest;
mod registry;
mod script;

pub use error::TaskError;
pub use manifest::TaskManifest;
pub use registry::{ExitCode, TaskRegistry};
pub use script::ScriptTaskRegistry;
