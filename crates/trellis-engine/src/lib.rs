//! Trellis Workflow Engine
//!
//! This crate runs task trees. It provides the repository that validates and
//! stores workflow definitions, the engine that walks a tree and routes on
//! each task's outcome, the run ledger that records every run, and a
//! `WorkflowService` façade over all three.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     WorkflowTrigger                         │
//! │  - owns mpsc channel of workflow ids                        │
//! │  - start(cancel) dispatches one run per id                  │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     WorkflowService                         │
//! │  - create / get / list workflows (WorkflowRepository)       │
//! │  - execute / dispatch runs (WorkflowEngine)                 │
//! │  - workflow_logs query (RunLedger + TaskRegistry names)     │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     WorkflowEngine                          │
//! │  - worklist traversal, outcome routing, fan-out             │
//! │  - writes every run and task through the RunLedger          │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TaskRegistry                           │
//! │  - run_task(task_id, environment_id) → exit code            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use trellis_engine::{EngineConfig, WorkflowService};
//! use tokio_util::sync::CancellationToken;
//!
//! let store = Arc::new(SqliteStore::connect("sqlite://trellis.db").await?);
//! let registry = Arc::new(ScriptTaskRegistry::new(tasks_dir, environments_dir));
//! let service = WorkflowService::new(store, registry, EngineConfig::default());
//!
//! let workflow = service.create_workflow(def).await?;
//! let report = service
//!   .execute_workflow(&workflow.id, CancellationToken::new())
//!   .await?;
//! ```

mod config;
mod engine;
mod error;
mod events;
mod ledger;
mod repository;
mod service;
mod trigger;

pub use config::EngineConfig;
pub use engine::{RunHandle, RunReport, WorkflowEngine};
pub use error::{EngineFault, ExecutionError, RepositoryError, ServiceError};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use ledger::{RunLedger, RunSummary};
pub use repository::WorkflowRepository;
pub use service::{TaskLogEntry, WorkflowLog, WorkflowService};
pub use trigger::{TriggerClosed, TriggerRequest, WorkflowTrigger};
