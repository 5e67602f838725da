//! Execution events and notifiers for observability.
//!
//! Events are emitted as a run progresses so consumers can stream progress
//! to a UI or test harness without polling the ledger.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use trellis_workflow::TriggerOutcome;

/// Events emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  RunStarted {
    run_id: String,
    workflow_id: String,
  },

  TaskStarted {
    run_id: String,
    node_id: String,
    task_id: String,
  },

  /// A task finished and its exit code selected a branch.
  TaskResolved {
    run_id: String,
    node_id: String,
    exit_code: i32,
    outcome: TriggerOutcome,
  },

  /// A task could not produce an exit code.
  TaskFaulted {
    run_id: String,
    node_id: String,
    error: String,
  },

  RunCompleted { run_id: String },

  RunFailed { run_id: String, error: String },
}

/// Receiver of execution events.
///
/// Called inline from the engine, so implementations must not block.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls a run.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped.
    let _ = self.sender.send(event);
  }
}
