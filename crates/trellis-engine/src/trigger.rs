//! Channel-based workflow triggering.
//!
//! A `WorkflowTrigger` owns an mpsc channel of workflow ids. Anything that
//! decides a workflow should run (a cron scheduler, a webhook, the UI) holds
//! a sender; the trigger loop dispatches one run per id received.

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::ExecutionError;
use crate::service::WorkflowService;

/// Request to run a workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRequest {
  pub workflow_id: String,
}

/// The trigger loop has stopped accepting requests.
#[derive(Debug, thiserror::Error)]
#[error("workflow trigger channel closed")]
pub struct TriggerClosed;

/// Dispatches runs in response to workflow ids sent over a channel.
///
/// # Usage
///
/// ```ignore
/// let trigger = WorkflowTrigger::new(service);
///
/// // Hand senders to whatever decides when workflows run
/// let sender = trigger.sender();
///
/// // Run the dispatch loop
/// let cancel = CancellationToken::new();
/// trigger.start(cancel).await;
/// ```
pub struct WorkflowTrigger {
  sender: mpsc::Sender<TriggerRequest>,
  receiver: mpsc::Receiver<TriggerRequest>,
  service: WorkflowService,
}

impl WorkflowTrigger {
  pub fn new(service: WorkflowService) -> Self {
    Self::with_buffer_size(service, 100)
  }

  pub fn with_buffer_size(service: WorkflowService, buffer_size: usize) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size);
    Self {
      sender,
      receiver,
      service,
    }
  }

  /// Get a sender handle for requesting runs.
  pub fn sender(&self) -> mpsc::Sender<TriggerRequest> {
    self.sender.clone()
  }

  /// Request a run of `workflow_id`.
  pub async fn trigger(&self, workflow_id: impl Into<String>) -> Result<(), TriggerClosed> {
    self
      .sender
      .send(TriggerRequest {
        workflow_id: workflow_id.into(),
      })
      .await
      .map_err(|_| TriggerClosed)
  }

  /// Run the dispatch loop.
  ///
  /// Returns when `cancel` fires or once every outside sender is dropped.
  /// Runs still executing at that point are waited for; on cancellation
  /// they are cancelled too and end `FAILED`.
  pub async fn start(self, cancel: CancellationToken) {
    let WorkflowTrigger {
      sender,
      mut receiver,
      service,
    } = self;
    // Only outside senders keep the loop alive.
    drop(sender);

    info!("starting workflow trigger");
    let mut runs = JoinSet::new();

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!("workflow trigger cancelled");
          break;
        }
        Some(_) = runs.join_next(), if !runs.is_empty() => {}
        request = receiver.recv() => {
          let Some(TriggerRequest { workflow_id }) = request else {
            info!("workflow trigger channel closed");
            break;
          };

          match service.dispatch_workflow(&workflow_id, cancel.child_token()).await {
            Ok(handle) => {
              info!(workflow_id = %workflow_id, run_id = %handle.run_id(), "workflow dispatched");
              runs.spawn(async move {
                match handle.wait().await {
                  Ok(report) => info!(
                    run_id = %report.run_id,
                    tasks_executed = report.tasks_executed,
                    "triggered run completed"
                  ),
                  Err(ExecutionError::Faulted { run_id, fault }) => warn!(
                    run_id = %run_id,
                    error = %fault,
                    "triggered run failed"
                  ),
                  Err(e) => error!(error = %e, "triggered run could not start"),
                }
              });
            }
            Err(e) => error!(workflow_id = %workflow_id, error = %e, "failed to dispatch workflow"),
          }
        }
      }
    }

    while runs.join_next().await.is_some() {}
  }
}
