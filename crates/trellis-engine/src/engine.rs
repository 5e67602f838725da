//! Workflow execution engine.
//!
//! The `WorkflowEngine` walks a locked task tree from its root. Each node's
//! task runs once; its exit code picks a branch, and every child on that
//! branch is scheduled. Siblings run concurrently, up to
//! [`EngineConfig::max_parallel_tasks`].

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use trellis_store::RunStatus;
use trellis_task_runtime::{ExitCode, TaskRegistry};
use trellis_workflow::{TaskNode, TriggerOutcome, WorkflowDefinition, map_outcome};

use crate::config::EngineConfig;
use crate::error::{EngineFault, ExecutionError};
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::ledger::RunLedger;

/// Result of a run that reached the end of its tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
  pub run_id: String,
  pub status: RunStatus,
  /// Number of nodes whose task was started.
  pub tasks_executed: usize,
}

/// Handle to a run that is executing in the background.
///
/// The run id is available immediately; [`RunHandle::wait`] resolves once the
/// run is terminal in the ledger.
pub struct RunHandle {
  run_id: String,
  handle: JoinHandle<Result<RunReport, ExecutionError>>,
}

impl RunHandle {
  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  /// Wait for the run to finish.
  pub async fn wait(self) -> Result<RunReport, ExecutionError> {
    match self.handle.await {
      Ok(result) => result,
      Err(e) => Err(ExecutionError::Faulted {
        run_id: self.run_id,
        fault: join_fault(e),
      }),
    }
  }
}

/// The workflow execution engine.
#[derive(Clone)]
pub struct WorkflowEngine {
  ledger: RunLedger,
  registry: Arc<dyn TaskRegistry>,
  notifier: Arc<dyn ExecutionNotifier>,
  config: EngineConfig,
}

impl WorkflowEngine {
  /// Create an engine with no-op notifications.
  pub fn new(ledger: RunLedger, registry: Arc<dyn TaskRegistry>, config: EngineConfig) -> Self {
    Self::with_notifier(ledger, registry, config, Arc::new(NoopNotifier))
  }

  /// Create an engine that reports progress to `notifier`.
  pub fn with_notifier(
    ledger: RunLedger,
    registry: Arc<dyn TaskRegistry>,
    config: EngineConfig,
    notifier: Arc<dyn ExecutionNotifier>,
  ) -> Self {
    Self {
      ledger,
      registry,
      notifier,
      config,
    }
  }

  pub fn ledger(&self) -> &RunLedger {
    &self.ledger
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Create a run and start traversing it in the background.
  ///
  /// Returns once the run is recorded as `EXECUTING`. Fails only if the run
  /// could not be created.
  pub async fn start(
    &self,
    workflow: WorkflowDefinition,
    cancel: CancellationToken,
  ) -> Result<RunHandle, ExecutionError> {
    let run = self.ledger.start_run(&workflow.id).await?;
    info!(
      run_id = %run.run_id,
      workflow_id = %workflow.id,
      workflow_name = %workflow.name,
      nodes = workflow.node_count(),
      "workflow_started"
    );
    self.notifier.notify(ExecutionEvent::RunStarted {
      run_id: run.run_id.clone(),
      workflow_id: workflow.id.clone(),
    });

    let engine = self.clone();
    let run_id = run.run_id.clone();
    let handle = tokio::spawn(async move { engine.drive(&workflow, &run.run_id, cancel).await });

    Ok(RunHandle { run_id, handle })
  }

  /// Run a workflow to completion.
  pub async fn execute(
    &self,
    workflow: WorkflowDefinition,
    cancel: CancellationToken,
  ) -> Result<RunReport, ExecutionError> {
    self.start(workflow, cancel).await?.wait().await
  }

  #[instrument(name = "workflow_execute", skip(self, workflow, cancel), fields(workflow_id = %workflow.id))]
  async fn drive(
    &self,
    workflow: &WorkflowDefinition,
    run_id: &str,
    cancel: CancellationToken,
  ) -> Result<RunReport, ExecutionError> {
    let traversal = self.traverse(workflow, run_id, &cancel);
    let result = match self.config.run_timeout {
      // Dropping the traversal on timeout aborts its in-flight nodes.
      Some(timeout) => match tokio::time::timeout(timeout, traversal).await {
        Ok(result) => result,
        Err(_) => Err(EngineFault::RunTimeout { timeout }),
      },
      None => traversal.await,
    };

    let fault = match result {
      Ok(tasks_executed) => match self.ledger.finish_run(run_id, RunStatus::Completed).await {
        Ok(()) => {
          info!(run_id, tasks_executed, "workflow_completed");
          self.notifier.notify(ExecutionEvent::RunCompleted {
            run_id: run_id.to_string(),
          });
          return Ok(RunReport {
            run_id: run_id.to_string(),
            status: RunStatus::Completed,
            tasks_executed,
          });
        }
        Err(e) => EngineFault::Store(e),
      },
      Err(fault) => fault,
    };

    error!(run_id, error = %fault, "workflow_failed");
    if let Err(e) = self.ledger.finish_run(run_id, RunStatus::Failed).await {
      error!(run_id, error = %e, "failed to record run failure");
    }
    self.notifier.notify(ExecutionEvent::RunFailed {
      run_id: run_id.to_string(),
      error: fault.to_string(),
    });

    Err(ExecutionError::Faulted {
      run_id: run_id.to_string(),
      fault,
    })
  }

  /// Walk the tree until the worklist and the in-flight set are both empty.
  ///
  /// The first fault stops all further scheduling. Nodes already running are
  /// allowed to finish and record their outcome, but their children are not
  /// scheduled.
  async fn traverse(
    &self,
    workflow: &WorkflowDefinition,
    run_id: &str,
    cancel: &CancellationToken,
  ) -> Result<usize, EngineFault> {
    let limit = self
      .config
      .max_parallel_tasks
      .map_or(usize::MAX, NonZeroUsize::get);

    let mut pending: VecDeque<&TaskNode> = VecDeque::from([&workflow.root_task]);
    let mut scheduled: Vec<&TaskNode> = Vec::new();
    let mut in_flight: JoinSet<(usize, Result<TriggerOutcome, EngineFault>)> = JoinSet::new();
    let mut fault: Option<EngineFault> = None;

    loop {
      // A token cancelled before or between joins must stop scheduling too.
      if fault.is_none() && cancel.is_cancelled() {
        warn!(run_id, pending = pending.len(), "workflow cancelled");
        pending.clear();
        fault = Some(EngineFault::Cancelled);
      }

      while fault.is_none() && in_flight.len() < limit {
        let Some(node) = pending.pop_front() else {
          break;
        };
        let slot = scheduled.len();
        scheduled.push(node);
        let job = self.node_job(workflow, run_id, node);
        in_flight.spawn(async move { (slot, job.run().await) });
      }

      if in_flight.is_empty() {
        break;
      }

      let next = tokio::select! {
        joined = in_flight.join_next() => Next::Joined(joined),
        _ = cancel.cancelled(), if fault.is_none() => Next::Cancelled,
      };

      let joined = match next {
        Next::Cancelled => {
          warn!(run_id, pending = pending.len(), "workflow cancelled");
          pending.clear();
          fault = Some(EngineFault::Cancelled);
          continue;
        }
        Next::Joined(Some(joined)) => joined,
        Next::Joined(None) => break,
      };

      match joined {
        Ok((slot, Ok(outcome))) => {
          if fault.is_some() {
            continue;
          }
          let node = scheduled[slot];
          let children = node.branch(outcome);
          debug!(
            run_id,
            node_id = %node.node_id,
            outcome = %outcome,
            children = children.len(),
            "branch selected"
          );
          pending.extend(children.iter());
        }
        Ok((_, Err(e))) => record_fault(&mut fault, &mut pending, e),
        Err(e) => record_fault(&mut fault, &mut pending, join_fault(e)),
      }
    }

    match fault {
      Some(fault) => Err(fault),
      None => Ok(scheduled.len()),
    }
  }

  fn node_job(&self, workflow: &WorkflowDefinition, run_id: &str, node: &TaskNode) -> NodeJob {
    NodeJob {
      ledger: self.ledger.clone(),
      registry: self.registry.clone(),
      notifier: self.notifier.clone(),
      run_id: run_id.to_string(),
      environment_id: workflow.environment_id.clone(),
      node_id: node.node_id.clone(),
      task_id: node.task_id.clone(),
      task_timeout: self.config.task_timeout,
    }
  }
}

enum Next {
  Joined(Option<Result<(usize, Result<TriggerOutcome, EngineFault>), JoinError>>),
  Cancelled,
}

fn record_fault(slot: &mut Option<EngineFault>, pending: &mut VecDeque<&TaskNode>, fault: EngineFault) {
  pending.clear();
  match slot {
    None => *slot = Some(fault),
    Some(first) => debug!(error = %fault, first = %first, "additional fault after run failed"),
  }
}

fn join_fault(e: JoinError) -> EngineFault {
  EngineFault::Join {
    message: e.to_string(),
  }
}

/// Everything one node execution needs, owned so it can be spawned.
struct NodeJob {
  ledger: RunLedger,
  registry: Arc<dyn TaskRegistry>,
  notifier: Arc<dyn ExecutionNotifier>,
  run_id: String,
  environment_id: String,
  node_id: String,
  task_id: String,
  task_timeout: Option<Duration>,
}

impl NodeJob {
  #[instrument(
    name = "task_execute",
    skip(self),
    fields(run_id = %self.run_id, node_id = %self.node_id, task_id = %self.task_id)
  )]
  async fn run(self) -> Result<TriggerOutcome, EngineFault> {
    let log = self
      .ledger
      .log_task_start(&self.run_id, &self.node_id, &self.task_id)
      .await?;
    info!("task_started");
    self.notifier.notify(ExecutionEvent::TaskStarted {
      run_id: self.run_id.clone(),
      node_id: self.node_id.clone(),
      task_id: self.task_id.clone(),
    });

    match self.invoke().await {
      Ok(exit_code) => {
        let outcome = map_outcome(exit_code);
        self.ledger.log_task_outcome(log, outcome).await?;
        info!(exit_code, outcome = %outcome, "task_resolved");
        self.notifier.notify(ExecutionEvent::TaskResolved {
          run_id: self.run_id.clone(),
          node_id: self.node_id.clone(),
          exit_code,
          outcome,
        });
        Ok(outcome)
      }
      Err(fault) => {
        error!(error = %fault, "task_faulted");
        if let Err(e) = self.ledger.log_task_fault(log, fault.to_string()).await {
          warn!(error = %e, "failed to record task fault");
        }
        self.notifier.notify(ExecutionEvent::TaskFaulted {
          run_id: self.run_id.clone(),
          node_id: self.node_id.clone(),
          error: fault.to_string(),
        });
        Err(fault)
      }
    }
  }

  async fn invoke(&self) -> Result<ExitCode, EngineFault> {
    let call = self.registry.run_task(&self.task_id, &self.environment_id);
    let result = match self.task_timeout {
      Some(timeout) => tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| EngineFault::TaskTimeout {
          node_id: self.node_id.clone(),
          task_id: self.task_id.clone(),
          timeout,
        })?,
      None => call.await,
    };

    result.map_err(|source| EngineFault::Task {
      node_id: self.node_id.clone(),
      task_id: self.task_id.clone(),
      source,
    })
  }
}
