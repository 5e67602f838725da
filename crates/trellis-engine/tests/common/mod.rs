#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use trellis_config::WorkflowDef;
use trellis_engine::{EngineConfig, WorkflowService};
use trellis_store::MemoryStore;
use trellis_task_runtime::{ExitCode, TaskError, TaskRegistry};
use trellis_workflow::WorkflowDefinition;

/// What a scripted task does when run.
#[derive(Debug, Clone)]
enum Behavior {
  Exit(ExitCode),
  Fault,
}

#[derive(Debug, Clone)]
struct Script {
  behavior: Behavior,
  delay: Option<Duration>,
}

/// A task registry whose tasks are scripted by the test.
///
/// Unscripted tasks fault with `TaskError::NotFound`.
#[derive(Default)]
pub struct FakeRegistry {
  scripts: HashMap<String, Script>,
  names: HashMap<String, String>,
  calls: Mutex<Vec<String>>,
  running: AtomicUsize,
  peak: AtomicUsize,
}

impl FakeRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn exits(mut self, task_id: &str, code: ExitCode) -> Self {
    self.scripts.insert(
      task_id.to_string(),
      Script {
        behavior: Behavior::Exit(code),
        delay: None,
      },
    );
    self
  }

  pub fn faults(mut self, task_id: &str) -> Self {
    self.scripts.insert(
      task_id.to_string(),
      Script {
        behavior: Behavior::Fault,
        delay: None,
      },
    );
    self
  }

  /// Make a scripted task take `delay` before finishing.
  pub fn delayed(mut self, task_id: &str, delay: Duration) -> Self {
    if let Some(script) = self.scripts.get_mut(task_id) {
      script.delay = Some(delay);
    }
    self
  }

  pub fn named(mut self, task_id: &str, name: &str) -> Self {
    self.names.insert(task_id.to_string(), name.to_string());
    self
  }

  /// Task ids in the order they were invoked.
  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  /// Highest number of tasks observed running at once.
  pub fn peak_concurrency(&self) -> usize {
    self.peak.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl TaskRegistry for FakeRegistry {
  async fn run_task(&self, task_id: &str, _environment_id: &str) -> Result<ExitCode, TaskError> {
    self.calls.lock().unwrap().push(task_id.to_string());
    let script = self.scripts.get(task_id).cloned();

    let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);
    if let Some(delay) = script.as_ref().and_then(|s| s.delay) {
      tokio::time::sleep(delay).await;
    }
    self.running.fetch_sub(1, Ordering::SeqCst);

    match script.map(|s| s.behavior) {
      Some(Behavior::Exit(code)) => Ok(code),
      Some(Behavior::Fault) | None => Err(TaskError::NotFound {
        task_id: task_id.to_string(),
      }),
    }
  }

  async fn task_name(&self, task_id: &str) -> Option<String> {
    self.names.get(task_id).cloned()
  }
}

pub struct Harness {
  pub store: Arc<MemoryStore>,
  pub registry: Arc<FakeRegistry>,
  pub service: WorkflowService,
}

impl Harness {
  pub fn new(registry: FakeRegistry) -> Self {
    Self::with_config(registry, EngineConfig::default())
  }

  pub fn with_config(registry: FakeRegistry, config: EngineConfig) -> Self {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(registry);
    let service = WorkflowService::new(store.clone(), registry.clone(), config);
    Self {
      store,
      registry,
      service,
    }
  }

  /// Create a workflow in project `p1` from a JSON task tree.
  pub async fn workflow(&self, tasks: serde_json::Value) -> WorkflowDefinition {
    let def: WorkflowDef = serde_json::from_value(json!({
      "workflow_name": "Test Workflow",
      "project_id": "p1",
      "environment_id": "dev",
      "tasks": tasks
    }))
    .unwrap();
    self.service.create_workflow(def).await.unwrap()
  }
}
