mod common;

use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use trellis_config::WorkflowDef;
use trellis_engine::WorkflowTrigger;
use trellis_store::{RunStatus, TaskLogStatus};

use common::{FakeRegistry, Harness};

#[tokio::test]
async fn test_workflow_logs_join_display_fields() {
  let harness = Harness::new(
    FakeRegistry::new()
      .exits("extract", 1)
      .exits("alert", 0)
      .named("extract", "Extract orders"),
  );
  harness
    .service
    .create_project("Payments", Some("p1".to_string()))
    .await
    .unwrap();
  let workflow = harness
    .workflow(json!({
      "task_id": "extract",
      "children": { "on_failure": [{ "task_id": "alert" }] }
    }))
    .await;

  let report = harness
    .service
    .execute_workflow(&workflow.id, CancellationToken::new())
    .await
    .unwrap();

  let logs = harness.service.workflow_logs(&workflow.id).await.unwrap();
  assert_eq!(logs.len(), 1);
  let entry = &logs[0];
  assert_eq!(entry.run_id, report.run_id);
  assert_eq!(entry.workflow_id, workflow.id);
  assert_eq!(entry.project_name.as_deref(), Some("Payments"));
  assert_eq!(entry.workflow_status, RunStatus::Completed);
  assert!(entry.end_date.is_some());

  assert_eq!(entry.task_logs.len(), 2);
  assert_eq!(entry.task_logs[0].task_name.as_deref(), Some("Extract orders"));
  assert_eq!(entry.task_logs[0].status, TaskLogStatus::OnFailure);
  assert_eq!(entry.task_logs[1].task_name, None);
  assert_eq!(entry.task_logs[1].status, TaskLogStatus::OnCompletion);

  let value = serde_json::to_value(&logs).unwrap();
  assert_eq!(value[0]["workflow_status"], "COMPLETED");
  assert_eq!(value[0]["task_logs"][0]["status"], "on_failure");
}

#[tokio::test]
async fn test_workflow_logs_newest_first() {
  let harness = Harness::new(FakeRegistry::new().exits("root", 0));
  let workflow = harness.workflow(json!({ "task_id": "root" })).await;

  let first = harness
    .service
    .execute_workflow(&workflow.id, CancellationToken::new())
    .await
    .unwrap();
  tokio::time::sleep(Duration::from_millis(5)).await;
  let second = harness
    .service
    .execute_workflow(&workflow.id, CancellationToken::new())
    .await
    .unwrap();

  let logs = harness.service.workflow_logs(&workflow.id).await.unwrap();
  let ids: Vec<_> = logs.iter().map(|l| l.run_id.clone()).collect();
  assert_eq!(ids, vec![second.run_id, first.run_id]);
  assert_eq!(logs[0].project_name, None);
}

#[tokio::test]
async fn test_unknown_workflow_is_not_found() {
  let harness = Harness::new(FakeRegistry::new());

  let err = harness
    .service
    .execute_workflow("missing", CancellationToken::new())
    .await
    .unwrap_err();
  assert!(err.is_not_found());

  let err = harness.service.workflow_logs("missing").await.unwrap_err();
  assert!(err.is_not_found());

  let err = harness.service.run_logs("missing").await.unwrap_err();
  assert!(err.is_not_found());
}

#[tokio::test]
async fn test_invalid_workflow_is_rejected() {
  let harness = Harness::new(FakeRegistry::new());
  let def: WorkflowDef = serde_json::from_value(json!({
    "workflow_name": "Broken",
    "project_id": "p1",
    "tasks": {
      "task_id": "",
      "children": { "on_retry": [{ "task_id": "x" }] }
    }
  }))
  .unwrap();

  let err = harness.service.create_workflow(def).await.unwrap_err();
  assert!(err.is_invalid());
  assert!(!err.is_not_found());
  assert!(harness.service.list_workflows("p1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_run_history_summaries() {
  let harness = Harness::new(FakeRegistry::new().exits("root", 2).exits("a", 0));
  let workflow = harness
    .workflow(json!({
      "task_id": "root",
      "children": { "on_success": [{ "task_id": "a" }] }
    }))
    .await;

  harness
    .service
    .execute_workflow(&workflow.id, CancellationToken::new())
    .await
    .unwrap();

  let history = harness.service.run_history(&workflow.id).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].workflow_name, "Test Workflow");
  assert_eq!(history[0].task_count, 2);
  assert!(history[0].duration().is_some());
}

#[tokio::test]
async fn test_trigger_dispatches_each_request() {
  let harness = Harness::new(FakeRegistry::new().exits("root", 0));
  let workflow = harness.workflow(json!({ "task_id": "root" })).await;

  let trigger = WorkflowTrigger::new(harness.service.clone());
  trigger.trigger(workflow.id.clone()).await.unwrap();
  trigger.trigger(workflow.id.clone()).await.unwrap();
  trigger.trigger("missing").await.unwrap();

  // No outside senders remain, so the loop drains and returns.
  trigger.start(CancellationToken::new()).await;

  let logs = harness.service.workflow_logs(&workflow.id).await.unwrap();
  assert_eq!(logs.len(), 2);
  assert!(
    logs
      .iter()
      .all(|l| l.workflow_status == RunStatus::Completed)
  );
}

#[tokio::test]
async fn test_trigger_stops_on_cancel() {
  let harness = Harness::new(FakeRegistry::new());
  let trigger = WorkflowTrigger::new(harness.service.clone());
  let _sender = trigger.sender();

  let cancel = CancellationToken::new();
  cancel.cancel();
  tokio::time::timeout(Duration::from_secs(1), trigger.start(cancel))
    .await
    .unwrap();
}
