//! Retries, exhausted groups, timeouts, cancellation and cycles.

use std::sync::Arc;
use std::time::Duration;

use conductor::orchestration::{EscalationCategory, EscalationTarget, GroupStatus, TaskResultStatus};
use conductor::trace::SpanStatus;
use conductor::{Error, ExecutorKind, LifecycleState, Severity, TaskId, TaskType, WorkItem};
use tokio_test::{assert_err, assert_ok};

use crate::fixtures::{
    diamond_tasks, fast_config, orchestrator_with, test_task, Behavior, MockExecutor,
};

fn work_item() -> WorkItem {
    WorkItem::new("Failure handling", "")
}

fn chain() -> Vec<conductor::Task> {
    vec![test_task("task-1", &[]), test_task("task-2", &["task-1"])]
}

// ========== Retry Tests ==========

#[tokio::test]
async fn test_flaky_task_is_retried_alone() {
    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    codegen.set_behavior("C", Behavior::FailTimes(1));
    let orchestrator = orchestrator_with(fast_config(4), codegen.clone());

    let report = assert_ok!(orchestrator.run_with_tasks(&work_item(), diamond_tasks()).await);

    assert_eq!(report.final_state, Some(LifecycleState::Done));
    assert_eq!(report.summary.completed, 4);
    assert_eq!(report.summary.success_rate, 100.0);

    // Only the failed sibling is sent again.
    assert_eq!(codegen.attempts("B"), 1);
    assert_eq!(codegen.attempts("C"), 2);

    let c = report.result(&TaskId::from("C")).unwrap();
    assert_eq!(c.status, TaskResultStatus::Completed);
    assert_eq!(c.attempts, 2);

    let middle = &report.groups[1];
    assert_eq!(middle.status, GroupStatus::Completed);
    assert_eq!(middle.retry_count, 1);
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_run() {
    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    codegen.set_behavior("task-1", Behavior::AlwaysFail);
    let orchestrator = orchestrator_with(fast_config(4), codegen.clone());

    let report = assert_ok!(orchestrator.run_with_tasks(&work_item(), chain()).await);

    assert_eq!(report.final_state, Some(LifecycleState::Failed));
    // One attempt plus the default two retries.
    assert_eq!(codegen.attempts("task-1"), 3);
    assert_eq!(codegen.attempts("task-2"), 0);

    let first = report.result(&TaskId::numbered(1)).unwrap();
    assert_eq!(first.status, TaskResultStatus::Failed);
    assert_eq!(first.attempts, 3);

    let downstream = report.result(&TaskId::numbered(2)).unwrap();
    assert_eq!(downstream.status, TaskResultStatus::Failed);
    assert_eq!(downstream.attempts, 0);
    assert!(downstream
        .error
        .as_deref()
        .unwrap()
        .contains("waiting on task-1"));

    assert_eq!(report.summary.failed, 2);
    assert_eq!(report.summary.success_rate, 0.0);
    assert!(report.groups.iter().all(|g| g.status == GroupStatus::Failed));
    assert!(report.escalations.is_empty());
}

#[tokio::test]
async fn test_exhausted_retries_can_escalate() {
    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    codegen.set_behavior("task-1", Behavior::AlwaysFail);
    let mut config = fast_config(4);
    config.orchestrator.max_retries = 0;
    config.orchestrator.escalate_on_exhausted_retries = true;
    let orchestrator = orchestrator_with(config, codegen.clone());

    let report = assert_ok!(orchestrator.run_with_tasks(&work_item(), chain()).await);

    assert_eq!(report.final_state, Some(LifecycleState::Blocked));
    assert_eq!(codegen.attempts("task-1"), 1);
    assert_eq!(report.escalations.len(), 1);

    let escalation = &report.escalations[0];
    assert_eq!(escalation.category, EscalationCategory::RetriesExhausted);
    assert_eq!(escalation.severity, Severity::High);
    assert_eq!(escalation.target, EscalationTarget::TechLead);
    assert_eq!(escalation.task_ids, vec![TaskId::numbered(1)]);
    assert!(escalation.reason.ends_with("blocks task-2"));

    assert_eq!(
        report.result(&TaskId::numbered(1)).unwrap().status,
        TaskResultStatus::Escalated
    );
    assert_eq!(report.summary.escalated, 1);
}

#[tokio::test]
async fn test_missing_executor_fails_task() {
    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    let mut config = fast_config(4);
    config.orchestrator.max_retries = 0;
    let orchestrator = orchestrator_with(config, codegen.clone());

    let tasks = vec![
        test_task("task-1", &[]),
        test_task("task-2", &[]).with_type(TaskType::Deployment),
    ];
    let report = assert_ok!(orchestrator.run_with_tasks(&work_item(), tasks).await);

    assert_eq!(report.final_state, Some(LifecycleState::Failed));
    assert_eq!(report.summary.completed, 1);

    let deploy = report.result(&TaskId::numbered(2)).unwrap();
    assert_eq!(deploy.status, TaskResultStatus::Failed);
    assert_eq!(deploy.executor, ExecutorKind::Deploy);
    assert!(deploy.error.as_deref().unwrap().contains("No executor registered"));
}

// ========== Timeout and Cancellation Tests ==========

#[tokio::test(start_paused = true)]
async fn test_hung_task_times_out() {
    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    codegen.set_behavior("task-1", Behavior::Hang);
    let mut config = fast_config(4);
    config.orchestrator.max_retries = 0;
    config.orchestrator.task_timeout_secs = 1;
    let orchestrator = orchestrator_with(config, codegen.clone());

    let report = assert_ok!(
        orchestrator
            .run_with_tasks(&work_item(), vec![test_task("task-1", &[])])
            .await
    );

    assert_eq!(report.final_state, Some(LifecycleState::Failed));
    let result = report.result(&TaskId::numbered(1)).unwrap();
    assert!(result.error.as_deref().unwrap().contains("timed out"));

    let run_id = report.session_id.to_string();
    let trace = assert_ok!(orchestrator.recorder().get_trace(&run_id).await).unwrap();
    assert_eq!(trace.spans.len(), 1);
    assert_eq!(trace.spans[0].status, SpanStatus::Timeout);
}

#[tokio::test]
async fn test_cancellation_pauses_the_run() {
    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    codegen.set_behavior("task-1", Behavior::Hang);
    let orchestrator = orchestrator_with(fast_config(4), codegen.clone());

    let token = orchestrator.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let report = assert_ok!(orchestrator.run_with_tasks(&work_item(), chain()).await);

    assert_eq!(report.final_state, Some(LifecycleState::Paused));
    assert_eq!(codegen.attempts("task-1"), 1);
    assert_eq!(codegen.attempts("task-2"), 0);

    let downstream = report.result(&TaskId::numbered(2)).unwrap();
    assert_eq!(downstream.status, TaskResultStatus::Failed);
    assert_eq!(downstream.attempts, 0);

    let run_id = report.session_id.to_string();
    let trace = assert_ok!(orchestrator.recorder().get_trace(&run_id).await).unwrap();
    assert_eq!(trace.spans.len(), 1);
    assert_eq!(trace.spans[0].status, SpanStatus::Cancelled);
}

// ========== Validation Tests ==========

#[tokio::test]
async fn test_duplicate_task_ids_are_rejected() {
    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    let orchestrator = orchestrator_with(fast_config(4), codegen.clone());

    let tasks = vec![
        test_task("task-1", &[]),
        test_task("task-2", &["task-1"]),
        test_task("task-1", &[]).with_type(TaskType::Deployment),
    ];
    let err = assert_err!(orchestrator.run_with_tasks(&work_item(), tasks).await);

    assert!(matches!(err, Error::Validation(ref msg) if msg.contains("task-1")));
    assert!(codegen.started().is_empty());
    let traces = assert_ok!(orchestrator.recorder().load_all_traces().await);
    assert!(traces.is_empty());
}

// ========== Cycle Tests ==========

#[tokio::test]
async fn test_cycle_blocks_without_dispatch() {
    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    let orchestrator = orchestrator_with(fast_config(4), codegen.clone());

    let tasks = vec![
        test_task("A", &["B"]),
        test_task("B", &["A"]),
        test_task("C", &[]),
    ];
    let report = assert_ok!(orchestrator.run_with_tasks(&work_item(), tasks).await);

    assert_eq!(report.final_state, Some(LifecycleState::Blocked));
    assert!(report.groups.is_empty());
    assert!(codegen.started().is_empty());

    assert_eq!(report.escalations.len(), 1);
    assert_eq!(report.escalations[0].category, EscalationCategory::CycleDetected);
    assert!(report.escalations[0].reason.contains("dependency cycle"));

    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.escalated, 3);
    assert!(report
        .results
        .iter()
        .all(|r| r.status == TaskResultStatus::Escalated && r.attempts == 0));
}

#[tokio::test]
async fn test_shared_orchestrator_runs_concurrently() {
    let codegen = MockExecutor::with_delay(ExecutorKind::CodeGen, Duration::from_millis(5));
    let orchestrator = Arc::new(orchestrator_with(fast_config(2), codegen.clone()));

    let a = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .run(&WorkItem::new("First", "- [ ] One\n- [ ] Two #1\n"))
                .await
        })
    };
    let b = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .run(&WorkItem::new("Second", "- [ ] Three\n"))
                .await
        })
    };

    let a = assert_ok!(a.await.unwrap());
    let b = assert_ok!(b.await.unwrap());
    assert_ne!(a.session_id, b.session_id);
    assert_eq!(a.final_state, Some(LifecycleState::Done));
    assert_eq!(b.final_state, Some(LifecycleState::Done));

    let traces = assert_ok!(orchestrator.recorder().load_all_traces().await);
    assert_eq!(traces.len(), 2);
}
