//! Full runs from a work item to a finished report.

use std::sync::Arc;
use std::time::Duration;

use conductor::orchestration::{list_recent_reports, Gating, TaskResultStatus};
use conductor::{
    ChannelMirror, ExecutorKind, JsonReportSink, LifecycleState, Orchestrator, TaskId,
    TraceRecorder, WorkItem,
};
use tempfile::TempDir;
use tokio_test::assert_ok;

use crate::fixtures::{continuous_config, diamond_tasks, fast_config, orchestrator_with, MockExecutor};

const TWO_STEP_BODY: &str = "- [ ] Build A\n- [ ] Build B (depends: #1)\n";

// ========== Happy Path Tests ==========

#[tokio::test]
async fn test_checkbox_work_item_runs_to_done() {
    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    let orchestrator = orchestrator_with(fast_config(5), codegen.clone());

    let item = WorkItem::new("Two step feature", TWO_STEP_BODY).with_issue(42);
    let report = assert_ok!(orchestrator.run(&item).await);

    assert_eq!(report.work_item, "#42");
    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.completed, 2);
    assert_eq!(report.summary.failed, 0);
    assert_eq!(report.summary.success_rate, 100.0);
    assert_eq!(report.final_state, Some(LifecycleState::Done));
    assert!(report.finished_at.is_some());
    assert!(report.escalations.is_empty());

    // One group per level, in dependency order.
    let levels: Vec<Vec<TaskId>> = report.groups.iter().map(|g| g.task_ids.clone()).collect();
    assert_eq!(
        levels,
        vec![vec![TaskId::numbered(1)], vec![TaskId::numbered(2)]]
    );
    assert_eq!(
        codegen.started(),
        vec![TaskId::numbered(1), TaskId::numbered(2)]
    );

    for result in &report.results {
        assert_eq!(result.status, TaskResultStatus::Completed);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.executor, ExecutorKind::CodeGen);
        assert!(result.started_at.is_some());
    }
}

#[tokio::test]
async fn test_unstructured_body_runs_single_task() {
    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    let orchestrator = orchestrator_with(fast_config(5), codegen.clone());

    let item = WorkItem::new("Fix crash on login", "The app crashes when I log in.");
    let report = assert_ok!(orchestrator.run(&item).await);

    assert_eq!(report.summary.total, 1);
    assert_eq!(report.summary.completed, 1);
    assert_eq!(report.results[0].task_id, TaskId::numbered(1));
    assert_eq!(report.final_state, Some(LifecycleState::Done));
    assert_eq!(codegen.attempts("task-1"), 1);
}

#[tokio::test]
async fn test_mixed_executors_are_routed_by_kind() {
    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    let tester = MockExecutor::new(ExecutorKind::Test);
    let registry = crate::fixtures::registry_with(codegen.clone(), tester.clone());
    let orchestrator = Orchestrator::new(fast_config(5), registry);

    let body = "1. Implement parser\n2. Add test coverage for parser #1\n";
    let report = assert_ok!(orchestrator.run(&WorkItem::new("Parser", body)).await);

    assert_eq!(report.summary.completed, 2);
    assert_eq!(codegen.started(), vec![TaskId::numbered(1)]);
    assert_eq!(tester.started(), vec![TaskId::numbered(2)]);
    let test_result = report.result(&TaskId::numbered(2)).unwrap();
    assert_eq!(test_result.executor, ExecutorKind::Test);
}

#[tokio::test]
async fn test_empty_task_list_is_rejected() {
    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    let orchestrator = orchestrator_with(fast_config(5), codegen);

    let result = orchestrator
        .run_with_tasks(&WorkItem::new("Nothing", ""), Vec::new())
        .await;
    assert!(matches!(result, Err(conductor::Error::Validation(_))));
}

#[tokio::test]
async fn test_continuous_strategy_completes_diamond() {
    let codegen = MockExecutor::with_delay(ExecutorKind::CodeGen, Duration::from_millis(5));
    let orchestrator = orchestrator_with(continuous_config(4, Gating::Strict), codegen.clone());

    let report = assert_ok!(
        orchestrator
            .run_with_tasks(&WorkItem::new("Diamond", ""), diamond_tasks())
            .await
    );

    assert_eq!(report.summary.completed, 4);
    assert_eq!(report.groups.len(), 4);
    assert_eq!(report.final_state, Some(LifecycleState::Done));
}

// ========== Persistence Tests ==========

#[tokio::test]
async fn test_report_sink_writes_json() {
    let temp = TempDir::new().unwrap();
    let sink = Arc::new(JsonReportSink::new(temp.path()));
    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    let orchestrator = orchestrator_with(fast_config(5), codegen).with_report_sink(sink.clone());

    let report = assert_ok!(
        orchestrator
            .run(&WorkItem::new("Persisted", TWO_STEP_BODY))
            .await
    );

    let path = sink.path_for(&report.session_id);
    assert!(path.exists());

    let loaded = assert_ok!(sink.load(&report.session_id).await);
    assert_eq!(loaded.session_id, report.session_id);
    assert_eq!(loaded.summary, report.summary);
    assert_eq!(loaded.final_state, Some(LifecycleState::Done));

    let recent = assert_ok!(list_recent_reports(temp.path()).await);
    assert_eq!(recent, vec![path]);
}

#[tokio::test]
async fn test_with_storage_persists_report_and_trace() {
    let temp = TempDir::new().unwrap();
    let mut config = fast_config(5);
    config.storage.report_dir = Some(temp.path().join("reports").display().to_string());
    config.storage.trace_dir = Some(temp.path().join("traces").display().to_string());

    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    let registry = Arc::new(conductor::ExecutorRegistry::new().with(codegen));
    let orchestrator = assert_ok!(Orchestrator::with_storage(config, registry));

    let report = assert_ok!(orchestrator.run(&WorkItem::new("Stored", TWO_STEP_BODY)).await);
    let run_id = report.session_id.to_string();

    let reports = assert_ok!(list_recent_reports(&temp.path().join("reports")).await);
    assert_eq!(reports.len(), 1);

    // A fresh recorder only sees what was written to disk.
    let reader = TraceRecorder::with_dir(temp.path().join("traces"));
    let trace = assert_ok!(reader.get_trace(&run_id).await).expect("trace on disk");
    assert_eq!(trace.counters.total, 2);
    assert_eq!(trace.counters.completed, 2);
    assert_eq!(trace.spans.len(), 2);
    assert_eq!(
        trace.transitions.last().map(|t| t.to),
        Some(LifecycleState::Done)
    );
}

// ========== Mirror Tests ==========

#[tokio::test]
async fn test_mirror_receives_every_transition() {
    let (mirror, mut rx) = ChannelMirror::channel(16);
    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    let orchestrator =
        orchestrator_with(fast_config(5), codegen).with_mirror(Arc::new(mirror));

    let item = WorkItem::new("Mirrored", TWO_STEP_BODY).with_issue(7);
    assert_ok!(orchestrator.run(&item).await);

    let mut labels = Vec::new();
    while labels.len() < 5 {
        match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(event)) => {
                assert_eq!(event.work_item, "#7");
                labels.push(event.label());
            }
            _ => break,
        }
    }

    // Mirror calls are spawned, so only the set is stable.
    labels.sort();
    assert_eq!(
        labels,
        vec![
            "state:analyzing",
            "state:done",
            "state:implementing",
            "state:pending",
            "state:reviewing",
        ]
    );
}
