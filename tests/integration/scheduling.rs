//! Ordering, gating and concurrency limits observed through real runs.

use std::time::Duration;

use conductor::orchestration::{Gating, Granularity, SchedulerEvent, SchedulerStatus};
use conductor::{ExecutorKind, LifecycleState, TaskId, WorkItem};
use tokio::sync::mpsc;
use tokio_test::assert_ok;

use crate::fixtures::{
    continuous_config, diamond_tasks, fast_config, independent_tasks, orchestrator_with, test_task,
    Call, MockExecutor,
};

fn work_item() -> WorkItem {
    WorkItem::new("Scheduling", "")
}

// ========== Dependency Order Tests ==========

#[tokio::test]
async fn test_diamond_with_single_slot_runs_serially() {
    let codegen = MockExecutor::with_delay(ExecutorKind::CodeGen, Duration::from_millis(5));
    let orchestrator = orchestrator_with(fast_config(1), codegen.clone());

    let report = assert_ok!(orchestrator.run_with_tasks(&work_item(), diamond_tasks()).await);

    assert_eq!(report.summary.completed, 4);
    assert_eq!(codegen.max_in_flight(), 1);

    let started = codegen.started();
    assert_eq!(started.len(), 4);
    assert_eq!(started.first(), Some(&TaskId::from("A")));
    assert_eq!(started.last(), Some(&TaskId::from("D")));
}

#[tokio::test]
async fn test_diamond_middle_level_runs_in_parallel() {
    let codegen = MockExecutor::with_delay(ExecutorKind::CodeGen, Duration::from_millis(30));
    let orchestrator = orchestrator_with(fast_config(4), codegen.clone());

    let report = assert_ok!(orchestrator.run_with_tasks(&work_item(), diamond_tasks()).await);

    assert_eq!(report.final_state, Some(LifecycleState::Done));
    assert_eq!(codegen.max_in_flight(), 2);

    // Three levels: [A], [B, C], [D].
    assert_eq!(report.groups.len(), 3);
    assert_eq!(report.groups[1].task_ids.len(), 2);

    let start_d = codegen.position(&Call::start("D")).unwrap();
    assert!(codegen.position(&Call::end("B")).unwrap() < start_d);
    assert!(codegen.position(&Call::end("C")).unwrap() < start_d);
}

#[tokio::test]
async fn test_concurrency_limit_is_respected() {
    let codegen = MockExecutor::with_delay(ExecutorKind::CodeGen, Duration::from_millis(10));
    let orchestrator = orchestrator_with(fast_config(2), codegen.clone());

    let report = assert_ok!(
        orchestrator
            .run_with_tasks(&work_item(), independent_tasks(6))
            .await
    );

    assert_eq!(report.summary.completed, 6);
    assert!(codegen.max_in_flight() <= 2);
    assert!(codegen.max_in_flight() >= 1);
}

// ========== Gating Tests ==========

#[tokio::test]
async fn test_strict_gating_waits_for_lower_levels() {
    let codegen = MockExecutor::with_delay(ExecutorKind::CodeGen, Duration::from_millis(10));
    let orchestrator = orchestrator_with(continuous_config(4, Gating::Strict), codegen.clone());

    let report = assert_ok!(orchestrator.run_with_tasks(&work_item(), diamond_tasks()).await);
    assert_eq!(report.summary.completed, 4);

    let end_a = codegen.position(&Call::end("A")).unwrap();
    assert!(end_a < codegen.position(&Call::start("B")).unwrap());
    assert!(end_a < codegen.position(&Call::start("C")).unwrap());

    let start_d = codegen.position(&Call::start("D")).unwrap();
    assert!(codegen.position(&Call::end("B")).unwrap() < start_d);
    assert!(codegen.position(&Call::end("C")).unwrap() < start_d);
}

#[tokio::test]
async fn test_overlapping_gating_starts_next_level_early() {
    let codegen = MockExecutor::with_delay(ExecutorKind::CodeGen, Duration::from_millis(30));
    let orchestrator =
        orchestrator_with(continuous_config(4, Gating::Overlapping), codegen.clone());

    let report = assert_ok!(orchestrator.run_with_tasks(&work_item(), diamond_tasks()).await);

    assert_eq!(report.summary.completed, 4);
    assert_eq!(report.final_state, Some(LifecycleState::Done));
    assert!(
        codegen.position(&Call::start("B")).unwrap() < codegen.position(&Call::end("A")).unwrap()
    );
}

// ========== Granularity Tests ==========

#[tokio::test]
async fn test_task_granularity_orders_by_priority() {
    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    let mut config = fast_config(1);
    config.orchestrator.granularity = Granularity::Task;
    let orchestrator = orchestrator_with(config, codegen.clone());

    let tasks = vec![
        test_task("task-1", &[]).with_priority(3),
        test_task("task-2", &[]).with_priority(1),
        test_task("task-3", &[]).with_priority(2),
    ];
    let report = assert_ok!(orchestrator.run_with_tasks(&work_item(), tasks).await);

    assert_eq!(report.groups.len(), 3);
    assert!(report.groups.iter().all(|g| g.task_ids.len() == 1));
    assert_eq!(
        codegen.started(),
        vec![TaskId::numbered(2), TaskId::numbered(3), TaskId::numbered(1)]
    );
}

#[tokio::test]
async fn test_task_granularity_level_by_level_runs_in_parallel() {
    let codegen = MockExecutor::with_delay(ExecutorKind::CodeGen, Duration::from_millis(50));
    let mut config = fast_config(3);
    config.orchestrator.granularity = Granularity::Task;
    let orchestrator = orchestrator_with(config, codegen.clone());

    let report = assert_ok!(
        orchestrator
            .run_with_tasks(&work_item(), independent_tasks(3))
            .await
    );

    assert_eq!(report.summary.completed, 3);
    assert_eq!(report.groups.len(), 3);
    assert!(codegen.max_in_flight() > 1);

    // All three start before any of them ends.
    let first_end = codegen.log().iter().position(|c| matches!(c, Call::End(_))).unwrap();
    assert_eq!(first_end, 3);
}

#[tokio::test]
async fn test_task_granularity_waits_for_dependencies() {
    let codegen = MockExecutor::with_delay(ExecutorKind::CodeGen, Duration::from_millis(10));
    let mut config = fast_config(4);
    config.orchestrator.granularity = Granularity::Task;
    let orchestrator = orchestrator_with(config, codegen.clone());

    let report = assert_ok!(orchestrator.run_with_tasks(&work_item(), diamond_tasks()).await);

    assert_eq!(report.summary.completed, 4);
    assert_eq!(codegen.max_in_flight(), 2);
    let start_d = codegen.position(&Call::start("D")).unwrap();
    assert!(codegen.position(&Call::end("B")).unwrap() < start_d);
    assert!(codegen.position(&Call::end("C")).unwrap() < start_d);
}

// ========== Event Tests ==========

#[tokio::test]
async fn test_scheduler_events_are_forwarded() {
    let (tx, mut rx) = mpsc::channel(64);
    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    let orchestrator = orchestrator_with(fast_config(4), codegen).with_scheduler_events(tx);

    assert_ok!(orchestrator.run_with_tasks(&work_item(), diamond_tasks()).await);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    let started = events
        .iter()
        .filter(|e| matches!(e, SchedulerEvent::GroupStarted { .. }))
        .count();
    let completed = events
        .iter()
        .filter(|e| matches!(e, SchedulerEvent::GroupCompleted { .. }))
        .count();
    assert_eq!(started, 3);
    assert_eq!(completed, 3);
    assert_eq!(
        events.last(),
        Some(&SchedulerEvent::Finished {
            status: SchedulerStatus::Completed
        })
    );
}
