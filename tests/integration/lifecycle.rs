//! Lifecycle transitions as recorded by real runs.

use conductor::{
    Error, ExecutorKind, LifecycleState, LifecycleStateMachine, TransitionContext, WorkItem,
};
use tokio_test::{assert_err, assert_ok};

use crate::fixtures::{fast_config, orchestrator_with, test_task, Behavior, MockExecutor};

use LifecycleState::*;

async fn recorded_states(
    orchestrator: &conductor::Orchestrator,
    report: &conductor::ExecutionReport,
) -> Vec<LifecycleState> {
    let trace = assert_ok!(
        orchestrator
            .recorder()
            .get_trace(&report.session_id.to_string())
            .await
    )
    .expect("trace recorded");
    trace.transitions.iter().map(|t| t.to).collect()
}

// ========== Run Transition Tests ==========

#[tokio::test]
async fn test_successful_run_walks_happy_path() {
    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    let orchestrator = orchestrator_with(fast_config(2), codegen);

    let report = assert_ok!(
        orchestrator
            .run(&WorkItem::new("Happy", "- [ ] Build A\n"))
            .await
    );

    assert_eq!(
        recorded_states(&orchestrator, &report).await,
        vec![Pending, Analyzing, Implementing, Reviewing, Done]
    );

    let trace = assert_ok!(
        orchestrator
            .recorder()
            .get_trace(&report.session_id.to_string())
            .await
    )
    .unwrap();
    assert_eq!(trace.transitions[0].from, None);
    assert!(trace.transitions.iter().all(|t| t.triggered_by == "coordinator"));
    assert_eq!(
        trace.transitions[2].trigger.as_deref(),
        Some("analysis complete, executors assigned")
    );
}

#[tokio::test]
async fn test_failed_run_ends_in_failed() {
    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    codegen.set_behavior("task-1", Behavior::AlwaysFail);
    let mut config = fast_config(2);
    config.orchestrator.max_retries = 0;
    let orchestrator = orchestrator_with(config, codegen);

    let report = assert_ok!(
        orchestrator
            .run_with_tasks(&WorkItem::new("Broken", ""), vec![test_task("task-1", &[])])
            .await
    );

    assert_eq!(
        recorded_states(&orchestrator, &report).await,
        vec![Pending, Analyzing, Implementing, Failed]
    );
}

#[tokio::test]
async fn test_cycle_blocks_from_analyzing() {
    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    let orchestrator = orchestrator_with(fast_config(2), codegen);

    let tasks = vec![test_task("A", &["B"]), test_task("B", &["A"])];
    let report = assert_ok!(
        orchestrator
            .run_with_tasks(&WorkItem::new("Cyclic", ""), tasks)
            .await
    );

    assert_eq!(
        recorded_states(&orchestrator, &report).await,
        vec![Pending, Analyzing, Blocked]
    );
}

#[tokio::test]
async fn test_coordinator_only_tasks_cannot_start() {
    let codegen = MockExecutor::new(ExecutorKind::CodeGen);
    let orchestrator = orchestrator_with(fast_config(2), codegen.clone());

    let tasks = vec![test_task("task-1", &[]).with_executor(ExecutorKind::Coordinator)];
    let result = orchestrator
        .run_with_tasks(&WorkItem::new("Self assigned", ""), tasks)
        .await;

    assert!(matches!(result, Err(Error::TransitionRejected { .. })));
    assert!(codegen.started().is_empty());

    // Rejected before the run starts, so nothing is left half-recorded.
    let traces = assert_ok!(orchestrator.recorder().load_all_traces().await);
    assert!(traces.is_empty());
}

// ========== State Machine Tests ==========

#[test]
fn test_bootstrap_then_table_enforced() {
    let mut machine = LifecycleStateMachine::new();
    let ctx = TransitionContext::with_executor(ExecutorKind::CodeGen);

    assert_ok!(machine.transition(Done, "tracker", None, &ctx));
    let err = assert_err!(machine.transition(Implementing, "tracker", None, &ctx));
    assert!(matches!(err, Error::InvalidLifecycleTransition { .. }));
    assert_eq!(machine.current(), Some(Done));
}

#[test]
fn test_restore_from_label_and_resume() {
    let state = LifecycleState::from_label("state:blocked").unwrap();
    let mut machine = LifecycleStateMachine::starting_at(state);
    let ctx = TransitionContext::with_executor(ExecutorKind::Test);

    assert!(machine.can_transition(Analyzing, &ctx));
    assert!(!machine.can_transition(Done, &ctx));
    assert_ok!(machine.transition(Analyzing, "tracker", Some("unblocked".into()), &ctx));
    assert_ok!(machine.transition(Implementing, "tracker", None, &ctx));
    assert_eq!(machine.history().len(), 2);
}
