//! Orchestration layer: planning, scheduling and dispatch of tasks.
//!
//! The [`Orchestrator`] drives a work item end to end. It builds an
//! [`ExecutionPlan`], lets the [`Scheduler`] pick eligible groups, sends
//! their tasks to [`Executor`]s and collects an [`ExecutionReport`].

pub mod escalation;
pub mod executor;
mod orchestrator;
pub mod plan;
pub mod report;
pub mod scheduler;

pub use escalation::{
    Escalation, EscalationCategory, EscalationPolicy, EscalationRule, EscalationTarget,
};
pub use executor::{
    CancellationToken, Executor, ExecutorOutcome, ExecutorRegistry, OutcomeStatus,
};
pub use orchestrator::Orchestrator;
pub use plan::{ExecutionPlan, SessionId, DEFAULT_MAX_CONCURRENCY};
pub use report::{
    list_recent_reports, ExecutionReport, JsonReportSink, ReportSink, ReportSummary, TaskResult,
    TaskResultStatus,
};
pub use scheduler::{
    FailOutcome, Gating, Granularity, GroupId, GroupStatus, ScheduledGroup, Scheduler,
    SchedulerEvent, SchedulerOptions, SchedulerStatus, DEFAULT_MAX_RETRIES,
};
