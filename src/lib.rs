//! Work-item decomposition and DAG-driven task orchestration.
//!
//! A work item is split into tasks by the [`TaskExtractor`], the tasks are
//! levelled in a [`DependencyGraph`], and the [`Orchestrator`] runs them
//! through the [`Scheduler`] on pluggable [`Executor`]s while tracking the
//! work item's [`LifecycleState`].

pub mod config;
pub mod core;
pub mod error;
pub mod extract;
pub mod lifecycle;
pub mod log;
pub mod orchestration;
pub mod trace;

pub use config::{Config, OrchestratorConfig, StorageConfig, Strategy};
pub use crate::core::{
    DependencyGraph, ExecutorKind, Impact, Severity, Task, TaskId, TaskStatus, TaskType, WorkItem,
};
pub use error::{Error, Result};
pub use extract::TaskExtractor;
pub use lifecycle::{
    ChannelMirror, LifecycleMirror, LifecycleState, LifecycleStateMachine, StateTransition,
    TransitionContext,
};
pub use orchestration::{
    CancellationToken, ExecutionReport, Executor, ExecutorOutcome, ExecutorRegistry,
    JsonReportSink, Orchestrator, ReportSink, Scheduler, SessionId, TaskResult, TaskResultStatus,
};
pub use trace::{RunTrace, TraceRecorder};
