//! Observational record of orchestrator runs.

mod recorder;

pub use recorder::{ExecutionSpan, RunTrace, SpanStatus, TaskCounters, TraceRecorder};
