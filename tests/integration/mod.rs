//! Integration test suite for conductor.
//!
//! These tests drive the orchestrator end to end with mock executors and
//! verify that extraction, graph levelling, scheduling, lifecycle and
//! reporting work together.
//!
//! # Test Categories
//!
//! - `end_to_end`: Full runs from work item to persisted report
//! - `scheduling`: Ordering, gating and concurrency limits
//! - `failures`: Retries, exhausted groups, cycles, timeouts, cancellation
//! - `lifecycle`: Lifecycle transitions observed through runs
//!
//! # CI Compatibility
//!
//! No test talks to an external system; executors are in-process mocks
//! and storage uses temporary directories.


mod end_to_end;
mod failures;
mod lifecycle;
mod scheduling;
