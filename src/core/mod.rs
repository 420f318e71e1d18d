//! Core domain models: tasks, work items and the dependency graph.

pub mod dag;
pub mod task;
pub mod work_item;

pub use dag::DependencyGraph;
pub use task::{ExecutorKind, Impact, Severity, Task, TaskId, TaskStatus, TaskType};
pub use work_item::WorkItem;
