//! Task data model for the execution DAG.
//!
//! Tasks are the atomic units of work decomposed from a work item. Each
//! task carries its scheduling hints, its declared dependencies and the
//! executor kind that will carry it out.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Identifier of a task, unique within a single run.
///
/// Extracted tasks use the synthetic form `task-<n>` so that inline
/// `#<n>` back-references can be mapped onto them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Synthetic id for the `n`-th discovered task.
    pub fn numbered(n: usize) -> Self {
        Self(format!("task-{}", n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    Feature,
    Bug,
    Refactor,
    Docs,
    Test,
    Deployment,
}

impl TaskType {
    /// Default duration estimate for a task of this type.
    pub fn default_duration_ms(&self) -> u64 {
        const MINUTE: u64 = 60_000;
        match self {
            TaskType::Feature => 60 * MINUTE,
            TaskType::Bug => 30 * MINUTE,
            TaskType::Refactor => 45 * MINUTE,
            TaskType::Docs => 20 * MINUTE,
            TaskType::Test => 30 * MINUTE,
            TaskType::Deployment => 15 * MINUTE,
        }
    }

    /// Executor kind that handles tasks of this type.
    pub fn default_executor(&self) -> ExecutorKind {
        match self {
            TaskType::Feature | TaskType::Bug | TaskType::Refactor | TaskType::Docs => {
                ExecutorKind::CodeGen
            }
            TaskType::Test => ExecutorKind::Test,
            TaskType::Deployment => ExecutorKind::Deploy,
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::Feature => write!(f, "feature"),
            TaskType::Bug => write!(f, "bug"),
            TaskType::Refactor => write!(f, "refactor"),
            TaskType::Docs => write!(f, "docs"),
            TaskType::Test => write!(f, "test"),
            TaskType::Deployment => write!(f, "deployment"),
        }
    }
}

/// Severity level. Advisory on tasks; also used to tag escalations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::High => write!(f, "high"),
            Severity::Medium => write!(f, "medium"),
            Severity::Low => write!(f, "low"),
        }
    }
}

/// Expected impact of a task. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

/// Task status during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet dispatched, or waiting for a retry.
    #[default]
    Idle,
    /// Handed to an executor.
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Idle => write!(f, "idle"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// The external executor responsible for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    /// The orchestrating actor itself. Never a valid task assignee.
    Coordinator,
    #[serde(rename = "codegen")]
    CodeGen,
    Review,
    Test,
    Deploy,
    Issue,
    PullRequest,
}

impl std::fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorKind::Coordinator => write!(f, "coordinator"),
            ExecutorKind::CodeGen => write!(f, "codegen"),
            ExecutorKind::Review => write!(f, "review"),
            ExecutorKind::Test => write!(f, "test"),
            ExecutorKind::Deploy => write!(f, "deploy"),
            ExecutorKind::Issue => write!(f, "issue"),
            ExecutorKind::PullRequest => write!(f, "pull_request"),
        }
    }
}

/// A single decomposed unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    /// Source text the task was extracted from.
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// Lower values are scheduled earlier among otherwise equal tasks.
    pub priority: u32,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub impact: Impact,
    #[serde(default)]
    pub dependencies: BTreeSet<TaskId>,
    pub estimated_duration_ms: u64,
    #[serde(default)]
    pub status: TaskStatus,
    pub assigned_executor: ExecutorKind,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Task {
    /// Create a feature task with defaults derived from its type.
    pub fn new(id: impl Into<TaskId>, title: &str) -> Self {
        let task_type = TaskType::Feature;
        Self {
            id: id.into(),
            title: title.to_string(),
            description: String::new(),
            task_type,
            priority: 0,
            severity: Severity::default(),
            impact: Impact::default(),
            dependencies: BTreeSet::new(),
            estimated_duration_ms: task_type.default_duration_ms(),
            status: TaskStatus::Idle,
            assigned_executor: task_type.default_executor(),
            metadata: BTreeMap::new(),
        }
    }

    /// Set the type, re-deriving the executor and duration estimate.
    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self.assigned_executor = task_type.default_executor();
        self.estimated_duration_ms = task_type.default_duration_ms();
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.estimated_duration_ms = ms;
        self
    }

    pub fn with_executor(mut self, kind: ExecutorKind) -> Self {
        self.assigned_executor = kind;
        self
    }

    pub fn with_dependency(mut self, dep: impl Into<TaskId>) -> Self {
        self.dependencies.insert(dep.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn start(&mut self) {
        self.status = TaskStatus::Running;
    }

    pub fn complete(&mut self) {
        self.status = TaskStatus::Completed;
    }

    pub fn fail(&mut self) {
        self.status = TaskStatus::Failed;
    }

    /// Return a failed task to idle so it can be retried.
    pub fn reset(&mut self) {
        self.status = TaskStatus::Idle;
    }

    /// Check if the task is in a terminal state (Completed or Failed).
    pub fn is_finished(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }
}
