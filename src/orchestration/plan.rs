//! Execution plan for a single orchestrator run.

use crate::core::dag::DependencyGraph;
use crate::core::task::{Task, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Default upper bound on parallel groups and tasks.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Unique identifier for an orchestrator run.
///
/// Uses UUID v4 and provides a short form for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 characters of the UUID.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Read-only input to scheduling, created once per run.
#[derive(Debug)]
pub struct ExecutionPlan {
    pub session_id: SessionId,
    /// Effective concurrency: the configured maximum capped at the task
    /// count, never below one.
    pub concurrency: usize,
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
    graph: DependencyGraph,
    /// Sum over levels of the longest task in each level.
    pub estimated_duration_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl ExecutionPlan {
    pub fn new(
        session_id: SessionId,
        tasks: Vec<Task>,
        graph: DependencyGraph,
        max_concurrency: usize,
    ) -> Self {
        let index: HashMap<TaskId, usize> = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .rev()
            .collect();

        let estimated_duration_ms = graph
            .levels()
            .iter()
            .map(|level| {
                level
                    .iter()
                    .filter_map(|id| index.get(id).map(|&i| tasks[i].estimated_duration_ms))
                    .max()
                    .unwrap_or(0)
            })
            .sum();

        let concurrency = max_concurrency.min(tasks.len()).max(1);

        Self {
            session_id,
            concurrency,
            tasks,
            index,
            graph,
            estimated_duration_ms,
            started_at: Utc::now(),
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    pub fn task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.index.get(id).map(|&i| &mut self.tasks[i])
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}
