//! Scheduler for leveled group execution.
//!
//! The Scheduler turns the levels of a [`DependencyGraph`] into
//! [`ScheduledGroup`]s and decides which group may run next, respecting the
//! concurrency budget and level gating. It owns no executors: the
//! orchestrator starts, completes and fails groups, and the scheduler only
//! keeps the bookkeeping consistent.

use crate::core::dag::DependencyGraph;
use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Index of a group within its scheduler.
pub type GroupId = usize;

/// Default number of retries before a group fails terminally.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Status of a single scheduled group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    #[default]
    Waiting,
    Running,
    Completed,
    Failed,
}

impl GroupStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GroupStatus::Completed | GroupStatus::Failed)
    }
}

impl std::fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupStatus::Waiting => write!(f, "waiting"),
            GroupStatus::Running => write!(f, "running"),
            GroupStatus::Completed => write!(f, "completed"),
            GroupStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Overall scheduler status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

/// How lower levels gate a waiting group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Gating {
    /// Every group at a lower level must be completed.
    #[default]
    Strict,
    /// Lower groups may still be running. A group can start before the
    /// tasks it depends on have finished, so only use this with executors
    /// that tolerate it.
    Overlapping,
}

/// How tasks are packed into groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One group per DAG level.
    #[default]
    Level,
    /// One group per task.
    Task,
}

/// Scheduler tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Maximum number of groups running at once.
    pub concurrency: usize,
    pub max_retries: u32,
    pub gating: Gating,
    pub granularity: Granularity,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_retries: DEFAULT_MAX_RETRIES,
            gating: Gating::default(),
            granularity: Granularity::default(),
        }
    }
}

/// A batch of tasks dispatched together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledGroup {
    pub id: GroupId,
    pub level: usize,
    pub task_ids: Vec<TaskId>,
    /// Minimum priority of the contained tasks.
    pub priority: u32,
    /// Longest estimate of the contained tasks, since they run in parallel.
    pub estimated_duration_ms: u64,
    pub status: GroupStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Number of failures so far.
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl ScheduledGroup {
    fn new(id: GroupId, level: usize, tasks: &[&Task]) -> Self {
        Self {
            id,
            level,
            task_ids: tasks.iter().map(|t| t.id.clone()).collect(),
            priority: tasks.iter().map(|t| t.priority).min().unwrap_or(0),
            estimated_duration_ms: tasks
                .iter()
                .map(|t| t.estimated_duration_ms)
                .max()
                .unwrap_or(0),
            status: GroupStatus::Waiting,
            started_at: None,
            ended_at: None,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Wall time of the last attempt, if it has ended.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => (end - start).to_std().ok(),
            _ => None,
        }
    }
}

/// Outcome of [`Scheduler::fail_group`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// The group is waiting again; `retry_count` failures so far.
    Retrying { retry_count: u32 },
    /// The group failed terminally.
    Exhausted,
}

/// Events emitted by the scheduler for group state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    GroupStarted {
        group_id: GroupId,
        level: usize,
    },
    GroupCompleted {
        group_id: GroupId,
    },
    GroupFailed {
        group_id: GroupId,
        error: String,
        /// True if the group went back to waiting.
        will_retry: bool,
    },
    /// Every group reached a terminal state.
    Finished {
        status: SchedulerStatus,
    },
}

/// Scheduler over the groups of one run.
#[derive(Debug)]
pub struct Scheduler {
    groups: Vec<ScheduledGroup>,
    options: SchedulerOptions,
    status: SchedulerStatus,
    started_at: Option<DateTime<Utc>>,
    event_tx: Option<mpsc::Sender<SchedulerEvent>>,
}

impl Scheduler {
    /// Build the groups from a levelled graph.
    ///
    /// Tasks the graph could not level (cycle members) are not scheduled.
    /// A scheduler with no groups is immediately `Completed`.
    ///
    /// # Arguments
    ///
    /// * `tasks` - The task list the graph was built from
    /// * `graph` - The dependency graph providing the levels
    /// * `options` - Concurrency, retry and gating settings
    pub fn new(tasks: &[Task], graph: &DependencyGraph, options: SchedulerOptions) -> Self {
        let by_id: HashMap<&TaskId, &Task> = tasks.iter().map(|t| (&t.id, t)).collect();
        let mut groups = Vec::new();

        for (level, ids) in graph.levels().iter().enumerate() {
            let mut members: Vec<&Task> = ids.iter().filter_map(|id| by_id.get(id).copied()).collect();
            if members.is_empty() {
                continue;
            }
            match options.granularity {
                Granularity::Level => {
                    groups.push(ScheduledGroup::new(groups.len(), level, &members));
                }
                Granularity::Task => {
                    members.sort_by_key(|t| t.priority);
                    for task in members {
                        groups.push(ScheduledGroup::new(groups.len(), level, &[task]));
                    }
                }
            }
        }

        let status = if groups.is_empty() {
            SchedulerStatus::Completed
        } else {
            SchedulerStatus::Idle
        };

        debug!(groups = groups.len(), ?options, "scheduler created");

        Self {
            groups,
            options: SchedulerOptions {
                concurrency: options.concurrency.max(1),
                ..options
            },
            status,
            started_at: None,
            event_tx: None,
        }
    }

    /// Emit [`SchedulerEvent`]s on `tx`. Sends never block; events are
    /// dropped when the channel is full.
    pub fn with_events(mut self, tx: mpsc::Sender<SchedulerEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    pub fn status(&self) -> SchedulerStatus {
        self.status
    }

    pub fn groups(&self) -> &[ScheduledGroup] {
        &self.groups
    }

    pub fn group(&self, id: GroupId) -> Option<&ScheduledGroup> {
        self.groups.get(id)
    }

    pub fn running_count(&self) -> usize {
        self.count(GroupStatus::Running)
    }

    /// True once every group is completed or failed.
    pub fn is_finished(&self) -> bool {
        matches!(self.status, SchedulerStatus::Completed | SchedulerStatus::Failed)
    }

    /// The next group to dispatch, if any.
    ///
    /// Returns `None` when the concurrency budget is used up or no waiting
    /// group is eligible. Among eligible groups the lowest level wins, then
    /// the lowest priority value, then the shortest estimate.
    pub fn next_group(&self) -> Option<&ScheduledGroup> {
        if self.running_count() >= self.options.concurrency {
            return None;
        }

        self.groups
            .iter()
            .filter(|g| g.status == GroupStatus::Waiting && self.is_eligible(g))
            .min_by_key(|g| (g.level, g.priority, g.estimated_duration_ms, g.id))
    }

    /// Whether every lower-level group allows `group` to start.
    pub fn is_eligible(&self, group: &ScheduledGroup) -> bool {
        self.groups
            .iter()
            .filter(|g| g.level < group.level)
            .all(|g| match self.options.gating {
                Gating::Strict => g.status == GroupStatus::Completed,
                Gating::Overlapping => {
                    matches!(g.status, GroupStatus::Completed | GroupStatus::Running)
                }
            })
    }

    /// Mark a waiting group as running.
    ///
    /// # Errors
    ///
    /// `GroupNotFound` for an unknown id, `InvalidGroupState` if the group
    /// is not waiting.
    pub fn start_group(&mut self, id: GroupId) -> Result<&ScheduledGroup> {
        self.expect_status(id, GroupStatus::Waiting)?;

        let now = Utc::now();
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if self.status == SchedulerStatus::Idle {
            self.status = SchedulerStatus::Running;
        }

        let group = &mut self.groups[id];
        group.status = GroupStatus::Running;
        group.started_at = Some(now);
        group.ended_at = None;
        let level = group.level;

        debug!(group_id = id, level, "group started");
        self.emit(SchedulerEvent::GroupStarted { group_id: id, level });
        Ok(&self.groups[id])
    }

    /// Mark a running group as completed.
    ///
    /// # Errors
    ///
    /// `InvalidGroupState` if the group is not running, which also rejects
    /// completing the same group twice.
    pub fn complete_group(&mut self, id: GroupId) -> Result<()> {
        self.expect_status(id, GroupStatus::Running)?;

        let group = &mut self.groups[id];
        group.status = GroupStatus::Completed;
        group.ended_at = Some(Utc::now());
        group.last_error = None;

        debug!(group_id = id, "group completed");
        self.emit(SchedulerEvent::GroupCompleted { group_id: id });
        self.refresh_status();
        Ok(())
    }

    /// Record a failure of a running group.
    ///
    /// The failure count is incremented. While it stays within
    /// `max_retries` the group returns to waiting; beyond that it fails
    /// terminally.
    ///
    /// # Errors
    ///
    /// `InvalidGroupState` if the group is not running.
    pub fn fail_group(&mut self, id: GroupId, error: &str) -> Result<FailOutcome> {
        self.expect_status(id, GroupStatus::Running)?;
        let max_retries = self.options.max_retries;

        let group = &mut self.groups[id];
        group.retry_count += 1;
        group.ended_at = Some(Utc::now());
        group.last_error = Some(error.to_string());

        let outcome = if group.retry_count <= max_retries {
            group.status = GroupStatus::Waiting;
            FailOutcome::Retrying {
                retry_count: group.retry_count,
            }
        } else {
            group.status = GroupStatus::Failed;
            FailOutcome::Exhausted
        };

        warn!(group_id = id, retry_count = group.retry_count, error, ?outcome, "group failed");
        self.emit(SchedulerEvent::GroupFailed {
            group_id: id,
            error: error.to_string(),
            will_retry: matches!(outcome, FailOutcome::Retrying { .. }),
        });
        self.refresh_status();
        Ok(outcome)
    }

    /// Terminally fail waiting groups that sit above a failed group.
    ///
    /// Such groups can never become eligible. Returns the abandoned ids.
    pub fn abandon_blocked(&mut self, reason: &str) -> Vec<GroupId> {
        let lowest_failed = self
            .groups
            .iter()
            .filter(|g| g.status == GroupStatus::Failed)
            .map(|g| g.level)
            .min();

        match lowest_failed {
            Some(level) => self.abandon_where(reason, |g| g.level > level),
            None => Vec::new(),
        }
    }

    /// Terminally fail every waiting group, e.g. after cancellation.
    pub fn abandon_waiting(&mut self, reason: &str) -> Vec<GroupId> {
        self.abandon_where(reason, |_| true)
    }

    fn abandon_where(
        &mut self,
        reason: &str,
        pred: impl Fn(&ScheduledGroup) -> bool,
    ) -> Vec<GroupId> {
        let ids: Vec<GroupId> = self
            .groups
            .iter()
            .filter(|g| g.status == GroupStatus::Waiting && pred(g))
            .map(|g| g.id)
            .collect();

        for &id in &ids {
            let group = &mut self.groups[id];
            group.status = GroupStatus::Failed;
            group.ended_at = Some(Utc::now());
            group.last_error = Some(reason.to_string());
        }

        if !ids.is_empty() {
            info!(count = ids.len(), reason, "abandoned waiting groups");
            self.refresh_status();
        }
        ids
    }

    /// Share of groups in a terminal state, 0.0 to 100.0.
    pub fn percent_complete(&self) -> f64 {
        if self.groups.is_empty() {
            return 100.0;
        }
        let done = self.groups.iter().filter(|g| g.status.is_terminal()).count();
        done as f64 / self.groups.len() as f64 * 100.0
    }

    /// Linear extrapolation of the remaining time from the average time per
    /// finished group. `None` until a group has finished.
    pub fn estimated_time_remaining(&self) -> Option<Duration> {
        let started = self.started_at?;
        let done = self.groups.iter().filter(|g| g.status.is_terminal()).count();
        if done == 0 {
            return None;
        }
        let remaining = self.groups.len() - done;
        let elapsed = (Utc::now() - started).to_std().ok()?;
        Some(elapsed.mul_f64(remaining as f64 / done as f64))
    }

    /// One-line human-readable progress.
    pub fn progress_summary(&self) -> String {
        format!(
            "{}/{} groups completed, {} running, {} waiting, {} failed ({:.0}%)",
            self.count(GroupStatus::Completed),
            self.groups.len(),
            self.count(GroupStatus::Running),
            self.count(GroupStatus::Waiting),
            self.count(GroupStatus::Failed),
            self.percent_complete()
        )
    }

    fn count(&self, status: GroupStatus) -> usize {
        self.groups.iter().filter(|g| g.status == status).count()
    }

    fn expect_status(&self, id: GroupId, expected: GroupStatus) -> Result<()> {
        let group = self.groups.get(id).ok_or(Error::GroupNotFound(id))?;
        if group.status != expected {
            return Err(Error::InvalidGroupState {
                id,
                expected: expected.to_string(),
                actual: group.status.to_string(),
            });
        }
        Ok(())
    }

    fn refresh_status(&mut self) {
        if !self.groups.iter().all(|g| g.status.is_terminal()) {
            return;
        }
        let status = if self.groups.iter().any(|g| g.status == GroupStatus::Failed) {
            SchedulerStatus::Failed
        } else {
            SchedulerStatus::Completed
        };
        if self.status != status {
            self.status = status;
            info!(?status, "scheduler finished");
            self.emit(SchedulerEvent::Finished { status });
        }
    }

    fn emit(&self, event: SchedulerEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.try_send(event);
        }
    }
}
