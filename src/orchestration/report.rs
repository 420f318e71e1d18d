//! Task results, the execution report and report sinks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

use crate::core::task::{ExecutorKind, TaskId};
use crate::core::work_item::WorkItem;
use crate::error::Result;
use crate::lifecycle::LifecycleState;
use crate::orchestration::escalation::Escalation;
use crate::orchestration::plan::SessionId;
use crate::orchestration::scheduler::ScheduledGroup;

/// Final status of a task within a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResultStatus {
    Completed,
    Failed,
    Escalated,
}

/// Outcome of the latest attempt at a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub status: TaskResultStatus,
    pub executor: ExecutorKind,
    pub duration_ms: u64,
    /// Number of attempts made, including the one reported here.
    pub attempts: u32,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskResult {
    pub fn completed(task_id: TaskId, executor: ExecutorKind, payload: serde_json::Value) -> Self {
        Self {
            task_id,
            status: TaskResultStatus::Completed,
            executor,
            duration_ms: 0,
            attempts: 1,
            payload,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn failed(task_id: TaskId, executor: ExecutorKind, error: impl Into<String>) -> Self {
        Self {
            status: TaskResultStatus::Failed,
            payload: serde_json::Value::Null,
            error: Some(error.into()),
            ..Self::completed(task_id, executor, serde_json::Value::Null)
        }
    }

    /// Result for a task that was never run because of an escalation.
    pub fn escalated(task_id: TaskId, executor: ExecutorKind, reason: impl Into<String>) -> Self {
        Self {
            status: TaskResultStatus::Escalated,
            attempts: 0,
            ..Self::failed(task_id, executor, reason)
        }
    }

    /// Set the timing of the attempt.
    pub fn with_timing(mut self, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        self.duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        self.started_at = Some(started_at);
        self.finished_at = Some(finished_at);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskResultStatus::Completed
    }
}

/// Aggregate counts over a report's results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ReportSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub escalated: usize,
    /// `completed / total * 100`, 0 for an empty run.
    pub success_rate: f64,
}

impl ReportSummary {
    pub fn from_results(results: &[TaskResult]) -> Self {
        let count = |status| results.iter().filter(|r| r.status == status).count();
        let total = results.len();
        let completed = count(TaskResultStatus::Completed);
        let success_rate = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        Self {
            total,
            completed,
            failed: count(TaskResultStatus::Failed),
            escalated: count(TaskResultStatus::Escalated),
            success_rate,
        }
    }
}

/// Report of a whole orchestrator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub session_id: SessionId,
    pub work_item: String,
    pub title: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: ReportSummary,
    /// One entry per task, in order of first result.
    pub results: Vec<TaskResult>,
    #[serde(default)]
    pub escalations: Vec<Escalation>,
    /// Final scheduler bookkeeping; empty if the run never scheduled.
    #[serde(default)]
    pub groups: Vec<ScheduledGroup>,
    pub final_state: Option<LifecycleState>,
}

impl ExecutionReport {
    pub fn new(session_id: SessionId, work_item: &WorkItem) -> Self {
        Self {
            session_id,
            work_item: work_item.reference(),
            title: work_item.title.clone(),
            started_at: Utc::now(),
            finished_at: None,
            summary: ReportSummary::default(),
            results: Vec::new(),
            escalations: Vec::new(),
            groups: Vec::new(),
            final_state: None,
        }
    }

    /// Record a result, replacing an earlier attempt for the same task in
    /// place. The attempt counter accumulates across replacements.
    pub fn record(&mut self, result: TaskResult) {
        match self.results.iter_mut().find(|r| r.task_id == result.task_id) {
            Some(existing) => {
                let attempts = existing.attempts + result.attempts;
                *existing = result;
                existing.attempts = attempts;
            }
            None => self.results.push(result),
        }
        self.summary = ReportSummary::from_results(&self.results);
    }

    pub fn result(&self, task_id: &TaskId) -> Option<&TaskResult> {
        self.results.iter().find(|r| &r.task_id == task_id)
    }

    /// Turn an existing result into an escalated one.
    pub fn mark_escalated(&mut self, task_id: &TaskId, reason: &str) {
        if let Some(result) = self.results.iter_mut().find(|r| &r.task_id == task_id) {
            result.status = TaskResultStatus::Escalated;
            result.error = Some(reason.to_string());
        }
        self.summary = ReportSummary::from_results(&self.results);
    }

    pub fn add_escalation(&mut self, escalation: Escalation) {
        self.escalations.push(escalation);
    }

    /// True if an escalation was raised during the run.
    pub fn requires_escalation(&self) -> bool {
        !self.escalations.is_empty()
    }

    /// Close the report with the final lifecycle state.
    pub fn finalize(&mut self, final_state: Option<LifecycleState>) {
        self.summary = ReportSummary::from_results(&self.results);
        self.finished_at = Some(Utc::now());
        self.final_state = final_state;
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0) as u64)
    }
}

/// Destination for finished reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn persist(&self, report: &ExecutionReport) -> Result<()>;
}

/// Writes each report to `<dir>/<session_id>.json`.
#[derive(Debug, Clone)]
pub struct JsonReportSink {
    dir: PathBuf,
}

impl JsonReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, session_id: &SessionId) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }

    /// Read back a stored report.
    pub async fn load(&self, session_id: &SessionId) -> Result<ExecutionReport> {
        let content = tokio::fs::read_to_string(self.path_for(session_id)).await?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl ReportSink for JsonReportSink {
    async fn persist(&self, report: &ExecutionReport) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&report.session_id);
        let json = serde_json::to_string_pretty(report)?;
        tokio::fs::write(&path, json).await?;
        debug!(path = %path.display(), "report written");
        Ok(())
    }
}

/// Entries of a report directory, newest first. A missing directory yields
/// an empty list.
pub async fn list_recent_reports(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<(Option<SystemTime>, PathBuf)> = Vec::new();
    if !tokio::fs::try_exists(dir).await? {
        return Ok(Vec::new());
    }

    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let modified = entry.metadata().await.and_then(|m| m.modified()).ok();
        entries.push((modified, path));
    }

    entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    Ok(entries.into_iter().map(|(_, path)| path).collect())
}
