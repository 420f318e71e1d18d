//! Append-only run traces.
//!
//! A [`TraceRecorder`] keeps one [`RunTrace`] per run id in memory and can
//! persist them as JSON files. It is purely observational: the orchestrator
//! logs and ignores every persistence error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::core::task::{ExecutorKind, TaskId};
use crate::error::Result;
use crate::lifecycle::StateTransition;
use crate::orchestration::escalation::Escalation;

/// Outcome of one executor invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Success,
    Failure,
    Timeout,
    Cancelled,
}

/// One executor invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSpan {
    pub task_id: TaskId,
    pub group_id: usize,
    pub executor: ExecutorKind,
    /// 1-based attempt number for this task.
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: SpanStatus,
    pub error: Option<String>,
}

/// Task counters derived from the spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TaskCounters {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Everything recorded for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTrace {
    pub run_id: String,
    pub work_item: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub transitions: Vec<StateTransition>,
    #[serde(default)]
    pub spans: Vec<ExecutionSpan>,
    #[serde(default)]
    pub counters: TaskCounters,
    #[serde(default)]
    pub escalations: Vec<Escalation>,
}

impl RunTrace {
    fn new(run_id: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.to_string(),
            work_item: None,
            started_at: now,
            updated_at: now,
            transitions: Vec::new(),
            spans: Vec::new(),
            counters: TaskCounters::default(),
            escalations: Vec::new(),
        }
    }

    /// Recount completed and failed tasks from the latest span per task.
    fn recount(&mut self) {
        let mut seen = HashSet::new();
        let mut completed = 0;
        let mut failed = 0;
        for span in self.spans.iter().rev() {
            if !seen.insert(&span.task_id) {
                continue;
            }
            if span.status == SpanStatus::Success {
                completed += 1;
            } else {
                failed += 1;
            }
        }
        self.counters.completed = completed;
        self.counters.failed = failed;
        self.counters.total = self.counters.total.max(seen.len());
    }
}

/// Records run traces in memory with optional JSON persistence.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    traces: RwLock<HashMap<String, RunTrace>>,
    dir: Option<PathBuf>,
}

impl TraceRecorder {
    /// An in-memory recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder that persists traces to `<dir>/<run_id>.json`.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            traces: RwLock::new(HashMap::new()),
            dir: Some(dir.into()),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Open a trace for a run.
    pub async fn start_run(&self, run_id: &str, work_item: &str, total_tasks: usize) {
        self.update(run_id, |trace| {
            trace.work_item = Some(work_item.to_string());
            trace.counters.total = total_tasks;
        })
        .await;
    }

    pub async fn record_transition(&self, run_id: &str, transition: StateTransition) {
        self.update(run_id, |trace| trace.transitions.push(transition))
            .await;
    }

    pub async fn record_span(&self, run_id: &str, span: ExecutionSpan) {
        self.update(run_id, |trace| {
            trace.spans.push(span);
            trace.recount();
        })
        .await;
    }

    pub async fn record_escalation(&self, run_id: &str, escalation: Escalation) {
        self.update(run_id, |trace| trace.escalations.push(escalation))
            .await;
    }

    async fn update(&self, run_id: &str, f: impl FnOnce(&mut RunTrace)) {
        let mut traces = self.traces.write().await;
        let trace = traces
            .entry(run_id.to_string())
            .or_insert_with(|| RunTrace::new(run_id));
        f(trace);
        trace.updated_at = Utc::now();
    }

    /// Write one trace to the trace directory. A recorder without a
    /// directory, or an unknown run, is a no-op.
    pub async fn persist(&self, run_id: &str) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let Some(trace) = self.traces.read().await.get(run_id).cloned() else {
            return Ok(());
        };

        tokio::fs::create_dir_all(dir).await?;
        let path = self.path_for(dir, run_id);
        tokio::fs::write(&path, serde_json::to_string_pretty(&trace)?).await?;
        debug!(run_id, path = %path.display(), "trace persisted");
        Ok(())
    }

    /// Trace for a run, from memory or disk.
    pub async fn get_trace(&self, run_id: &str) -> Result<Option<RunTrace>> {
        if let Some(trace) = self.traces.read().await.get(run_id) {
            return Ok(Some(trace.clone()));
        }
        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        let path = self.path_for(dir, run_id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// All known traces, oldest first. In-memory traces shadow persisted
    /// copies; unreadable files are skipped with a warning.
    pub async fn load_all_traces(&self) -> Result<Vec<RunTrace>> {
        let mut all: HashMap<String, RunTrace> = self.traces.read().await.clone();

        if let Some(dir) = &self.dir {
            if tokio::fs::try_exists(dir).await? {
                let mut entries = tokio::fs::read_dir(dir).await?;
                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    match read_trace(&path).await {
                        Ok(trace) => {
                            all.entry(trace.run_id.clone()).or_insert(trace);
                        }
                        Err(e) => warn!(path = %path.display(), error = %e, "skipping trace"),
                    }
                }
            }
        }

        let mut traces: Vec<RunTrace> = all.into_values().collect();
        traces.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.run_id.cmp(&b.run_id)));
        Ok(traces)
    }

    /// Remove a trace from memory and disk. Returns true if anything was
    /// removed.
    pub async fn delete(&self, run_id: &str) -> Result<bool> {
        let mut removed = self.traces.write().await.remove(run_id).is_some();
        if let Some(dir) = &self.dir {
            let path = self.path_for(dir, run_id);
            if tokio::fs::try_exists(&path).await? {
                tokio::fs::remove_file(&path).await?;
                removed = true;
            }
        }
        Ok(removed)
    }

    fn path_for(&self, dir: &Path, run_id: &str) -> PathBuf {
        dir.join(format!("{}.json", run_id))
    }
}

async fn read_trace(path: &Path) -> Result<RunTrace> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}
