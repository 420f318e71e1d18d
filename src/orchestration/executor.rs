//! Contract for the specialist executors that carry out tasks.
//!
//! Executors are external collaborators. The orchestrator only knows them
//! through the [`Executor`] trait and looks them up by [`ExecutorKind`] in
//! an [`ExecutorRegistry`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub use tokio_util::sync::CancellationToken;

use crate::core::task::{ExecutorKind, Task};
use crate::error::{Error, Result};

/// Whether an executor call succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failure,
}

/// Result of one executor call.
///
/// A failed call is data, not an error: the orchestrator turns it into a
/// failed task result and keeps going.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorOutcome {
    pub status: OutcomeStatus,
    /// Raw executor payload.
    #[serde(default)]
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ExecutorOutcome {
    pub fn success(payload: serde_json::Value) -> Self {
        Self {
            status: OutcomeStatus::Success,
            payload,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failure,
            payload: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// A specialist that executes tasks of one kind.
#[async_trait]
pub trait Executor: Send + Sync {
    /// The kind of task this executor handles.
    fn kind(&self) -> ExecutorKind;

    /// Execute a task.
    ///
    /// Implementations should return promptly once `cancel` fires. The
    /// orchestrator also enforces its own timeout around this call.
    async fn execute(&self, task: &Task, cancel: CancellationToken) -> ExecutorOutcome;

    /// Release resources held by the executor.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Executors keyed by kind.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<ExecutorKind, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor under its own kind, replacing any previous one.
    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        let kind = executor.kind();
        debug!(%kind, "registering executor");
        self.executors.insert(kind, executor);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, executor: Arc<dyn Executor>) -> Self {
        self.register(executor);
        self
    }

    /// Look up the executor for a kind.
    ///
    /// # Errors
    ///
    /// `ExecutorNotFound` if nothing is registered for `kind`.
    pub fn get(&self, kind: ExecutorKind) -> Result<Arc<dyn Executor>> {
        self.executors
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::ExecutorNotFound(kind.to_string()))
    }

    pub fn contains(&self, kind: ExecutorKind) -> bool {
        self.executors.contains_key(&kind)
    }

    /// Registered kinds in a stable order.
    pub fn kinds(&self) -> Vec<ExecutorKind> {
        let mut kinds: Vec<ExecutorKind> = self.executors.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Shut down every executor. Failures are logged and the first one is
    /// returned after all executors have been asked to stop.
    pub async fn close(&self) -> Result<()> {
        let mut first_err = None;
        for kind in self.kinds() {
            if let Some(executor) = self.executors.get(&kind) {
                if let Err(e) = executor.shutdown().await {
                    warn!(%kind, error = %e, "executor shutdown failed");
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
