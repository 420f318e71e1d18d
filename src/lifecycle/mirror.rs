//! Forwarding of lifecycle transitions to an external label system.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{Error, Result};
use crate::lifecycle::state::StateTransition;

/// A transition tagged with the work item it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct MirroredTransition {
    /// Work item reference, e.g. `#42`.
    pub work_item: String,
    pub transition: StateTransition,
}

impl MirroredTransition {
    /// Label to apply on the external system.
    pub fn label(&self) -> String {
        self.transition.to.label()
    }
}

/// Receives accepted lifecycle transitions.
///
/// Mirroring is best-effort: the orchestrator spawns each call and only
/// logs a failure. Implementations must not assume delivery order across
/// runs.
#[async_trait]
pub trait LifecycleMirror: Send + Sync {
    async fn mirror(&self, event: MirroredTransition) -> Result<()>;
}

/// Mirror that pushes transitions onto a bounded tokio channel.
///
/// Uses `try_send`, so a full or closed channel drops the event instead of
/// stalling the run.
#[derive(Debug, Clone)]
pub struct ChannelMirror {
    tx: mpsc::Sender<MirroredTransition>,
}

impl ChannelMirror {
    pub fn new(tx: mpsc::Sender<MirroredTransition>) -> Self {
        Self { tx }
    }

    /// Create a mirror together with its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<MirroredTransition>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl LifecycleMirror for ChannelMirror {
    async fn mirror(&self, event: MirroredTransition) -> Result<()> {
        self.tx.try_send(event).map_err(|e| {
            warn!(error = %e, "lifecycle mirror dropped transition");
            Error::Validation(format!("mirror channel unavailable: {}", e))
        })
    }
}
