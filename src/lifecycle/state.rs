//! Work-item lifecycle state with transition validation.
//!
//! `LifecycleStateMachine` tracks the coarse state of the parent work item,
//! independent of individual task states, and only allows transitions
//! listed in [`TRANSITIONS`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::task::ExecutorKind;
use crate::error::{Error, Result};

/// Coarse state of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Pending,
    Analyzing,
    Implementing,
    Reviewing,
    Done,
    Blocked,
    Failed,
    Paused,
}

impl LifecycleState {
    pub const ALL: [LifecycleState; 8] = [
        LifecycleState::Pending,
        LifecycleState::Analyzing,
        LifecycleState::Implementing,
        LifecycleState::Reviewing,
        LifecycleState::Done,
        LifecycleState::Blocked,
        LifecycleState::Failed,
        LifecycleState::Paused,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Pending => "pending",
            LifecycleState::Analyzing => "analyzing",
            LifecycleState::Implementing => "implementing",
            LifecycleState::Reviewing => "reviewing",
            LifecycleState::Done => "done",
            LifecycleState::Blocked => "blocked",
            LifecycleState::Failed => "failed",
            LifecycleState::Paused => "paused",
        }
    }

    /// Label form used by external trackers, e.g. `state:implementing`.
    pub fn label(&self) -> String {
        format!("state:{}", self.as_str())
    }

    /// Parse a `state:<name>` label.
    pub fn from_label(label: &str) -> Option<Self> {
        let name = label.strip_prefix("state:")?;
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Extra check attached to a transition rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionGuard {
    /// An executor must be assigned and it must not be the coordinator.
    ExecutorAssigned,
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub trigger: &'static str,
    pub guard: Option<TransitionGuard>,
}

const fn rule(
    from: LifecycleState,
    to: LifecycleState,
    trigger: &'static str,
    guard: Option<TransitionGuard>,
) -> TransitionRule {
    TransitionRule {
        from,
        to,
        trigger,
        guard,
    }
}

use LifecycleState::{Analyzing, Blocked, Done, Failed, Implementing, Paused, Pending, Reviewing};

/// Every permitted transition.
pub const TRANSITIONS: &[TransitionRule] = &[
    rule(Pending, Analyzing, "coordinator assigned", None),
    rule(
        Analyzing,
        Implementing,
        "analysis complete, executors assigned",
        Some(TransitionGuard::ExecutorAssigned),
    ),
    rule(Implementing, Reviewing, "deliverable produced", None),
    rule(Reviewing, Done, "acceptance criteria met", None),
    rule(Pending, Blocked, "missing dependency", None),
    rule(Analyzing, Blocked, "unresolved blocker", None),
    rule(Implementing, Blocked, "unresolved blocker", None),
    rule(Reviewing, Blocked, "unresolved blocker", None),
    rule(Blocked, Analyzing, "blocker resolved", None),
    rule(Failed, Analyzing, "issue fixed, retry requested", None),
    rule(Paused, Implementing, "dependencies resolved", None),
    rule(Implementing, Failed, "unrecoverable task failure", None),
    rule(Reviewing, Failed, "review rejected", None),
    rule(Implementing, Paused, "run suspended", None),
];

/// Inputs the transition guards look at.
#[derive(Debug, Clone, Default)]
pub struct TransitionContext {
    pub assigned_executor: Option<ExecutorKind>,
}

impl TransitionContext {
    pub fn with_executor(kind: ExecutorKind) -> Self {
        Self {
            assigned_executor: Some(kind),
        }
    }
}

/// Look up the rule for `from -> to`.
pub fn find_rule(from: LifecycleState, to: LifecycleState) -> Option<&'static TransitionRule> {
    TRANSITIONS.iter().find(|r| r.from == from && r.to == to)
}

/// Validate a transition without applying it.
///
/// Returns the matching rule, or `None` for the bootstrap case (no current
/// state), which accepts any target.
pub fn validate_transition(
    current: Option<LifecycleState>,
    target: LifecycleState,
    ctx: &TransitionContext,
) -> Result<Option<&'static TransitionRule>> {
    let Some(from) = current else {
        return Ok(None);
    };

    let rule = find_rule(from, target).ok_or_else(|| Error::InvalidLifecycleTransition {
        from: from.to_string(),
        to: target.to_string(),
    })?;

    if let Some(guard) = rule.guard {
        check_guard(guard, ctx).map_err(|reason| Error::TransitionRejected {
            from: from.to_string(),
            to: target.to_string(),
            reason,
        })?;
    }

    Ok(Some(rule))
}

fn check_guard(guard: TransitionGuard, ctx: &TransitionContext) -> std::result::Result<(), String> {
    match guard {
        TransitionGuard::ExecutorAssigned => match ctx.assigned_executor {
            None => Err("no executor assigned".to_string()),
            Some(ExecutorKind::Coordinator) => {
                Err("coordinator cannot be the assigned executor".to_string())
            }
            Some(_) => Ok(()),
        },
    }
}

/// A recorded lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    /// `None` for the bootstrap transition.
    pub from: Option<LifecycleState>,
    pub to: LifecycleState,
    /// Actor that requested the transition.
    pub triggered_by: String,
    /// Trigger text from the transition table, if a rule matched.
    pub trigger: Option<String>,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Tracks and validates the lifecycle of one work item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifecycleStateMachine {
    current: Option<LifecycleState>,
    history: Vec<StateTransition>,
}

impl LifecycleStateMachine {
    /// A machine with no state yet; the first transition is unconditional.
    pub fn new() -> Self {
        Self::default()
    }

    /// A machine already in `state`, e.g. restored from a tracker label.
    pub fn starting_at(state: LifecycleState) -> Self {
        Self {
            current: Some(state),
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> Option<LifecycleState> {
        self.current
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Check whether `target` is reachable from the current state.
    pub fn can_transition(&self, target: LifecycleState, ctx: &TransitionContext) -> bool {
        validate_transition(self.current, target, ctx).is_ok()
    }

    /// Apply a transition, returning the record.
    ///
    /// # Errors
    /// `InvalidLifecycleTransition` if the pair is not in the table,
    /// `TransitionRejected` if the rule's guard fails. The state is left
    /// unchanged on error.
    pub fn transition(
        &mut self,
        target: LifecycleState,
        actor: &str,
        reason: Option<String>,
        ctx: &TransitionContext,
    ) -> Result<StateTransition> {
        let rule = validate_transition(self.current, target, ctx)?;

        let record = StateTransition {
            from: self.current,
            to: target,
            triggered_by: actor.to_string(),
            trigger: rule.map(|r| r.trigger.to_string()),
            reason,
            timestamp: Utc::now(),
        };

        self.current = Some(target);
        self.history.push(record.clone());
        Ok(record)
    }
}
