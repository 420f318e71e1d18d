//! Escalations for structural problems that ordinary retries cannot fix.

use crate::core::task::{Severity, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What triggered an escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationCategory {
    /// The task dependencies contain a cycle.
    CycleDetected,
    /// A group failed more often than its retry budget allows.
    RetriesExhausted,
}

impl std::fmt::Display for EscalationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscalationCategory::CycleDetected => write!(f, "cycle_detected"),
            EscalationCategory::RetriesExhausted => write!(f, "retries_exhausted"),
        }
    }
}

/// Who an escalation is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTarget {
    #[default]
    TechLead,
    ProductOwner,
    Ciso,
    Cto,
    Devops,
}

impl std::fmt::Display for EscalationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscalationTarget::TechLead => write!(f, "tech_lead"),
            EscalationTarget::ProductOwner => write!(f, "product_owner"),
            EscalationTarget::Ciso => write!(f, "ciso"),
            EscalationTarget::Cto => write!(f, "cto"),
            EscalationTarget::Devops => write!(f, "devops"),
        }
    }
}

/// Severity and target for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRule {
    pub severity: Severity,
    pub target: EscalationTarget,
}

impl Default for EscalationRule {
    fn default() -> Self {
        Self {
            severity: Severity::High,
            target: EscalationTarget::TechLead,
        }
    }
}

/// Maps escalation categories to severity and target.
///
/// Both categories default to high severity routed to the tech lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EscalationPolicy {
    pub cycle_detected: EscalationRule,
    pub retries_exhausted: EscalationRule,
}

impl EscalationPolicy {
    pub fn rule_for(&self, category: EscalationCategory) -> EscalationRule {
        match category {
            EscalationCategory::CycleDetected => self.cycle_detected,
            EscalationCategory::RetriesExhausted => self.retries_exhausted,
        }
    }

    /// Build an escalation for `category` using this policy.
    pub fn escalate(
        &self,
        category: EscalationCategory,
        reason: impl Into<String>,
        task_ids: Vec<TaskId>,
    ) -> Escalation {
        let rule = self.rule_for(category);
        Escalation {
            category,
            severity: rule.severity,
            target: rule.target,
            reason: reason.into(),
            task_ids,
            timestamp: Utc::now(),
        }
    }
}

/// A raised escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub category: EscalationCategory,
    pub severity: Severity,
    pub target: EscalationTarget,
    pub reason: String,
    /// Tasks involved, e.g. the members of a cycle.
    #[serde(default)]
    pub task_ids: Vec<TaskId>,
    pub timestamp: DateTime<Utc>,
}
