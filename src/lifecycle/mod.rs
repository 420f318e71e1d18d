//! Lifecycle of the parent work item.
//!
//! The state machine validates every transition against a fixed table;
//! accepted transitions can be forwarded to an external label system via a
//! [`LifecycleMirror`].

mod mirror;
mod state;

pub use mirror::{ChannelMirror, LifecycleMirror, MirroredTransition};
pub use state::{
    find_rule, validate_transition, LifecycleState, LifecycleStateMachine, StateTransition,
    TransitionContext, TransitionGuard, TransitionRule, TRANSITIONS,
};
