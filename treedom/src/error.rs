//! Error taxonomy and the tagged operation outcome.

use thiserror::Error;

use crate::event::EventKind;
use crate::node::NodeId;

/// Everything that can make an operation resolve to `fail`.
///
/// Nothing here is fatal: every defined failure path delivers one of these
/// through the initiating operation's callbacks instead of unwinding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    /// The target is not a valid/loaded/inner node for the requested op.
    #[error("invalid target '{node}': {reason}")]
    Validation { node: NodeId, reason: String },

    /// A before-event handler cancelled the operation.
    #[error("'{event}' handler vetoed the operation on '{node}'")]
    Vetoed { node: NodeId, event: EventKind },

    /// The loader returned a failure or malformed data.
    #[error("load failed for '{node}': {reason}")]
    Load { node: NodeId, reason: String },

    /// A cycle-forming move/insert was refused.
    #[error("structural error: {0}")]
    Structural(String),

    /// The target's busy flag never cleared within the retry budget.
    #[error("node '{0}' stayed busy past the retry budget")]
    BusyTimeout(NodeId),
}

impl TreeError {
    pub(crate) fn validation(node: &NodeId, reason: impl Into<String>) -> Self {
        Self::Validation {
            node: node.clone(),
            reason: reason.into(),
        }
    }

    pub(crate) fn vetoed(node: &NodeId, event: EventKind) -> Self {
        Self::Vetoed {
            node: node.clone(),
            event,
        }
    }

    pub(crate) fn load(node: &NodeId, reason: impl Into<String>) -> Self {
        Self::Load {
            node: node.clone(),
            reason: reason.into(),
        }
    }
}

/// Terminal outcome of one operation.
///
/// `Notify` means "no-op because already satisfied" and is not an error;
/// exactly one variant is delivered per operation that reaches a terminal
/// state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Notify,
    Fail(TreeError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn is_notify(&self) -> bool {
        matches!(self, Outcome::Notify)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Outcome::Fail(_))
    }

    /// The error, when this outcome is a failure.
    pub fn error(&self) -> Option<&TreeError> {
        match self {
            Outcome::Fail(err) => Some(err),
            _ => None,
        }
    }
}
