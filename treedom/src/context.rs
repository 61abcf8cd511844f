//! Per-call operation context: flags plus the terminal callback chain.

use log::debug;

use crate::error::Outcome;
use crate::event::EventKind;
use crate::node::NodeId;
use crate::tree::Tree;

/// Terminal callback supplied by the caller. Receives the tree and the
/// delivered outcome, after the library's own event bookkeeping has run.
pub type TerminalCallback = Box<dyn FnOnce(&mut Tree, &Outcome)>;

/// Behavior flags recognized by the lifecycle operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpFlags {
    /// Opening also opens children, recursively.
    pub expand: bool,
    /// Closing also closes open children, recursively.
    pub collapse: bool,
    /// Opening closes every branch outside the target's axis first.
    pub unique_branch: bool,
    /// Skip reveal/hide animation on the rendering collaborator.
    pub unanimated: bool,
    /// Closing discards loaded children (back to unloaded).
    pub empty: bool,
}

/// Raw per-call configuration for a public operation.
///
/// Exactly one of `success`/`fail`/`notify` is invoked once the operation
/// reaches a terminal state. `notify` falls back to `success` when the
/// caller supplied a `success` but wants no separate already-in-state
/// handling.
#[derive(Default)]
pub struct OpOptions {
    pub flags: OpFlags,
    pub success: Option<TerminalCallback>,
    pub fail: Option<TerminalCallback>,
    pub notify: Option<TerminalCallback>,
}

impl OpOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(mut self, flags: OpFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn expand(mut self) -> Self {
        self.flags.expand = true;
        self
    }

    pub fn collapse(mut self) -> Self {
        self.flags.collapse = true;
        self
    }

    pub fn unique_branch(mut self) -> Self {
        self.flags.unique_branch = true;
        self
    }

    pub fn unanimated(mut self) -> Self {
        self.flags.unanimated = true;
        self
    }

    pub fn empty(mut self) -> Self {
        self.flags.empty = true;
        self
    }

    pub fn on_success(mut self, cb: impl FnOnce(&mut Tree, &Outcome) + 'static) -> Self {
        self.success = Some(Box::new(cb));
        self
    }

    pub fn on_fail(mut self, cb: impl FnOnce(&mut Tree, &Outcome) + 'static) -> Self {
        self.fail = Some(Box::new(cb));
        self
    }

    pub fn on_notify(mut self, cb: impl FnOnce(&mut Tree, &Outcome) + 'static) -> Self {
        self.notify = Some(Box::new(cb));
        self
    }
}

/// Normalized context for one in-flight operation.
///
/// Lives in the tree's operation table until the terminal outcome is
/// delivered. Nested internal calls carry the flags forward but never the
/// terminal callbacks, so they cannot re-trigger the outer call's
/// terminals.
pub(crate) struct OpContext {
    pub target: NodeId,
    pub flags: OpFlags,
    /// Event emitted on the success terminal, before the caller callback.
    pub success_event: Option<EventKind>,
    /// Event emitted on the notify terminal.
    pub notify_event: Option<EventKind>,
    /// Whether this operation currently holds the target's busy flag.
    pub busy_held: bool,
    success: Option<TerminalCallback>,
    fail: Option<TerminalCallback>,
    notify: Option<TerminalCallback>,
}

impl OpContext {
    pub(crate) fn normalize(
        target: NodeId,
        opts: OpOptions,
        success_event: Option<EventKind>,
        notify_event: Option<EventKind>,
    ) -> Self {
        Self {
            target,
            flags: opts.flags,
            success_event,
            notify_event,
            busy_held: false,
            success: opts.success,
            fail: opts.fail,
            notify: opts.notify,
        }
    }

    /// Deliver the terminal outcome: release busy, emit the library event,
    /// then run the caller callback last.
    pub(crate) fn deliver(mut self, tree: &mut Tree, outcome: Outcome) {
        debug!("op on '{}' resolved: {:?}", self.target, outcome);
        if self.busy_held {
            tree.clear_busy(&self.target);
        }

        let (event, callback) = match &outcome {
            Outcome::Success => (self.success_event, self.success.take()),
            Outcome::Notify => (
                self.notify_event,
                self.notify.take().or_else(|| self.success.take()),
            ),
            // Failure events (load_failed) are emitted at the failure site,
            // where the error kind is known.
            Outcome::Fail(_) => (None, self.fail.take()),
        };

        if let Some(event) = event {
            tree.emit(Some(&self.target), event);
        }
        if let Some(callback) = callback {
            callback(tree, &outcome);
        }
    }
}
