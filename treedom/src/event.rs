//! Event bus: named events with before-event veto collection.

use std::fmt;
use std::ops::ControlFlow;

use log::{debug, trace};

use crate::node::NodeId;

/// Named engine events, in paired before/after forms.
///
/// `Was*` variants are the notify-shaped terminals for "already in the
/// requested state".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BeforeOpen,
    Opened,
    WasOpened,
    BeforeClose,
    Closed,
    WasClosed,
    BeforeLoad,
    Loaded,
    LoadFailed,
    BeforeRemove,
    Removed,
    BeforeMove,
    Moved,
    BeforeHide,
    HiddenChanged,
    BeforeDisable,
    DisabledChanged,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::BeforeOpen => "before_open",
            EventKind::Opened => "opened",
            EventKind::WasOpened => "was_opened",
            EventKind::BeforeClose => "before_close",
            EventKind::Closed => "closed",
            EventKind::WasClosed => "was_closed",
            EventKind::BeforeLoad => "before_load",
            EventKind::Loaded => "loaded",
            EventKind::LoadFailed => "load_failed",
            EventKind::BeforeRemove => "before_remove",
            EventKind::Removed => "removed",
            EventKind::BeforeMove => "before_move",
            EventKind::Moved => "moved",
            EventKind::BeforeHide => "before_hide",
            EventKind::HiddenChanged => "hidden_changed",
            EventKind::BeforeDisable => "before_disable",
            EventKind::DisabledChanged => "disabled_changed",
        }
    }

    /// Before-events collect cancellation votes; everything else is
    /// notification only.
    pub fn is_before(self) -> bool {
        matches!(
            self,
            EventKind::BeforeOpen
                | EventKind::BeforeClose
                | EventKind::BeforeLoad
                | EventKind::BeforeRemove
                | EventKind::BeforeMove
                | EventKind::BeforeHide
                | EventKind::BeforeDisable
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a handler sees for one emission.
#[derive(Debug)]
pub struct Notice<'a> {
    pub event: EventKind,
    /// Target node, or None for tree-wide emissions.
    pub target: Option<&'a NodeId>,
}

/// Returning `ControlFlow::Break` from a before-event handler vetoes the
/// operation. Break from any other event is ignored.
pub type EventHandler = Box<dyn FnMut(&Notice<'_>) -> ControlFlow<()>>;

/// Subscription handle for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Subscription {
    id: HandlerId,
    event: EventKind,
    /// None subscribes tree-wide.
    target: Option<NodeId>,
    handler: EventHandler,
}

/// Dispatches named events for a node (or the whole tree) and collects
/// cancellation votes from before-event subscribers.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to an event tree-wide.
    pub fn subscribe(
        &mut self,
        event: EventKind,
        handler: impl FnMut(&Notice<'_>) -> ControlFlow<()> + 'static,
    ) -> HandlerId {
        self.insert(event, None, Box::new(handler))
    }

    /// Subscribe to an event on one node.
    pub fn subscribe_node(
        &mut self,
        node: NodeId,
        event: EventKind,
        handler: impl FnMut(&Notice<'_>) -> ControlFlow<()> + 'static,
    ) -> HandlerId {
        self.insert(event, Some(node), Box::new(handler))
    }

    fn insert(
        &mut self,
        event: EventKind,
        target: Option<NodeId>,
        handler: EventHandler,
    ) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.subscriptions.push(Subscription {
            id,
            event,
            target,
            handler,
        });
        id
    }

    /// Remove a subscription. Returns false when the id is unknown.
    pub fn unsubscribe(&mut self, id: HandlerId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| sub.id != id);
        self.subscriptions.len() != before
    }

    /// Emit an event for a node (or tree-wide with `None`).
    ///
    /// Returns true when the event was not vetoed. Only before-events can
    /// be vetoed; all matching handlers still run after a veto.
    pub fn emit(&mut self, target: Option<&NodeId>, event: EventKind) -> bool {
        trace!("emit {} target={:?}", event, target.map(NodeId::as_str));
        let notice = Notice { event, target };
        let mut vetoed = false;

        for sub in &mut self.subscriptions {
            if sub.event != event {
                continue;
            }
            if let Some(filter) = &sub.target
                && target != Some(filter)
            {
                continue;
            }
            if (sub.handler)(&notice).is_break() && event.is_before() {
                vetoed = true;
            }
        }

        if vetoed {
            debug!("{} vetoed on {:?}", event, target.map(NodeId::as_str));
        }
        !vetoed
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
