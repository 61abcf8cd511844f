//! The engine context object: node arena, scheduler, event bus.
//!
//! One [`Tree`] is created per widget instance and passed by reference to
//! every engine call; nothing is looked up by ambient identity. Structural
//! operations live in [`mutate`], the per-node lifecycle state machine in
//! [`lifecycle`].

mod lifecycle;
mod mutate;

pub use mutate::MoveTarget;

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::time::Instant;

use log::{debug, info, trace, warn};

use crate::config::TreeOptions;
use crate::context::{OpContext, OpFlags};
use crate::error::Outcome;
use crate::event::{EventBus, EventKind, HandlerId, Notice};
use crate::node::{Node, NodeId};
use crate::render::{NullRenderer, Renderer};
use crate::task::{GroupId, GroupTable, Lane, TaskQueue, Ticket};

/// An engine-issued fetch, waiting for the host driver to resolve it.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Completion ticket of the async task occupying the fetch's slot.
    pub ticket: Ticket,
    /// Target node; None when the tree asks for its top-level records.
    pub node: Option<NodeId>,
    /// Resolved data-source override (nearest ancestor wins), if any.
    pub source: Option<String>,
}

/// What to do once a fetch resolves successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AfterLoad {
    /// The load was the whole operation.
    Finish,
    /// The load was chained from an open; continue opening.
    Open,
    /// A reload: existing children are discarded only once the fresh
    /// records are in hand, so a failure leaves the old state intact.
    Reload { was_loaded: bool },
}

pub(crate) struct PendingLoad {
    pub node: NodeId,
    pub op: u64,
    pub then: AfterLoad,
}

/// A hierarchical structure of lazily-populated nodes plus the machinery
/// that keeps its mutations consistent: a two-lane task queue, an event bus
/// with before-event vetoes, and per-operation contexts.
pub struct Tree {
    pub(crate) opts: TreeOptions,
    pub(crate) nodes: HashMap<NodeId, Node>,
    pub(crate) bus: EventBus,
    pub(crate) queue: TaskQueue,
    pub(crate) groups: GroupTable,
    pub(crate) ticket_groups: HashMap<u64, GroupId>,
    pub(crate) ops: HashMap<u64, OpContext>,
    pub(crate) next_op: u64,
    pub(crate) pending_loads: HashMap<u64, PendingLoad>,
    pub(crate) load_requests: Vec<LoadRequest>,
    pub(crate) renderer: Box<dyn Renderer>,
    /// Time of the most recent dispatch attempt; retry deadlines are
    /// relative to it, keeping the core free of wall-clock reads.
    pub(crate) now: Instant,
}

impl Tree {
    pub fn new(opts: TreeOptions) -> Self {
        Self::with_renderer(opts, Box::new(NullRenderer))
    }

    pub fn with_renderer(opts: TreeOptions, renderer: Box<dyn Renderer>) -> Self {
        let queue = TaskQueue::new(&opts);
        let mut nodes = HashMap::new();
        nodes.insert(NodeId::root(), Node::root());
        info!("tree created (async limit {})", opts.async_concurrency_limit);
        Self {
            opts,
            nodes,
            bus: EventBus::new(),
            queue,
            groups: GroupTable::default(),
            ticket_groups: HashMap::new(),
            ops: HashMap::new(),
            next_op: 0,
            pending_loads: HashMap::new(),
            load_requests: Vec::new(),
            renderer,
            now: Instant::now(),
        }
    }

    pub fn options(&self) -> &TreeOptions {
        &self.opts
    }

    pub fn root_id(&self) -> NodeId {
        NodeId::root()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of materialized nodes, excluding the virtual root.
    pub fn len(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn children(&self, id: &NodeId) -> Option<&[NodeId]> {
        self.nodes.get(id).map(|n| n.children.as_slice())
    }

    /// Ancestor chain from parent up to (and including) the root.
    pub fn ancestors(&self, id: &NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut cursor = self.nodes.get(id).and_then(|n| n.parent.clone());
        while let Some(parent) = cursor {
            cursor = self.nodes.get(&parent).and_then(|n| n.parent.clone());
            chain.push(parent);
        }
        chain
    }

    /// True when `id` is a descendant of `of`.
    pub fn is_descendant(&self, id: &NodeId, of: &NodeId) -> bool {
        let mut cursor = self.nodes.get(id).and_then(|n| n.parent.clone());
        while let Some(parent) = cursor {
            if &parent == of {
                return true;
            }
            cursor = self.nodes.get(&parent).and_then(|n| n.parent.clone());
        }
        false
    }

    /// Derived visibility: every ancestor open, nothing on the path hidden.
    pub fn is_visible(&self, id: &NodeId) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        if node.hidden {
            return false;
        }
        let mut cursor = node.parent.clone();
        while let Some(parent_id) = cursor {
            let Some(parent) = self.nodes.get(&parent_id) else {
                return false;
            };
            if parent.hidden || !parent.open {
                return false;
            }
            cursor = parent.parent.clone();
        }
        true
    }

    /// Preorder traversal of visible nodes, excluding the virtual root.
    ///
    /// This is the identity/ordering surface selection-style extensions
    /// build on.
    pub fn visible_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_visible(&NodeId::root(), &mut out);
        out
    }

    fn collect_visible(&self, id: &NodeId, out: &mut Vec<NodeId>) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        for child_id in &node.children {
            let Some(child) = self.nodes.get(child_id) else {
                continue;
            };
            if child.hidden {
                continue;
            }
            out.push(child_id.clone());
            if child.open {
                self.collect_visible(child_id, out);
            }
        }
    }

    /// The visible node after `id` in preorder, if any.
    pub fn next_visible(&self, id: &NodeId) -> Option<NodeId> {
        let order = self.visible_nodes();
        let pos = order.iter().position(|n| n == id)?;
        order.get(pos + 1).cloned()
    }

    /// The visible node before `id` in preorder, if any.
    pub fn prev_visible(&self, id: &NodeId) -> Option<NodeId> {
        let order = self.visible_nodes();
        let pos = order.iter().position(|n| n == id)?;
        pos.checked_sub(1).and_then(|p| order.get(p).cloned())
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Subscribe tree-wide. `ControlFlow::Break` from a before-event
    /// handler vetoes the operation.
    pub fn subscribe(
        &mut self,
        event: EventKind,
        handler: impl FnMut(&Notice<'_>) -> ControlFlow<()> + 'static,
    ) -> HandlerId {
        self.bus.subscribe(event, handler)
    }

    /// Subscribe to one node's events.
    pub fn subscribe_node(
        &mut self,
        node: NodeId,
        event: EventKind,
        handler: impl FnMut(&Notice<'_>) -> ControlFlow<()> + 'static,
    ) -> HandlerId {
        self.bus.subscribe_node(node, event, handler)
    }

    pub fn unsubscribe(&mut self, id: HandlerId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Emit an event; returns true when not vetoed.
    pub(crate) fn emit(&mut self, target: Option<&NodeId>, event: EventKind) -> bool {
        self.bus.emit(target, event)
    }

    // ------------------------------------------------------------------
    // Scheduling surface
    // ------------------------------------------------------------------

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn queue_busy(&self) -> bool {
        self.queue.busy()
    }

    /// Queue a task. The task must arrange for [`Tree::complete`] to run
    /// with its ticket exactly once (inline for `Lane::Sync`).
    pub fn enqueue(
        &mut self,
        lane: Lane,
        task: impl FnOnce(&mut Tree, Ticket) + 'static,
    ) -> Ticket {
        self.queue.push(lane, Box::new(task))
    }

    /// Queue a task that must not start before `at`. Same completion
    /// contract as [`Tree::enqueue`].
    pub fn enqueue_delayed(
        &mut self,
        lane: Lane,
        at: Instant,
        task: impl FnOnce(&mut Tree, Ticket) + 'static,
    ) -> Ticket {
        self.queue.push_delayed(lane, at, Box::new(task))
    }

    /// Report a task's completion, releasing its lane slot and advancing
    /// any group it belongs to.
    pub fn complete(&mut self, ticket: Ticket) {
        if self.queue.finish(ticket).is_none() {
            warn!("completion for unknown ticket {:?} ignored", ticket);
            return;
        }
        if let Some(group) = self.ticket_groups.remove(&ticket.0)
            && let Some(on_complete) = self.groups.done(group)
        {
            on_complete(self);
        }
    }

    /// One dispatch attempt; returns whether a task was started.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.now = now;
        let Some((ticket, task)) = self.queue.take_ready(now) else {
            return false;
        };
        trace!("dispatch {:?}", ticket);
        task(self, ticket);
        true
    }

    /// Tick until no further task is dispatchable at `now`. Returns how
    /// many tasks were started.
    pub fn pump(&mut self, now: Instant) -> usize {
        let mut started = 0;
        while self.tick(now) {
            started += 1;
        }
        started
    }

    /// Open a fan-out group; `on_complete` fires exactly once, when every
    /// pushed task has completed and the group was sealed.
    pub fn group_open(&mut self, on_complete: impl FnOnce(&mut Tree) + 'static) -> GroupId {
        self.groups.open(Box::new(on_complete))
    }

    /// Queue a task accounted to a group. Legal from inside other tasks of
    /// the same group.
    pub fn group_push(
        &mut self,
        group: GroupId,
        lane: Lane,
        task: impl FnOnce(&mut Tree, Ticket) + 'static,
    ) -> Ticket {
        self.groups.add(group);
        let ticket = self.queue.push(lane, Box::new(task));
        self.ticket_groups.insert(ticket.0, group);
        ticket
    }

    /// Release the group's constructor token. Call once all initial tasks
    /// are pushed; completes the group immediately when nothing is
    /// outstanding.
    pub fn group_seal(&mut self, group: GroupId) {
        if let Some(on_complete) = self.groups.done(group) {
            on_complete(self);
        }
    }

    /// Drop all pending work: queued tasks, groups, unresolved operations
    /// and outstanding fetches. Safe to call mid-flight.
    pub fn destroy(&mut self) {
        self.queue.destroy();
        self.groups.clear();
        self.ticket_groups.clear();
        self.pending_loads.clear();
        self.load_requests.clear();
        if !self.ops.is_empty() {
            warn!("destroyed with {} unresolved operations", self.ops.len());
            self.ops.clear();
        }
    }

    // ------------------------------------------------------------------
    // Load outbox
    // ------------------------------------------------------------------

    /// Drain fetches the engine wants issued. The host resolves each via
    /// [`Tree::resolve_load`] with the same ticket.
    pub fn take_load_requests(&mut self) -> Vec<LoadRequest> {
        std::mem::take(&mut self.load_requests)
    }

    // ------------------------------------------------------------------
    // Operation plumbing
    // ------------------------------------------------------------------

    pub(crate) fn begin_op(&mut self, ctx: OpContext) -> u64 {
        self.next_op += 1;
        self.ops.insert(self.next_op, ctx);
        self.next_op
    }

    /// Deliver the terminal outcome for an operation, exactly once.
    pub(crate) fn finish_op(&mut self, op: u64, outcome: Outcome) {
        match self.ops.remove(&op) {
            Some(ctx) => ctx.deliver(self, outcome),
            None => debug!("terminal for finished op {op} ignored"),
        }
    }

    pub(crate) fn op_flags(&self, op: u64) -> OpFlags {
        self.ops.get(&op).map(|ctx| ctx.flags).unwrap_or_default()
    }

    pub(crate) fn acquire_busy(&mut self, op: u64, id: &NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.busy = true;
        }
        if let Some(ctx) = self.ops.get_mut(&op) {
            ctx.busy_held = true;
        }
    }

    pub(crate) fn clear_busy(&mut self, id: &NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.busy = false;
        }
    }
}
