//! Per-node lifecycle: the load/open axes, busy serialization, and the
//! hidden/disabled toggles.
//!
//! Every public operation here builds an operation context, asks the event
//! bus for a before-veto, checks transition legality, and resolves to
//! exactly one success/fail/notify terminal. Busy conflicts are re-queued
//! through a bounded retry-with-delay loop instead of blocking.

use std::collections::HashSet;

use log::{debug, warn};

use crate::context::{OpContext, OpFlags, OpOptions};
use crate::error::{Outcome, TreeError};
use crate::event::EventKind;
use crate::loader::{LoadError, NodeRecord};
use crate::node::{LoadState, NodeId};
use crate::task::{Lane, Ticket};
use crate::tree::mutate::InsertPos;
use crate::tree::{AfterLoad, LoadRequest, PendingLoad, Tree};

impl Tree {
    // ------------------------------------------------------------------
    // Public entry points
    // ------------------------------------------------------------------

    /// Open a node, loading it first when necessary.
    pub fn open(&mut self, id: &NodeId) {
        self.open_with(id, OpOptions::new());
    }

    pub fn open_with(&mut self, id: &NodeId, opts: OpOptions) {
        let ctx = OpContext::normalize(
            id.clone(),
            opts,
            Some(EventKind::Opened),
            Some(EventKind::WasOpened),
        );
        let op = self.begin_op(ctx);
        self.open_attempt(op, id.clone(), 0);
    }

    /// Close an open node.
    pub fn close(&mut self, id: &NodeId) {
        self.close_with(id, OpOptions::new());
    }

    pub fn close_with(&mut self, id: &NodeId, opts: OpOptions) {
        let ctx = OpContext::normalize(
            id.clone(),
            opts,
            Some(EventKind::Closed),
            Some(EventKind::WasClosed),
        );
        let op = self.begin_op(ctx);
        self.close_attempt(op, id.clone(), 0);
    }

    /// Open a closed node, close an open one.
    pub fn toggle(&mut self, id: &NodeId) {
        self.toggle_with(id, OpOptions::new());
    }

    pub fn toggle_with(&mut self, id: &NodeId, opts: OpOptions) {
        let is_open = self
            .nodes
            .get(id)
            .map(|n| n.open && n.is_loaded())
            .unwrap_or(false);
        if is_open {
            self.close_with(id, opts);
        } else {
            self.open_with(id, opts);
        }
    }

    /// Fetch a node's children without opening it.
    pub fn load(&mut self, id: &NodeId) {
        self.load_with(id, OpOptions::new());
    }

    pub fn load_with(&mut self, id: &NodeId, opts: OpOptions) {
        let ctx = OpContext::normalize(id.clone(), opts, Some(EventKind::Loaded), None);
        let op = self.begin_op(ctx);
        self.load_attempt(op, id.clone(), 0);
    }

    /// Discard a loaded node's children and fetch them again.
    pub fn reload(&mut self, id: &NodeId) {
        self.reload_with(id, OpOptions::new());
    }

    pub fn reload_with(&mut self, id: &NodeId, opts: OpOptions) {
        let ctx = OpContext::normalize(id.clone(), opts, Some(EventKind::Loaded), None);
        let op = self.begin_op(ctx);
        self.reload_attempt(op, id.clone(), 0);
    }

    /// Tear down a node's loaded descendants and return it to `Unloaded`.
    ///
    /// Descendants see close/removed events children-before-parents. A noop
    /// on nodes that are not loaded.
    pub fn unload(&mut self, id: &NodeId) -> Result<(), TreeError> {
        let Some(node) = self.nodes.get(id) else {
            return Err(TreeError::validation(id, "unknown node"));
        };
        if node.busy {
            return Err(TreeError::validation(id, "node is busy"));
        }
        if !node.is_loaded() {
            return Ok(());
        }
        let was_open = node.open;
        self.teardown_children(id);
        if let Some(node) = self.nodes.get_mut(id) {
            node.load_state = LoadState::Unloaded;
            if was_open && !id.is_root() {
                node.open = false;
            }
        }
        if was_open && !id.is_root() {
            self.emit(Some(id), EventKind::Closed);
        }
        Ok(())
    }

    /// Toggle the hidden overlay. Synchronous; never touches the queue.
    pub fn set_hidden(&mut self, id: &NodeId, hidden: bool) -> Outcome {
        let Some(node) = self.nodes.get(id) else {
            return Outcome::Fail(TreeError::validation(id, "unknown node"));
        };
        if node.hidden == hidden {
            return Outcome::Notify;
        }
        if !self.emit(Some(id), EventKind::BeforeHide) {
            return Outcome::Fail(TreeError::vetoed(id, EventKind::BeforeHide));
        }
        let parent = if let Some(node) = self.nodes.get_mut(id) {
            node.hidden = hidden;
            node.parent.clone()
        } else {
            None
        };
        // Parity over the visible sibling run changed for the whole run.
        if let Some(parent) = parent {
            self.refresh_children(&parent);
        }
        self.renderer.animate(id, !hidden, true);
        self.emit(Some(id), EventKind::HiddenChanged);
        Outcome::Success
    }

    /// Toggle the advisory disabled flag. Synchronous.
    pub fn set_disabled(&mut self, id: &NodeId, disabled: bool) -> Outcome {
        let Some(node) = self.nodes.get(id) else {
            return Outcome::Fail(TreeError::validation(id, "unknown node"));
        };
        if node.disabled == disabled {
            return Outcome::Notify;
        }
        if !self.emit(Some(id), EventKind::BeforeDisable) {
            return Outcome::Fail(TreeError::vetoed(id, EventKind::BeforeDisable));
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.disabled = disabled;
        }
        self.emit(Some(id), EventKind::DisabledChanged);
        Outcome::Success
    }

    /// Resolve an engine-issued fetch (see [`Tree::take_load_requests`]).
    pub fn resolve_load(&mut self, ticket: Ticket, result: Result<Vec<NodeRecord>, LoadError>) {
        let Some(pending) = self.pending_loads.remove(&ticket.0) else {
            warn!("load reply for unknown ticket {:?} ignored", ticket);
            return;
        };
        // The fetch is done either way; free the async slot first.
        self.complete(ticket);
        let PendingLoad { node: id, op, then } = pending;
        if !self.nodes.contains_key(&id) {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&id, "node vanished during load")),
            );
            return;
        }

        let records = match result {
            Err(err) => {
                self.fail_load(op, &id, err.0, then);
                return;
            }
            Ok(records) => records,
        };
        if let Err(reason) = self.validate_records(&records) {
            self.fail_load(op, &id, reason, then);
            return;
        }

        debug!("load for '{}' resolved with {} records", id, records.len());
        if let AfterLoad::Reload { was_loaded: true } = then {
            // The old children survived the fetch; discard them only now
            // that the replacement records are in hand.
            self.teardown_children(&id);
        }
        let done_id = id.clone();
        self.create_branch(id, records, InsertPos::End, move |tree| match then {
            AfterLoad::Finish => tree.finish_op(op, Outcome::Success),
            AfterLoad::Reload { .. } => {
                // A reload that comes back empty leaves a confirmed leaf;
                // an open leaf makes no sense, close it.
                let emptied = tree
                    .nodes
                    .get(&done_id)
                    .is_some_and(|n| n.open && n.children.is_empty());
                if emptied && !done_id.is_root() {
                    if let Some(node) = tree.nodes.get_mut(&done_id) {
                        node.open = false;
                    }
                    tree.renderer.set_open_view(&done_id, false);
                    tree.emit(Some(&done_id), EventKind::Closed);
                }
                tree.finish_op(op, Outcome::Success);
            }
            AfterLoad::Open => {
                tree.emit(Some(&done_id), EventKind::Loaded);
                tree.open_ready(op, done_id);
            }
        });
    }

    // ------------------------------------------------------------------
    // Attempt bodies (re-entered by the busy retry loop)
    // ------------------------------------------------------------------

    pub(crate) fn open_attempt(&mut self, op: u64, id: NodeId, attempts: u32) {
        let Some(node) = self.nodes.get(&id) else {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&id, "unknown node")),
            );
            return;
        };
        if node.busy {
            self.schedule_retry(op, id, attempts, move |tree, id, next| {
                tree.open_attempt(op, id, next);
            });
            return;
        }
        if node.open && node.is_loaded() {
            // Already in the requested state; still propagate when asked.
            let flags = self.op_flags(op);
            if flags.expand {
                self.open_children(&id, flags);
            }
            self.finish_op(op, Outcome::Notify);
            return;
        }
        if node.is_leaf() {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&id, "confirmed leaf cannot open")),
            );
            return;
        }
        let load_state = node.load_state;
        if !self.emit(Some(&id), EventKind::BeforeOpen) {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::vetoed(&id, EventKind::BeforeOpen)),
            );
            return;
        }
        self.acquire_busy(op, &id);
        match load_state {
            LoadState::Loaded => self.open_ready(op, id),
            LoadState::Unloaded => self.begin_load(op, id, AfterLoad::Open),
            // Only reachable when a task violated its completion contract
            // and left the node Loading without holding busy.
            LoadState::Loading => self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&id, "load already in progress")),
            ),
        }
    }

    pub(crate) fn close_attempt(&mut self, op: u64, id: NodeId, attempts: u32) {
        let Some(node) = self.nodes.get(&id) else {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&id, "unknown node")),
            );
            return;
        };
        if id.is_root() {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&id, "the virtual root stays open")),
            );
            return;
        }
        if node.busy {
            self.schedule_retry(op, id, attempts, move |tree, id, next| {
                tree.close_attempt(op, id, next);
            });
            return;
        }
        if !(node.open && node.is_loaded()) {
            let flags = self.op_flags(op);
            self.close_propagate(&id, flags);
            self.finish_op(op, Outcome::Notify);
            return;
        }
        if !self.emit(Some(&id), EventKind::BeforeClose) {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::vetoed(&id, EventKind::BeforeClose)),
            );
            return;
        }
        self.acquire_busy(op, &id);
        let flags = self.op_flags(op);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.open = false;
        }
        self.renderer.set_open_view(&id, false);
        self.renderer.animate(&id, false, flags.unanimated);
        self.close_propagate(&id, flags);
        self.finish_op(op, Outcome::Success);
    }

    pub(crate) fn load_attempt(&mut self, op: u64, id: NodeId, attempts: u32) {
        let Some(node) = self.nodes.get(&id) else {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&id, "unknown node")),
            );
            return;
        };
        if node.busy {
            self.schedule_retry(op, id, attempts, move |tree, id, next| {
                tree.load_attempt(op, id, next);
            });
            return;
        }
        if node.is_loaded() {
            self.finish_op(op, Outcome::Notify);
            return;
        }
        if node.is_leaf() {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&id, "confirmed leaf cannot load")),
            );
            return;
        }
        if node.is_loading() {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&id, "load already in progress")),
            );
            return;
        }
        self.acquire_busy(op, &id);
        self.begin_load(op, id, AfterLoad::Finish);
    }

    fn reload_attempt(&mut self, op: u64, id: NodeId, attempts: u32) {
        let Some(node) = self.nodes.get(&id) else {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&id, "unknown node")),
            );
            return;
        };
        if node.busy {
            self.schedule_retry(op, id, attempts, move |tree, id, next| {
                tree.reload_attempt(op, id, next);
            });
            return;
        }
        if node.is_leaf() {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&id, "confirmed leaf cannot load")),
            );
            return;
        }
        if node.is_loading() {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&id, "load already in progress")),
            );
            return;
        }
        // Existing children stay in place until the fresh records arrive,
        // so a veto or loader failure leaves the node as it was.
        let was_loaded = node.is_loaded();
        self.acquire_busy(op, &id);
        self.begin_load(op, id, AfterLoad::Reload { was_loaded });
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Re-queue an attempt after a busy conflict, giving up with
    /// `BusyTimeout` once the retry budget is spent. The target id is
    /// handed back to `again` on the next attempt.
    pub(crate) fn schedule_retry(
        &mut self,
        op: u64,
        id: NodeId,
        attempts: u32,
        again: impl FnOnce(&mut Tree, NodeId, u32) + 'static,
    ) {
        if attempts >= self.opts.busy_retry_limit {
            warn!("'{}' still busy after {} attempts", id, attempts);
            self.finish_op(op, Outcome::Fail(TreeError::BusyTimeout(id)));
            return;
        }
        debug!("'{}' busy, retry {} queued", id, attempts + 1);
        let at = self.now + self.opts.busy_retry_delay;
        self.queue.push_delayed(
            Lane::Sync,
            at,
            Box::new(move |tree, ticket| {
                again(tree, id, attempts + 1);
                tree.complete(ticket);
            }),
        );
    }

    /// Transition to `Loading` and occupy an async slot that issues the
    /// fetch request once dispatched.
    fn begin_load(&mut self, op: u64, id: NodeId, then: AfterLoad) {
        if !self.emit(Some(&id), EventKind::BeforeLoad) {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::vetoed(&id, EventKind::BeforeLoad)),
            );
            return;
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.load_state = LoadState::Loading;
        }
        let source = self.resolve_source(&id);
        let fetch_target = if id.is_root() { None } else { Some(id.clone()) };
        debug!("load queued for '{}' (source {:?})", id, source);
        self.enqueue(Lane::Async, move |tree, ticket| {
            tree.pending_loads.insert(ticket.0, PendingLoad { node: id, op, then });
            tree.load_requests.push(LoadRequest {
                ticket,
                node: fetch_target,
                source,
            });
            // Completion happens in resolve_load.
        });
    }

    fn fail_load(&mut self, op: u64, id: &NodeId, reason: String, then: AfterLoad) {
        warn!("load failed for '{}': {}", id, reason);
        // A failed reload keeps its untouched children and stays Loaded.
        let restored = match then {
            AfterLoad::Reload { was_loaded: true } => LoadState::Loaded,
            _ => LoadState::Unloaded,
        };
        if let Some(node) = self.nodes.get_mut(id) {
            node.load_state = restored;
        }
        self.emit(Some(id), EventKind::LoadFailed);
        self.finish_op(op, Outcome::Fail(TreeError::load(id, reason)));
    }

    /// Nearest data-source override on the node or its ancestors.
    fn resolve_source(&self, id: &NodeId) -> Option<String> {
        let mut cursor = Some(id.clone());
        while let Some(current) = cursor {
            let node = self.nodes.get(&current)?;
            if node.source.is_some() {
                return node.source.clone();
            }
            cursor = node.parent.clone();
        }
        None
    }

    /// The node is loaded and ready to open; honor unique-branch first.
    pub(crate) fn open_ready(&mut self, op: u64, id: NodeId) {
        let Some(node) = self.nodes.get(&id) else {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&id, "unknown node")),
            );
            return;
        };
        // A chained load may have come back empty and confirmed the node a
        // leaf; refuse the open the same way a direct open on a leaf is.
        if node.is_leaf() {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&id, "confirmed leaf cannot open")),
            );
            return;
        }
        let unique = self.op_flags(op).unique_branch || self.opts.unique_branch;
        if unique {
            // Close set is snapshotted now; a racing open queued behind us
            // recomputes its own set then (last writer wins).
            let keep: HashSet<NodeId> = self.ancestors(&id).into_iter().collect();
            let mut to_close: Vec<NodeId> = self
                .nodes
                .iter()
                .filter(|(nid, node)| {
                    node.open
                        && !nid.is_root()
                        && **nid != id
                        && !keep.contains(nid)
                        && !self.is_descendant(nid, &id)
                })
                .map(|(nid, _)| nid.clone())
                .collect();
            if !to_close.is_empty() {
                to_close.sort();
                debug!("unique branch: closing {} other branches", to_close.len());
                let open_id = id.clone();
                let unanimated = self.op_flags(op).unanimated;
                let group = self.group_open(move |tree| tree.finish_open(op, open_id));
                for other in to_close {
                    // The ticket completes from the nested close's terminal,
                    // so the group waits out closes parked in the busy retry
                    // loop before the open's own success fires. Async lane:
                    // a deferred completion must not jam the sync lane.
                    self.group_push(group, Lane::Async, move |tree, ticket| {
                        let mut opts = OpOptions::new()
                            .on_success(move |tree, _| tree.complete(ticket))
                            .on_fail(move |tree, _| tree.complete(ticket))
                            .on_notify(move |tree, _| tree.complete(ticket));
                        opts.flags.unanimated = unanimated;
                        tree.close_with(&other, opts);
                    });
                }
                self.group_seal(group);
                return;
            }
        }
        self.finish_open(op, id);
    }

    /// Final open step: flip the state, refresh bookkeeping, deliver the
    /// terminal, then fire any requested propagation.
    fn finish_open(&mut self, op: u64, id: NodeId) {
        let flags = self.op_flags(op);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.open = true;
        }
        self.renderer.set_open_view(&id, true);
        self.renderer.animate(&id, true, flags.unanimated);
        self.refresh_children(&id);
        self.finish_op(op, Outcome::Success);
        if flags.expand || self.opts.auto_expand_on_open {
            self.open_children(&id, flags);
        }
    }

    /// Fire derived opens for each child (no terminal callbacks).
    fn open_children(&mut self, id: &NodeId, flags: OpFlags) {
        let Some(children) = self.children(id).map(<[NodeId]>::to_vec) else {
            return;
        };
        for child in children {
            let inner = self
                .nodes
                .get(&child)
                .map(|n| !n.is_leaf())
                .unwrap_or(false);
            if inner {
                self.open_with(&child, OpOptions::new().flags(flags));
            }
        }
    }

    /// Collapse/empty propagation shared by the success and notify paths.
    fn close_propagate(&mut self, id: &NodeId, flags: OpFlags) {
        if flags.empty || self.opts.empty_on_collapse {
            self.teardown_children(id);
            if let Some(node) = self.nodes.get_mut(id) {
                node.load_state = LoadState::Unloaded;
            }
            return;
        }
        if flags.collapse || self.opts.auto_collapse_on_close {
            let Some(children) = self.children(id).map(<[NodeId]>::to_vec) else {
                return;
            };
            for child in children {
                let open = self.nodes.get(&child).map(|n| n.open).unwrap_or(false);
                if open {
                    self.close_with(&child, OpOptions::new().flags(flags));
                }
            }
        }
    }
}
