//! Structural operations: branch materialization, insertion, removal, and
//! moves, plus the derived sibling bookkeeping they maintain.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use log::{debug, trace, warn};

use crate::context::{OpContext, OpOptions};
use crate::error::{Outcome, TreeError};
use crate::event::EventKind;
use crate::loader::NodeRecord;
use crate::node::{LoadState, Node, NodeId, ROOT_ID};
use crate::task::{GroupId, Lane};
use crate::tree::Tree;

/// Destination descriptor for [`Tree::move_to`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveTarget {
    /// Append as the last child of this node.
    Under(NodeId),
    /// Insert as the previous sibling of this node.
    Before(NodeId),
    /// Insert as the next sibling of this node.
    After(NodeId),
}

/// Where materialized records land in the parent's child list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InsertPos {
    End,
    At(usize),
}

impl Tree {
    // ------------------------------------------------------------------
    // Public entry points
    // ------------------------------------------------------------------

    /// Materialize records as the last children of `parent`.
    pub fn append(&mut self, parent: &NodeId, records: Vec<NodeRecord>) {
        self.append_with(parent, records, OpOptions::new());
    }

    pub fn append_with(&mut self, parent: &NodeId, records: Vec<NodeRecord>, opts: OpOptions) {
        let ctx = OpContext::normalize(parent.clone(), opts, None, None);
        let op = self.begin_op(ctx);
        self.append_attempt(op, parent.clone(), records, InsertPos::End, 0);
    }

    /// Materialize records as previous siblings of `anchor`.
    pub fn insert_before(&mut self, anchor: &NodeId, records: Vec<NodeRecord>) {
        self.insert_before_with(anchor, records, OpOptions::new());
    }

    pub fn insert_before_with(&mut self, anchor: &NodeId, records: Vec<NodeRecord>, opts: OpOptions) {
        let ctx = OpContext::normalize(anchor.clone(), opts, None, None);
        let op = self.begin_op(ctx);
        self.insert_attempt(op, anchor.clone(), records, false, 0);
    }

    /// Materialize records as next siblings of `anchor`.
    pub fn insert_after(&mut self, anchor: &NodeId, records: Vec<NodeRecord>) {
        self.insert_after_with(anchor, records, OpOptions::new());
    }

    pub fn insert_after_with(&mut self, anchor: &NodeId, records: Vec<NodeRecord>, opts: OpOptions) {
        let ctx = OpContext::normalize(anchor.clone(), opts, None, None);
        let op = self.begin_op(ctx);
        self.insert_attempt(op, anchor.clone(), records, true, 0);
    }

    /// Detach a node and its subtree, tearing descendants down
    /// children-before-parents.
    pub fn remove(&mut self, id: &NodeId) {
        self.remove_with(id, OpOptions::new());
    }

    pub fn remove_with(&mut self, id: &NodeId, opts: OpOptions) {
        let ctx = OpContext::normalize(id.clone(), opts, Some(EventKind::Removed), None);
        let op = self.begin_op(ctx);
        self.remove_attempt(op, id.clone(), 0);
    }

    /// Move a node (with its subtree) to a new position.
    pub fn move_to(&mut self, id: &NodeId, target: MoveTarget) {
        self.move_with(id, target, OpOptions::new());
    }

    pub fn move_with(&mut self, id: &NodeId, target: MoveTarget, opts: OpOptions) {
        let ctx = OpContext::normalize(id.clone(), opts, Some(EventKind::Moved), None);
        let op = self.begin_op(ctx);
        self.move_attempt(op, id.clone(), target, 0);
    }

    // ------------------------------------------------------------------
    // Attempt bodies
    // ------------------------------------------------------------------

    fn append_attempt(
        &mut self,
        op: u64,
        parent: NodeId,
        records: Vec<NodeRecord>,
        pos: InsertPos,
        attempts: u32,
    ) {
        let Some(node) = self.nodes.get(&parent) else {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&parent, "unknown node")),
            );
            return;
        };
        if node.busy {
            self.schedule_retry(op, parent, attempts, move |tree, parent, next| {
                tree.append_attempt(op, parent, records, pos, next);
            });
            return;
        }
        if node.is_loading() {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&parent, "load already in progress")),
            );
            return;
        }
        if let Err(reason) = self.validate_records(&records) {
            self.finish_op(op, Outcome::Fail(TreeError::load(&parent, reason)));
            return;
        }
        self.acquire_busy(op, &parent);
        self.create_branch(parent, records, pos, move |tree| {
            tree.finish_op(op, Outcome::Success);
        });
    }

    fn insert_attempt(
        &mut self,
        op: u64,
        anchor: NodeId,
        records: Vec<NodeRecord>,
        after: bool,
        attempts: u32,
    ) {
        let Some(anchor_node) = self.nodes.get(&anchor) else {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&anchor, "unknown node")),
            );
            return;
        };
        let Some(parent) = anchor_node.parent.clone() else {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&anchor, "cannot insert beside the root")),
            );
            return;
        };
        let busy = self.nodes.get(&parent).map(|n| n.busy).unwrap_or(false);
        if busy {
            self.schedule_retry(op, parent, attempts, move |tree, _, next| {
                tree.insert_attempt(op, anchor, records, after, next);
            });
            return;
        }
        if let Err(reason) = self.validate_records(&records) {
            self.finish_op(op, Outcome::Fail(TreeError::load(&parent, reason)));
            return;
        }
        // Anchor position is resolved per attempt; it may have moved while
        // we waited out a busy parent.
        let Some(index) = self
            .nodes
            .get(&parent)
            .and_then(|p| p.children.iter().position(|c| c == &anchor))
        else {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&anchor, "anchor detached")),
            );
            return;
        };
        let index = if after { index + 1 } else { index };
        self.acquire_busy(op, &parent);
        self.create_branch(parent, records, InsertPos::At(index), move |tree| {
            tree.finish_op(op, Outcome::Success);
        });
    }

    fn remove_attempt(&mut self, op: u64, id: NodeId, attempts: u32) {
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
                Outcome::Fail(TreeError::validation(&id, "the virtual root cannot be removed")),
            );
            return;
        }
        if node.busy {
            self.schedule_retry(op, id, attempts, move |tree, id, next| {
                tree.remove_attempt(op, id, next);
            });
            return;
        }
        if !self.emit(Some(&id), EventKind::BeforeRemove) {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::vetoed(&id, EventKind::BeforeRemove)),
            );
            return;
        }

        // Descendants first, so observers see a consistent teardown order.
        self.teardown_children(&id);
        let parent = self.nodes.get(&id).and_then(|n| n.parent.clone());
        self.renderer.remove_view(&id);
        self.nodes.remove(&id);
        if let Some(parent) = parent {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|c| c != &id);
                if parent_node.children.is_empty() && !parent.is_root() {
                    // Last sibling gone: the child container goes with it.
                    parent_node.inner = Some(false);
                }
            }
            self.refresh_children(&parent);
        }
        debug!("removed '{}'", id);
        self.finish_op(op, Outcome::Success);
    }

    fn move_attempt(&mut self, op: u64, id: NodeId, target: MoveTarget, attempts: u32) {
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
                Outcome::Fail(TreeError::validation(&id, "the virtual root cannot move")),
            );
            return;
        }
        if node.busy {
            self.schedule_retry(op, id, attempts, move |tree, id, next| {
                tree.move_attempt(op, id, target, next);
            });
            return;
        }

        // Resolve the destination fully before mutating anything, so a
        // refusal leaves the tree untouched.
        let (new_parent, anchor) = match &target {
            MoveTarget::Under(parent) => (parent.clone(), None),
            MoveTarget::Before(sib) | MoveTarget::After(sib) => {
                let Some(sib_node) = self.nodes.get(sib) else {
                    self.finish_op(
                        op,
                        Outcome::Fail(TreeError::validation(sib, "unknown destination")),
                    );
                    return;
                };
                let Some(parent) = sib_node.parent.clone() else {
                    self.finish_op(
                        op,
                        Outcome::Fail(TreeError::validation(sib, "cannot move beside the root")),
                    );
                    return;
                };
                let after = matches!(target, MoveTarget::After(_));
                (parent, Some((sib.clone(), after)))
            }
        };
        let Some(dest) = self.nodes.get(&new_parent) else {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&new_parent, "unknown destination")),
            );
            return;
        };
        if new_parent == id || self.is_descendant(&new_parent, &id) {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::Structural(format!(
                    "cannot move '{id}' under its own subtree"
                ))),
            );
            return;
        }
        if !dest.is_loaded() && !new_parent.is_root() && matches!(target, MoveTarget::Under(_)) {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&new_parent, "destination is not loaded")),
            );
            return;
        }
        if !self.emit(Some(&id), EventKind::BeforeMove) {
            self.finish_op(
                op,
                Outcome::Fail(TreeError::vetoed(&id, EventKind::BeforeMove)),
            );
            return;
        }

        let old_parent = self.nodes.get(&id).and_then(|n| n.parent.clone());
        if let Some(old) = &old_parent
            && let Some(old_node) = self.nodes.get_mut(old)
        {
            old_node.children.retain(|c| c != &id);
        }

        // Index is computed after detaching: within-parent moves shift it.
        let index = match &anchor {
            None => self.nodes.get(&new_parent).map(|p| p.children.len()),
            Some((sib, after)) => self
                .nodes
                .get(&new_parent)
                .and_then(|p| p.children.iter().position(|c| c == sib))
                .map(|i| if *after { i + 1 } else { i }),
        };
        let Some(index) = index else {
            // Anchor vanished between resolution and detach; put the node
            // back where it was and refuse.
            if let Some(old) = &old_parent
                && let Some(old_node) = self.nodes.get_mut(old)
            {
                old_node.children.push(id.clone());
            }
            self.finish_op(
                op,
                Outcome::Fail(TreeError::validation(&id, "destination anchor detached")),
            );
            return;
        };

        let new_depth = self.nodes.get(&new_parent).map(|p| p.depth + 1).unwrap_or(1);
        if let Some(parent_node) = self.nodes.get_mut(&new_parent) {
            parent_node.children.insert(index, id.clone());
            if parent_node.load_state == LoadState::Unloaded {
                parent_node.load_state = LoadState::Loaded;
            }
            parent_node.inner = Some(true);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = Some(new_parent.clone());
        }
        self.set_depth_recursive(&id, new_depth);
        if let Some(old) = &old_parent {
            if let Some(old_node) = self.nodes.get_mut(old)
                && old_node.children.is_empty()
                && !old.is_root()
            {
                old_node.inner = Some(false);
            }
            self.refresh_children(old);
        }
        self.refresh_children(&new_parent);
        debug!("moved '{}' under '{}'", id, new_parent);
        self.finish_op(op, Outcome::Success);
    }

    // ------------------------------------------------------------------
    // Branch materialization
    // ------------------------------------------------------------------

    /// Recursively materialize records under `parent` through a task group,
    /// so deep branches interleave fairly with other queued work.
    ///
    /// On completion the parent is marked `Loaded`, its kind confirmed, any
    /// `open_requested` records opened via derived contexts, and `on_done`
    /// invoked. Zero records complete synchronously (confirmed leaf).
    pub(crate) fn create_branch(
        &mut self,
        parent: NodeId,
        records: Vec<NodeRecord>,
        pos: InsertPos,
        on_done: impl FnOnce(&mut Tree) + 'static,
    ) {
        let opens: Rc<RefCell<Vec<NodeId>>> = Rc::default();
        let group_opens = Rc::clone(&opens);
        let group_parent = parent.clone();
        let group = self.group_open(move |tree| {
            if let Some(node) = tree.nodes.get_mut(&group_parent) {
                node.load_state = LoadState::Loaded;
                node.inner = Some(!node.children.is_empty());
            }
            on_done(tree);
            for open_id in group_opens.borrow_mut().drain(..) {
                tree.open_with(&open_id, OpOptions::new());
            }
        });
        self.materialize(parent, records, pos, group, opens);
        self.group_seal(group);
    }

    fn materialize(
        &mut self,
        parent: NodeId,
        records: Vec<NodeRecord>,
        pos: InsertPos,
        group: GroupId,
        opens: Rc<RefCell<Vec<NodeId>>>,
    ) {
        let Some(parent_node) = self.nodes.get(&parent) else {
            warn!("materialize into vanished parent '{}'", parent);
            return;
        };
        let parent_depth = parent_node.depth;
        let mut index = match pos {
            InsertPos::End => parent_node.children.len(),
            InsertPos::At(at) => at.min(parent_node.children.len()),
        };
        trace!("materializing {} records under '{}'", records.len(), parent);

        for record in records {
            let id = NodeId::new(&record.id);
            if self.nodes.contains_key(&id) {
                // validate_records catches this up front; only reachable
                // when records raced a concurrent insert.
                warn!("skipping duplicate record id '{}'", id);
                continue;
            }
            let mut node = Node::new(id.clone(), record.label);
            node.parent = Some(parent.clone());
            node.hidden = record.hidden;
            node.disabled = record.disabled;
            node.source = record.source;
            node.depth = parent_depth + 1;
            match &record.children {
                // Absent children: load on open.
                None => {
                    node.load_state = LoadState::Unloaded;
                    node.inner = record.inner;
                }
                // Present children (even empty): the branch is pre-loaded.
                Some(kids) => {
                    node.load_state = LoadState::Loaded;
                    node.inner = record.inner.or(Some(!kids.is_empty()));
                }
            }
            self.nodes.insert(id.clone(), node);
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.insert(index, id.clone());
                index += 1;
            }
            if let Some(node) = self.nodes.get(&id) {
                self.renderer.create_view(node);
            }
            if record.open_requested {
                opens.borrow_mut().push(id.clone());
            }
            if let Some(kids) = record.children
                && !kids.is_empty()
            {
                let sub_parent = id.clone();
                let sub_opens = Rc::clone(&opens);
                self.group_push(group, Lane::Sync, move |tree, ticket| {
                    tree.materialize(sub_parent, kids, InsertPos::End, group, sub_opens);
                    tree.complete(ticket);
                });
            }
        }
        self.refresh_children(&parent);
    }

    /// Reject malformed record batches before touching the tree: every id
    /// must be present, unique within the batch, and new to the tree.
    pub(crate) fn validate_records(&self, records: &[NodeRecord]) -> Result<(), String> {
        fn walk(
            tree: &Tree,
            records: &[NodeRecord],
            seen: &mut HashSet<String>,
        ) -> Result<(), String> {
            for record in records {
                if record.id.is_empty() {
                    return Err("record with empty id".to_string());
                }
                if record.id == ROOT_ID {
                    return Err(format!("record uses the reserved id '{ROOT_ID}'"));
                }
                if !seen.insert(record.id.clone()) {
                    return Err(format!("duplicate record id '{}'", record.id));
                }
                if tree.nodes.contains_key(&NodeId::new(&record.id)) {
                    return Err(format!("record id '{}' already exists", record.id));
                }
                if let Some(children) = &record.children {
                    walk(tree, children, seen)?;
                }
            }
            Ok(())
        }
        walk(self, records, &mut HashSet::new())
    }

    // ------------------------------------------------------------------
    // Teardown and bookkeeping
    // ------------------------------------------------------------------

    /// Remove every descendant of `id`, children before parents, emitting
    /// close/removed events along the way. The node itself stays.
    pub(crate) fn teardown_children(&mut self, id: &NodeId) {
        let Some(children) = self.children(id).map(<[NodeId]>::to_vec) else {
            return;
        };
        for child in children {
            self.teardown_node(&child);
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.children.clear();
        }
    }

    fn teardown_node(&mut self, id: &NodeId) {
        let Some(children) = self.children(id).map(<[NodeId]>::to_vec) else {
            return;
        };
        for child in children {
            self.teardown_node(&child);
        }
        let was_open = self.nodes.get(id).map(|n| n.open).unwrap_or(false);
        if was_open {
            if let Some(node) = self.nodes.get_mut(id) {
                node.open = false;
            }
            self.emit(Some(id), EventKind::Closed);
        }
        self.emit(Some(id), EventKind::Removed);
        self.renderer.remove_view(id);
        self.nodes.remove(id);
    }

    /// Recompute the derived bookkeeping for one parent's child run:
    /// first/last markers, depth, and alternating parity over the visible
    /// siblings.
    pub(crate) fn refresh_children(&mut self, parent: &NodeId) {
        let Some(parent_node) = self.nodes.get(parent) else {
            return;
        };
        let depth = parent_node.depth;
        let children = parent_node.children.clone();
        let count = children.len();
        let mut stripe = false;
        for (i, child) in children.iter().enumerate() {
            if let Some(node) = self.nodes.get_mut(child) {
                node.is_first = i == 0;
                node.is_last = i + 1 == count;
                node.depth = depth + 1;
                if !node.hidden {
                    node.striped = stripe;
                    stripe = !stripe;
                }
            }
        }
    }

    fn set_depth_recursive(&mut self, id: &NodeId, depth: u16) {
        let children = match self.nodes.get_mut(id) {
            Some(node) => {
                node.depth = depth;
                node.children.clone()
            }
            None => return,
        };
        for child in children {
            self.set_depth_recursive(&child, depth + 1);
        }
    }
}
