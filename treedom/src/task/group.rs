//! Fan-out/fan-in bookkeeping for task groups.

use std::collections::HashMap;

use log::trace;

use crate::tree::Tree;

/// Handle to one fan-out/fan-in group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(pub(crate) u64);

type Completion = Box<dyn FnOnce(&mut Tree)>;

struct GroupState {
    /// Outstanding work. Starts at 1: the constructor token, released by
    /// `seal`, so a group whose tasks all finish before sealing still fires
    /// exactly once.
    pending: usize,
    on_complete: Option<Completion>,
}

/// Tracks pending counters and completion callbacks per group.
///
/// Tasks may be added while other tasks of the same group are running; the
/// group only finalizes once the counter actually reaches zero, which
/// enables recursive branch construction to keep feeding the same group.
#[derive(Default)]
pub(crate) struct GroupTable {
    next_id: u64,
    groups: HashMap<u64, GroupState>,
}

impl GroupTable {
    pub(crate) fn open(&mut self, on_complete: Completion) -> GroupId {
        self.next_id += 1;
        let id = GroupId(self.next_id);
        self.groups.insert(
            id.0,
            GroupState {
                pending: 1,
                on_complete: Some(on_complete),
            },
        );
        trace!("group {:?} opened", id);
        id
    }

    /// Account for one more unit of work.
    pub(crate) fn add(&mut self, id: GroupId) {
        if let Some(group) = self.groups.get_mut(&id.0) {
            group.pending += 1;
        }
    }

    /// Account for one finished unit. Returns the completion callback when
    /// this was the last outstanding unit.
    pub(crate) fn done(&mut self, id: GroupId) -> Option<Completion> {
        let group = self.groups.get_mut(&id.0)?;
        group.pending = group.pending.saturating_sub(1);
        if group.pending > 0 {
            return None;
        }
        trace!("group {:?} complete", id);
        self.groups.remove(&id.0).and_then(|g| g.on_complete)
    }

    pub(crate) fn clear(&mut self) {
        self.groups.clear();
    }
}
