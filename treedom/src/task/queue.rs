//! Two-lane bounded-concurrency scheduler.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use log::{debug, info, trace};

use crate::config::TreeOptions;
use crate::tree::Tree;

/// Which lane a task runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    /// FIFO; one at a time; runs to completion inline.
    Sync,
    /// FIFO; up to the configured concurrency limit in flight; reports
    /// completion later.
    Async,
}

/// Identity of one scheduled task, used to report its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(pub(crate) u64);

/// A unit of work. Must arrange for [`Tree::complete`] to be called with its
/// ticket exactly once: inline for the sync lane, any time later for the
/// async lane. A task that never completes permanently occupies its slot;
/// the queue does not detect or recover from that.
pub(crate) type Task = Box<dyn FnOnce(&mut Tree, Ticket)>;

struct QueuedTask {
    ticket: Ticket,
    /// Earliest dispatch time, for delayed retries.
    not_before: Option<Instant>,
    task: Task,
}

/// Two internal lanes driven by a fixed-rate tick.
///
/// Each tick attempts one unit of work: a ready synchronous task if none is
/// running, otherwise the next asynchronous task if a slot is free. Once the
/// queue has been continuously non-idle for longer than `throttle_after`,
/// synchronous dispatch inserts a `cooldown` before the next sync task so
/// the host gets breathing room; the async lane is not throttled.
pub struct TaskQueue {
    next_ticket: u64,
    sync_lane: VecDeque<QueuedTask>,
    async_lane: VecDeque<QueuedTask>,
    sync_running: bool,
    async_running: usize,
    limit: usize,
    throttle_after: Duration,
    cooldown: Duration,
    busy_since: Option<Instant>,
    cooldown_until: Option<Instant>,
    inflight: HashMap<u64, Lane>,
}

impl TaskQueue {
    pub(crate) fn new(opts: &TreeOptions) -> Self {
        Self {
            next_ticket: 0,
            sync_lane: VecDeque::new(),
            async_lane: VecDeque::new(),
            sync_running: false,
            async_running: 0,
            limit: opts.async_concurrency_limit.max(1),
            throttle_after: opts.throttle_after,
            cooldown: opts.cooldown,
            busy_since: None,
            cooldown_until: None,
            inflight: HashMap::new(),
        }
    }

    /// Queue a task on a lane.
    pub(crate) fn push(&mut self, lane: Lane, task: Task) -> Ticket {
        self.push_at(lane, None, task)
    }

    /// Queue a task that must not start before `not_before`.
    pub(crate) fn push_delayed(&mut self, lane: Lane, not_before: Instant, task: Task) -> Ticket {
        self.push_at(lane, Some(not_before), task)
    }

    fn push_at(&mut self, lane: Lane, not_before: Option<Instant>, task: Task) -> Ticket {
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        let queued = QueuedTask {
            ticket,
            not_before,
            task,
        };
        match lane {
            Lane::Sync => self.sync_lane.push_back(queued),
            Lane::Async => self.async_lane.push_back(queued),
        }
        trace!("queued {:?} task {:?}", lane, ticket);
        ticket
    }

    /// True while anything is queued or in flight.
    pub fn busy(&self) -> bool {
        self.sync_running
            || self.async_running > 0
            || !self.sync_lane.is_empty()
            || !self.async_lane.is_empty()
    }

    pub fn queued(&self, lane: Lane) -> usize {
        match lane {
            Lane::Sync => self.sync_lane.len(),
            Lane::Async => self.async_lane.len(),
        }
    }

    /// Asynchronous tasks currently in flight.
    pub fn async_in_flight(&self) -> usize {
        self.async_running
    }

    /// Drop all pending work and reset counters. Safe mid-flight; tickets of
    /// tasks already running become unknown and their completions are
    /// ignored.
    pub(crate) fn destroy(&mut self) {
        let dropped = self.sync_lane.len() + self.async_lane.len();
        if dropped > 0 || !self.inflight.is_empty() {
            info!(
                "queue destroyed: {} pending dropped, {} in flight abandoned",
                dropped,
                self.inflight.len()
            );
        }
        self.sync_lane.clear();
        self.async_lane.clear();
        self.inflight.clear();
        self.sync_running = false;
        self.async_running = 0;
        self.busy_since = None;
        self.cooldown_until = None;
    }

    /// One dispatch attempt: pick the next runnable task, updating the
    /// running counters. The caller is responsible for executing it.
    pub(crate) fn take_ready(&mut self, now: Instant) -> Option<(Ticket, Task)> {
        if !self.busy() {
            self.busy_since = None;
            return None;
        }
        let busy_since = *self.busy_since.get_or_insert(now);

        // Sync lane has priority, unless one is running or we are cooling
        // down.
        let cooling = self.cooldown_until.is_some_and(|until| now < until);
        if !self.sync_running
            && !cooling
            && let Some(pos) = self
                .sync_lane
                .iter()
                .position(|t| t.not_before.is_none_or(|at| at <= now))
            && let Some(queued) = self.sync_lane.remove(pos)
        {
            self.sync_running = true;
            self.inflight.insert(queued.ticket.0, Lane::Sync);
            if now.duration_since(busy_since) > self.throttle_after {
                self.cooldown_until = Some(now + self.cooldown);
                debug!("sync lane throttled, cooldown {:?}", self.cooldown);
            }
            return Some((queued.ticket, queued.task));
        }

        if self.async_running < self.limit
            && let Some(pos) = self
                .async_lane
                .iter()
                .position(|t| t.not_before.is_none_or(|at| at <= now))
            && let Some(queued) = self.async_lane.remove(pos)
        {
            self.async_running += 1;
            self.inflight.insert(queued.ticket.0, Lane::Async);
            return Some((queued.ticket, queued.task));
        }

        None
    }

    /// Record a task's completion. Returns the lane it ran on, or None for
    /// unknown tickets (already completed, or dropped by `destroy`).
    pub(crate) fn finish(&mut self, ticket: Ticket) -> Option<Lane> {
        let lane = self.inflight.remove(&ticket.0)?;
        match lane {
            Lane::Sync => self.sync_running = false,
            Lane::Async => self.async_running = self.async_running.saturating_sub(1),
        }
        if !self.busy() {
            self.busy_since = None;
            self.cooldown_until = None;
        }
        Some(lane)
    }
}
