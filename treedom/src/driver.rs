//! Tokio bridge between the deterministic engine core and async loaders.
//!
//! The engine itself never awaits: loads leave it as [`LoadRequest`]s and
//! come back through [`Tree::resolve_load`]. The driver owns that exchange,
//! spawning one fetch task per request and feeding replies back between
//! ticks. The driver future holds the tree directly and is not `Send`; run
//! it on a current-thread runtime.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::loader::{LoadError, Loader, NodeRecord};
use crate::task::Ticket;
use crate::tree::{LoadRequest, Tree};

type Reply = (Ticket, Result<Vec<NodeRecord>, LoadError>);

/// Drives a [`Tree`] against one or more [`Loader`]s.
pub struct Driver {
    tree: Tree,
    default_loader: Arc<dyn Loader>,
    sources: HashMap<String, Arc<dyn Loader>>,
    reply_tx: mpsc::UnboundedSender<Reply>,
    reply_rx: mpsc::UnboundedReceiver<Reply>,
}

impl Driver {
    pub fn new(tree: Tree, loader: impl Loader + 'static) -> Self {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        Self {
            tree,
            default_loader: Arc::new(loader),
            sources: HashMap::new(),
            reply_tx,
            reply_rx,
        }
    }

    /// Register a loader serving records whose branches name `name` as
    /// their data source.
    pub fn source(mut self, name: impl Into<String>, loader: impl Loader + 'static) -> Self {
        self.sources.insert(name.into(), Arc::new(loader));
        self
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn into_tree(self) -> Tree {
        self.tree
    }

    /// Spawn a fetch task for every request the engine has queued.
    pub fn dispatch_requests(&mut self) {
        for request in self.tree.take_load_requests() {
            let LoadRequest {
                ticket,
                node,
                source,
            } = request;
            let loader = match &source {
                Some(name) => match self.sources.get(name) {
                    Some(loader) => Arc::clone(loader),
                    None => {
                        warn!("no loader registered for source '{}', using default", name);
                        Arc::clone(&self.default_loader)
                    }
                },
                None => Arc::clone(&self.default_loader),
            };
            debug!("fetch dispatched for {:?} ({:?})", node, ticket);
            let tx = self.reply_tx.clone();
            tokio::spawn(async move {
                let result = loader.fetch(node.as_ref()).await;
                let _ = tx.send((ticket, result));
            });
        }
    }

    /// One embedding step: a single dispatch attempt, then forward queued
    /// fetches and apply any replies that have already arrived. Returns
    /// whether a task was started.
    pub fn step(&mut self, now: Instant) -> bool {
        let started = self.tree.tick(now);
        self.dispatch_requests();
        while let Ok((ticket, result)) = self.reply_rx.try_recv() {
            self.tree.resolve_load(ticket, result);
        }
        started
    }

    /// Tick, dispatch and resolve until the queue drains.
    ///
    /// Returns once no task is queued or in flight. New work started from
    /// terminal callbacks keeps the loop running.
    pub async fn run_until_idle(&mut self) {
        let mut interval = tokio::time::interval(self.tree.options().tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            self.tree.pump(Instant::now());
            self.dispatch_requests();
            if !self.tree.queue_busy() {
                break;
            }
            tokio::select! {
                Some((ticket, result)) = self.reply_rx.recv() => {
                    self.tree.resolve_load(ticket, result);
                }
                _ = interval.tick() => {}
            }
        }
    }
}
