use std::fmt;

use serde::{Deserialize, Serialize};

/// Reserved id of the virtual root node.
pub const ROOT_ID: &str = "#root";

/// Opaque node key, caller-supplied.
///
/// Ids are plain strings so callers can reuse whatever identity their data
/// source already carries. The engine only requires uniqueness within one
/// tree; the reserved [`ROOT_ID`] names the virtual root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id of the virtual root.
    pub fn root() -> Self {
        Self(ROOT_ID.to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Load axis of a node's lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadState {
    /// No child records fetched yet.
    #[default]
    Unloaded,
    /// A fetch is in flight.
    Loading,
    /// Children are materialized (possibly zero of them).
    Loaded,
}

/// One entry in the hierarchical structure.
///
/// Nodes are owned top-down by the [`Tree`](crate::tree::Tree); `parent` is a
/// lookup-only back-reference, never an ownership edge. Mutation goes through
/// the tree's operations so the invariants hold at every operation boundary.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    /// Display payload, opaque to the engine.
    pub label: String,
    pub parent: Option<NodeId>,
    /// Ordered child ids. Empty means either "confirmed leaf" or
    /// "maybe-inner, not loaded yet" depending on `load_state`/`inner`.
    pub children: Vec<NodeId>,
    pub load_state: LoadState,
    /// Meaningful only when `load_state == Loaded`.
    pub open: bool,
    /// Hidden overlay, independent of open/closed.
    pub hidden: bool,
    /// Advisory only; the engine never gates on it.
    pub disabled: bool,
    /// Transient flag held by the operation currently owning this node.
    pub busy: bool,
    /// None = unknown kind until loaded, Some(true) = confirmed inner,
    /// Some(false) = confirmed leaf.
    pub inner: Option<bool>,
    /// Data-source override for this subtree, naming a registered loader.
    pub source: Option<String>,

    // Derived presentation bookkeeping, kept exact after every mutation.
    pub depth: u16,
    pub is_first: bool,
    pub is_last: bool,
    /// Alternating parity over the visible sibling run.
    pub striped: bool,
}

impl Node {
    pub(crate) fn new(id: NodeId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            parent: None,
            children: Vec::new(),
            load_state: LoadState::Unloaded,
            open: false,
            hidden: false,
            disabled: false,
            busy: false,
            inner: None,
            source: None,
            depth: 0,
            is_first: false,
            is_last: false,
            striped: false,
        }
    }

    pub(crate) fn root() -> Self {
        let mut node = Self::new(NodeId::root(), "");
        // The virtual root is conceptually always open so depth-1 nodes
        // are visible once loaded.
        node.open = true;
        node.inner = Some(true);
        node
    }

    pub fn is_loaded(&self) -> bool {
        self.load_state == LoadState::Loaded
    }

    pub fn is_loading(&self) -> bool {
        self.load_state == LoadState::Loading
    }

    /// True while the node's kind is unknown: no children and never loaded.
    pub fn maybe_inner(&self) -> bool {
        self.inner.is_none() && self.children.is_empty() && self.load_state == LoadState::Unloaded
    }

    /// Confirmed leaf: loading it again makes no sense.
    pub fn is_leaf(&self) -> bool {
        self.inner == Some(false)
    }
}
