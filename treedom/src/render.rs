//! The rendering collaborator surface.
//!
//! The engine never builds views itself; it tells a renderer what changed.
//! View handles are renderer-internal, keyed by node id, so the engine
//! carries no presentation state beyond the sibling bookkeeping on
//! [`Node`](crate::node::Node).

use crate::node::{Node, NodeId};

/// Consumes node state changes and materializes/animates views.
///
/// Animation timing never gates engine state: `animate` is advisory and the
/// engine does not wait for it.
pub trait Renderer {
    /// A node was materialized; `node.parent` and `node.depth` place it.
    fn create_view(&mut self, node: &Node);

    /// A node was removed.
    fn remove_view(&mut self, id: &NodeId);

    /// A node's open state changed.
    fn set_open_view(&mut self, id: &NodeId, open: bool);

    /// Reveal or hide a node's subtree presentation.
    fn animate(&mut self, id: &NodeId, reveal: bool, unanimated: bool);
}

/// Renderer that does nothing; the default for headless use and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn create_view(&mut self, _node: &Node) {}
    fn remove_view(&mut self, _id: &NodeId) {}
    fn set_open_view(&mut self, _id: &NodeId, _open: bool) {}
    fn animate(&mut self, _id: &NodeId, _reveal: bool, _unanimated: bool) {}
}
