//! Asynchronous operation engine for hierarchical, lazily-loaded node
//! structures.
//!
//! A [`Tree`] owns its nodes and every piece of machinery that keeps their
//! mutations consistent: a cooperative two-lane [`TaskQueue`], fan-out task
//! groups, an [`EventBus`](event::EventBus) with before-event vetoes, and
//! per-operation success/fail/notify terminals. Child records come from an
//! async [`Loader`]; the [`Driver`] bridges the deterministic core to tokio.

pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod event;
pub mod loader;
pub mod node;
pub mod render;
pub mod task;
pub mod tree;

pub use config::TreeOptions;
pub use context::{OpFlags, OpOptions};
pub use driver::Driver;
pub use error::{Outcome, TreeError};
pub use event::{EventKind, HandlerId, Notice};
pub use loader::{LoadError, Loader, NodeRecord, StaticRecords};
pub use node::{LoadState, Node, NodeId, ROOT_ID};
pub use render::{NullRenderer, Renderer};
pub use task::{GroupId, Lane, Ticket};
pub use tree::{LoadRequest, MoveTarget, Tree};
