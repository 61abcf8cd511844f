//! The loader collaborator: on-demand child records for a branch.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::NodeId;

/// Failure reported by a loader.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct LoadError(pub String);

impl LoadError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// One child record supplied by a loader.
///
/// `children` present (even empty) means the branch arrives pre-loaded;
/// absent means load-on-open. `source` names an alternate registered loader
/// for the record's subtree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    #[serde(default)]
    pub label: String,
    /// Some(true)/Some(false) force inner/leaf; None leaves the kind
    /// undetermined until loaded.
    #[serde(default)]
    pub inner: Option<bool>,
    #[serde(default)]
    pub open_requested: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<NodeRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl NodeRecord {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            ..Default::default()
        }
    }

    /// Mark the record as an inner node that loads on open.
    pub fn inner(mut self) -> Self {
        self.inner = Some(true);
        self
    }

    /// Mark the record as a confirmed leaf.
    pub fn leaf(mut self) -> Self {
        self.inner = Some(false);
        self
    }

    pub fn open_requested(mut self) -> Self {
        self.open_requested = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Attach pre-loaded children.
    pub fn children(mut self, children: Vec<NodeRecord>) -> Self {
        self.children = Some(children);
        self
    }

    /// Route this record's subtree to a named loader.
    pub fn source(mut self, name: impl Into<String>) -> Self {
        self.source = Some(name.into());
        self
    }
}

/// External collaborator supplying child records for a node on demand.
///
/// `node` is None when the tree asks for its top-level records.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn fetch(&self, node: Option<&NodeId>) -> Result<Vec<NodeRecord>, LoadError>;
}

/// Fixed record table keyed by parent id, for demos and tests.
///
/// Parents without an entry resolve to an empty child list.
#[derive(Debug, Clone, Default)]
pub struct StaticRecords {
    top: Vec<NodeRecord>,
    branches: HashMap<String, Vec<NodeRecord>>,
}

impl StaticRecords {
    pub fn new(top: Vec<NodeRecord>) -> Self {
        Self {
            top,
            branches: HashMap::new(),
        }
    }

    /// Register the children served for one parent id.
    pub fn branch(mut self, parent: impl Into<String>, records: Vec<NodeRecord>) -> Self {
        self.branches.insert(parent.into(), records);
        self
    }
}

#[async_trait]
impl Loader for StaticRecords {
    async fn fetch(&self, node: Option<&NodeId>) -> Result<Vec<NodeRecord>, LoadError> {
        match node {
            None => Ok(self.top.clone()),
            Some(id) => Ok(self.branches.get(id.as_str()).cloned().unwrap_or_default()),
        }
    }
}
