//! Read-side lookups over a branch.

use crate::store::{GraphStore, StoreError};
use grove_core::{GraphNode, IdentityKey, NodeLabel, NodeStatus};
use serde::{Deserialize, Serialize};

/// Property filter for `find_nodes`. Unset fields match anything;
/// `method_name` is matched NULL-aware when `class_level` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFilter {
    pub project_id: String,
    pub branch: String,
    pub class_name: Option<String>,
    pub method_name: Option<String>,
    /// Only class-level nodes (no method name).
    pub class_level: bool,
    pub label: Option<NodeLabel>,
    pub status: Option<NodeStatus>,
    pub pull_request_id: Option<String>,
}

impl NodeFilter {
    pub fn new(project_id: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            branch: branch.into(),
            ..Self::default()
        }
    }

    pub fn class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn method(mut self, method_name: impl Into<String>) -> Self {
        self.method_name = Some(method_name.into());
        self
    }

    pub fn class_level(mut self) -> Self {
        self.class_level = true;
        self
    }

    pub fn label(mut self, label: NodeLabel) -> Self {
        self.label = Some(label);
        self
    }

    pub fn status(mut self, status: NodeStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn pull_request(mut self, pull_request_id: impl Into<String>) -> Self {
        self.pull_request_id = Some(pull_request_id.into());
        self
    }

    pub fn matches(&self, node: &GraphNode) -> bool {
        let r = &node.record;
        r.project_id == self.project_id
            && r.branch == self.branch
            && self.class_name.as_ref().map_or(true, |c| *c == r.class_name)
            && self
                .method_name
                .as_ref()
                .map_or(true, |m| r.method_name.as_ref() == Some(m))
            && (!self.class_level || r.method_name.is_none())
            && self.label.map_or(true, |l| l == r.label)
            && self.status.map_or(true, |s| s == r.status)
            && self
                .pull_request_id
                .as_ref()
                .map_or(true, |pr| r.pull_request_id.as_ref() == Some(pr))
    }

    /// The exact identity the filter pins down, if any.
    fn identity(&self) -> Option<IdentityKey> {
        let class = self.class_name.as_ref()?;
        match (&self.method_name, self.class_level) {
            (Some(method), _) => Some(IdentityKey::method(class, method)),
            (None, true) => Some(IdentityKey::class(class)),
            (None, false) => None,
        }
    }
}

/// Nodes at any of `keys`. With a pull request id only nodes of that scope
/// are returned, otherwise every scope is.
pub fn nodes_by_keys(
    store: &dyn GraphStore,
    project_id: &str,
    branch: &str,
    keys: &[IdentityKey],
    pull_request_id: Option<&str>,
) -> Result<Vec<GraphNode>, StoreError> {
    let mut found = Vec::new();
    for key in keys {
        found.extend(
            store
                .nodes_at(project_id, branch, key)?
                .into_iter()
                .filter(|n| {
                    pull_request_id.map_or(true, |pr| n.record.pull_request_id.as_deref() == Some(pr))
                }),
        );
    }
    Ok(found)
}

pub fn find_nodes(store: &dyn GraphStore, filter: &NodeFilter) -> Result<Vec<GraphNode>, StoreError> {
    let candidates = match filter.identity() {
        Some(identity) => store.nodes_at(&filter.project_id, &filter.branch, &identity)?,
        None => store.branch_nodes(&filter.project_id, &filter.branch)?,
    };
    Ok(candidates.into_iter().filter(|n| filter.matches(n)).collect())
}

/// Live configuration nodes of a branch, sorted by class then method.
pub fn configuration_nodes(
    store: &dyn GraphStore,
    project_id: &str,
    branch: &str,
) -> Result<Vec<GraphNode>, StoreError> {
    let filter = NodeFilter::new(project_id, branch).label(NodeLabel::Configuration);
    let mut nodes: Vec<GraphNode> = find_nodes(store, &filter)?
        .into_iter()
        .filter(|n| !n.record.is_tombstone())
        .collect();
    nodes.sort_by(|a, b| {
        (&a.record.class_name, &a.record.method_name)
            .cmp(&(&b.record.class_name, &b.record.method_name))
    });
    Ok(nodes)
}
