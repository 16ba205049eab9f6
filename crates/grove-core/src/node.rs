//! Persisted node types.

use crate::key::{IdentityKey, NodeKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Storage id of a node. Not stable across node replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The label a node is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeLabel {
    Class,
    Method,
    Endpoint,
    Configuration,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Class => "ClassNode",
            NodeLabel::Method => "MethodNode",
            NodeLabel::Endpoint => "EndpointNode",
            NodeLabel::Configuration => "ConfigurationNode",
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a node.
///
/// `Deleted` marks a tombstone; tombstones are excluded from active views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    #[default]
    Active,
    Modified,
    Deleted,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Active => "ACTIVE",
            NodeStatus::Modified => "MODIFIED",
            NodeStatus::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Properties of a persisted node, everything except its storage id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub label: NodeLabel,
    /// Short display name (simple class name or method name).
    pub name: String,
    pub class_name: String,
    pub method_name: Option<String>,
    pub file_path: String,
    pub content: String,
    pub ast_hash: Option<String>,
    pub project_id: String,
    pub branch: String,
    pub version: String,
    pub status: NodeStatus,
    pub base_branch: Option<String>,
    pub base_version: Option<String>,
    pub pull_request_id: Option<String>,
    /// Endpoint metadata (http method, path, media types). Empty for
    /// non-endpoint nodes.
    pub endpoint: BTreeMap<String, String>,
}

impl NodeRecord {
    pub fn identity(&self) -> IdentityKey {
        IdentityKey {
            class_name: self.class_name.clone(),
            method_name: self.method_name.clone(),
        }
    }

    pub fn key(&self) -> NodeKey {
        self.identity().in_branch(&self.project_id, &self.branch)
    }

    /// Whether this node belongs to a pull-request scope rather than the
    /// branch itself.
    pub fn is_pr_scoped(&self) -> bool {
        self.pull_request_id.is_some()
    }

    pub fn is_tombstone(&self) -> bool {
        self.status == NodeStatus::Deleted
    }

    /// Same properties, relocated to another branch.
    pub fn with_branch(&self, branch: &str) -> Self {
        Self {
            branch: branch.to_string(),
            ..self.clone()
        }
    }
}

/// A node as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub record: NodeRecord,
}

impl GraphNode {
    pub fn identity(&self) -> IdentityKey {
        self.record.identity()
    }

    pub fn key(&self) -> NodeKey {
        self.record.key()
    }

    pub fn branch(&self) -> &str {
        &self.record.branch
    }

    pub fn ast_hash(&self) -> Option<&str> {
        self.record.ast_hash.as_deref()
    }

    pub fn status(&self) -> NodeStatus {
        self.record.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&NodeStatus::Modified).unwrap();
        assert_eq!(json, "\"MODIFIED\"");
        let status: NodeStatus = serde_json::from_str("\"DELETED\"").unwrap();
        assert_eq!(status, NodeStatus::Deleted);
    }

    #[test]
    fn test_label_names() {
        assert_eq!(NodeLabel::Endpoint.to_string(), "EndpointNode");
        assert_eq!(NodeLabel::Configuration.as_str(), "ConfigurationNode");
    }
}
