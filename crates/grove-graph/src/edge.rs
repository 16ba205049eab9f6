//! Edge types for the code graph.
//!
//! Edges are identified by their endpoints and kind only. They carry no
//! properties, so two edges with the same source, target and kind are
//! the same logical relationship.

use grove_core::{NodeId, NodeKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage id of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

/// The type of relationship between two code entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    /// Method A calls method B.
    Call,

    /// Interface A is implemented by class B, or method A is overridden
    /// by method B.
    Implement,

    /// A references type B (field, parameter, annotation, handler).
    Use,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 3] = [EdgeKind::Call, EdgeKind::Implement, EdgeKind::Use];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "CALL",
            Self::Implement => "IMPLEMENT",
            Self::Use => "USE",
        }
    }

    /// Parses a relationship name as written in filters (`CALL`, `use`, ...).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "CALL" => Some(Self::Call),
            "IMPLEMENT" => Some(Self::Implement),
            "USE" => Some(Self::Use),
            _ => None,
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An edge as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
}

/// An edge described by business keys on both ends.
///
/// This is how edges are remembered across node replacement, where the
/// storage ids of one endpoint change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyedEdge {
    pub source: NodeKey,
    pub target: NodeKey,
    pub kind: EdgeKind,
}
