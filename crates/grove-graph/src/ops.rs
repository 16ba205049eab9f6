//! Graph mutations as data.
//!
//! The generator emits `Operation` values and the executor applies them.
//! Every value an operation touches is a typed field; nothing is rendered
//! into query text.

use crate::edge::{EdgeKind, KeyedEdge};
use crate::fallback::{first_match, BranchCandidate};
use crate::store::{GraphStore, StoreError};
use grove_core::{GraphNode, IdentityKey, NodeKey, NodeRecord};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// How an edge endpoint is matched inside one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selector {
    /// Exact, NULL-aware identity match.
    Key(IdentityKey),
    /// Any method node with this method name, whatever its class.
    MethodName(String),
}

/// A selector plus the branches to try, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub selector: Selector,
    pub branches: Vec<BranchCandidate>,
}

impl Endpoint {
    pub fn new(selector: Selector, branches: Vec<BranchCandidate>) -> Self {
        Self { selector, branches }
    }

    /// Live nodes in the first candidate branch that has any.
    fn resolve(
        &self,
        store: &dyn GraphStore,
        project_id: &str,
    ) -> Result<Vec<GraphNode>, StoreError> {
        let hit = first_match(&self.branches, |branch| {
            let nodes = match &self.selector {
                Selector::Key(key) => store.nodes_at(project_id, branch, key)?,
                Selector::MethodName(name) => {
                    store.nodes_by_method_name(project_id, branch, name)?
                }
            };
            Ok::<_, StoreError>(
                nodes
                    .into_iter()
                    .filter(|n| !n.record.is_tombstone())
                    .collect(),
            )
        })?;
        Ok(hit.map(|(_, nodes)| nodes).unwrap_or_default())
    }
}

/// One mutation of the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Detach-delete the nodes at a key. PR-scoped nodes survive unless they
    /// belong to `pull_request_id`.
    DeleteNodes {
        project_id: String,
        branch: String,
        identity: IdentityKey,
        pull_request_id: Option<String>,
    },
    CreateNode { record: NodeRecord },
    CreateTombstone { record: NodeRecord },
    /// Connect every source match to every target match, skipping pairs that
    /// are already connected by an edge of the same kind.
    CreateEdge {
        project_id: String,
        kind: EdgeKind,
        source: Endpoint,
        target: Endpoint,
    },
    /// Recreate a remembered edge by business key. Missing endpoints are
    /// skipped.
    RestoreEdge { edge: KeyedEdge },
}

/// Counts produced by applying operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpOutcome {
    pub nodes_deleted: usize,
    pub nodes_created: usize,
    pub tombstones_created: usize,
    pub edges_created: usize,
    pub edges_restored: usize,
    pub edges_skipped: usize,
}

impl AddAssign for OpOutcome {
    fn add_assign(&mut self, other: Self) {
        self.nodes_deleted += other.nodes_deleted;
        self.nodes_created += other.nodes_created;
        self.tombstones_created += other.tombstones_created;
        self.edges_created += other.edges_created;
        self.edges_restored += other.edges_restored;
        self.edges_skipped += other.edges_skipped;
    }
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::DeleteNodes { .. } => "delete_nodes",
            Operation::CreateNode { .. } => "create_node",
            Operation::CreateTombstone { .. } => "create_tombstone",
            Operation::CreateEdge { .. } => "create_edge",
            Operation::RestoreEdge { .. } => "restore_edge",
        }
    }

    pub fn is_edge_op(&self) -> bool {
        matches!(
            self,
            Operation::CreateEdge { .. } | Operation::RestoreEdge { .. }
        )
    }

    /// Applies the operation.
    ///
    /// Re-applying any operation after a partial failure is safe: deletes
    /// and merges are idempotent, and duplicates left by a repeated create
    /// are removed by the dedup passes.
    pub fn apply(&self, store: &dyn GraphStore) -> Result<OpOutcome, StoreError> {
        let mut outcome = OpOutcome::default();
        match self {
            Operation::DeleteNodes {
                project_id,
                branch,
                identity,
                pull_request_id,
            } => {
                for node in store.nodes_at(project_id, branch, identity)? {
                    let owned = match &node.record.pull_request_id {
                        None => true,
                        Some(pr) => pull_request_id.as_ref() == Some(pr),
                    };
                    if owned && store.delete_node(node.id)? {
                        outcome.nodes_deleted += 1;
                    }
                }
            }
            Operation::CreateNode { record } => {
                store.create_node(record)?;
                outcome.nodes_created += 1;
            }
            Operation::CreateTombstone { record } => {
                store.create_node(record)?;
                outcome.tombstones_created += 1;
            }
            Operation::CreateEdge {
                project_id,
                kind,
                source,
                target,
            } => {
                let sources = source.resolve(store, project_id)?;
                if sources.is_empty() {
                    outcome.edges_skipped += 1;
                    return Ok(outcome);
                }
                let targets = target.resolve(store, project_id)?;
                if targets.is_empty() {
                    outcome.edges_skipped += 1;
                    return Ok(outcome);
                }
                for s in &sources {
                    let existing = store.outgoing(s.id)?;
                    for t in &targets {
                        let present = existing
                            .iter()
                            .any(|e| e.target == t.id && e.kind == *kind);
                        if !present {
                            store.create_edge(s.id, t.id, *kind)?;
                            outcome.edges_created += 1;
                        }
                    }
                }
            }
            Operation::RestoreEdge { edge } => {
                let source = live_node(store, &edge.source)?;
                let target = live_node(store, &edge.target)?;
                match (source, target) {
                    (Some(s), Some(t)) => {
                        store.create_edge(s.id, t.id, edge.kind)?;
                        outcome.edges_restored += 1;
                    }
                    _ => outcome.edges_skipped += 1,
                }
            }
        }
        Ok(outcome)
    }
}

/// The oldest live, non-PR node at a business key.
pub(crate) fn live_node(
    store: &dyn GraphStore,
    key: &NodeKey,
) -> Result<Option<GraphNode>, StoreError> {
    Ok(store
        .nodes_at(&key.project_id, &key.branch, &key.identity)?
        .into_iter()
        .filter(|n| !n.record.is_pr_scoped() && !n.record.is_tombstone())
        .min_by_key(|n| n.id))
}
