//! Keeping edges alive across node replacement.
//!
//! Replacing a node drops every edge touching it, including edges from
//! neighbors that were not re-analyzed. Those boundary edges are recorded by
//! business key before the replacement and recreated afterwards. The saved
//! set is journaled in the store until the run completes, so re-running an
//! interrupted import still restores it. Because the fresh edge pass can
//! recreate the same relationships, the run ends with an edge dedup.

use crate::context::SyncContext;
use crate::edge::{EdgeId, EdgeKind, KeyedEdge};
use crate::ops::Operation;
use crate::store::{GraphStore, StoreError};
use grove_core::{GraphNode, IdentityKey, NodeId, NodeKey};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Edges with exactly one endpoint among the replaced nodes.
///
/// `changed` holds identities in the current branch. The other endpoint may
/// live in any branch; PR-scoped neighbors are left out because a restore
/// can only re-resolve non-PR nodes.
pub fn save_boundary_edges(
    store: &dyn GraphStore,
    ctx: &SyncContext,
    changed: &HashSet<IdentityKey>,
) -> Result<Vec<KeyedEdge>, StoreError> {
    let is_changed =
        |node: &GraphNode| node.branch() == ctx.branch && changed.contains(&node.identity());

    let mut saved: Vec<KeyedEdge> = Vec::new();
    let mut seen: HashSet<KeyedEdge> = HashSet::new();
    let mut neighbors: HashMap<NodeId, Option<GraphNode>> = HashMap::new();

    for identity in changed {
        for node in store.nodes_at(&ctx.project_id, &ctx.branch, identity)? {
            if node.record.is_pr_scoped() {
                continue;
            }
            let outgoing = store.outgoing(node.id)?.into_iter().map(|e| (e, true));
            let incoming = store.incoming(node.id)?.into_iter().map(|e| (e, false));
            for (edge, out) in outgoing.chain(incoming) {
                let other_id = if out { edge.target } else { edge.source };
                if !neighbors.contains_key(&other_id) {
                    neighbors.insert(other_id, store.node(other_id)?);
                }
                let Some(other) = neighbors.get(&other_id).and_then(Option::as_ref) else {
                    continue;
                };
                if is_changed(other) || other.record.is_pr_scoped() {
                    continue;
                }
                let (source, target) = if out {
                    (node.key(), other.key())
                } else {
                    (other.key(), node.key())
                };
                let keyed = KeyedEdge {
                    source,
                    target,
                    kind: edge.kind,
                };
                if seen.insert(keyed.clone()) {
                    saved.push(keyed);
                }
            }
        }
    }

    debug!(
        "Saved {} boundary edges around {} changed identities",
        saved.len(),
        changed.len()
    );
    Ok(saved)
}

/// Boundary edges left over from an interrupted run followed by the ones
/// saved now, without repeats.
pub(crate) fn merge_pending(pending: Vec<KeyedEdge>, fresh: Vec<KeyedEdge>) -> Vec<KeyedEdge> {
    let mut seen: HashSet<KeyedEdge> = HashSet::new();
    pending
        .into_iter()
        .chain(fresh)
        .filter(|edge| seen.insert(edge.clone()))
        .collect()
}

pub fn restore_ops(saved: Vec<KeyedEdge>) -> Vec<Operation> {
    saved
        .into_iter()
        .map(|edge| Operation::RestoreEdge { edge })
        .collect()
}

/// Removes duplicate edges leaving nodes of a branch. Edges are grouped by
/// (source key, target key, kind); the oldest edge of each group is kept.
/// Returns the number of edges deleted.
pub fn deduplicate_edges(
    store: &dyn GraphStore,
    project_id: &str,
    branch: &str,
) -> Result<usize, StoreError> {
    let mut keys: HashMap<NodeId, Option<NodeKey>> = HashMap::new();
    let mut groups: BTreeMap<(NodeKey, NodeKey, EdgeKind), Vec<EdgeId>> = BTreeMap::new();

    for node in store.branch_nodes(project_id, branch)? {
        let source_key = node.key();
        for edge in store.outgoing(node.id)? {
            if !keys.contains_key(&edge.target) {
                let key = store.node(edge.target)?.map(|n| n.key());
                keys.insert(edge.target, key);
            }
            let Some(Some(target_key)) = keys.get(&edge.target) else {
                continue;
            };
            groups
                .entry((source_key.clone(), target_key.clone(), edge.kind))
                .or_default()
                .push(edge.id);
        }
    }

    let mut removed = 0;
    for ((source, target, kind), mut ids) in groups {
        if ids.len() < 2 {
            continue;
        }
        ids.sort();
        warn!(
            "Removing {} duplicate {} edges {} -> {}",
            ids.len() - 1,
            kind,
            source,
            target
        );
        for id in &ids[1..] {
            if store.delete_edge(*id)? {
                removed += 1;
            }
        }
    }
    Ok(removed)
}
