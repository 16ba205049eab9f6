//! Tombstones for removed code.
//!
//! A tombstone takes the identity slot of the removed element with status
//! `DELETED`. Re-creating the same identity later is an ordinary new fact.

use crate::context::SyncContext;
use crate::ops::Operation;
use grove_core::{DeletedFact, NodeRecord, NodeStatus};
use std::collections::BTreeMap;

/// Content marker written on tombstones.
pub const TOMBSTONE_PREFIX: &str = "[DELETED]";

/// The node recorded for one deletion.
pub fn tombstone_record(deleted: &DeletedFact, ctx: &SyncContext) -> NodeRecord {
    let identity = deleted.identity();
    NodeRecord {
        label: deleted.label(),
        name: deleted.name(),
        class_name: identity.class_name.clone(),
        method_name: identity.method_name.clone(),
        file_path: deleted.file_path.clone().unwrap_or_default(),
        content: format!("{} {}", TOMBSTONE_PREFIX, identity),
        ast_hash: deleted.prior_ast_hash.clone(),
        project_id: ctx.project_id.clone(),
        branch: ctx.branch.clone(),
        version: ctx.version.clone(),
        status: NodeStatus::Deleted,
        base_branch: ctx.base_branch.clone(),
        base_version: ctx.base_version.clone(),
        pull_request_id: None,
        endpoint: BTreeMap::new(),
    }
}

/// Replaces whatever occupies each deleted identity with a tombstone.
pub fn tombstone_ops(deleted: &[DeletedFact], ctx: &SyncContext) -> Vec<Operation> {
    deleted
        .iter()
        .flat_map(|fact| {
            [
                Operation::DeleteNodes {
                    project_id: ctx.project_id.clone(),
                    branch: ctx.branch.clone(),
                    identity: fact.identity(),
                    pull_request_id: ctx.pr_scope().map(str::to_string),
                },
                Operation::CreateTombstone {
                    record: tombstone_record(fact, ctx),
                },
            ]
        })
        .collect()
}
