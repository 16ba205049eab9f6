//! Copy-on-write branch forking.
//!
//! A clone copies a source branch into a target branch minus the identities
//! the caller is about to import fresh. Storage ids of copied nodes are
//! tracked in the `node_mappings` table for the duration of the clone so
//! edges can be re-pointed at the copies. The table is swept before and
//! after.

use crate::edge::EdgeKind;
use crate::error::{Phase, SyncError};
use crate::executor::BatchExecutor;
use crate::ops::live_node;
use crate::store::{GraphStore, NodeMapping, StoreError};
use grove_core::{ClassFact, GraphNode, IdentityKey, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Identities left out of a clone.
///
/// An exclusion may carry the hash the caller is about to import. A source
/// node with that same hash is copied anyway since it is not changing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneExclusions {
    keys: HashMap<IdentityKey, Option<String>>,
}

impl CloneExclusions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exclude(&mut self, key: IdentityKey) {
        self.keys.insert(key, None);
    }

    pub fn exclude_unless_hash(&mut self, key: IdentityKey, hash: impl Into<String>) {
        self.keys.insert(key, Some(hash.into()));
    }

    /// Excludes every class and method of the facts, keyed by their hashes.
    pub fn from_facts(facts: &[ClassFact]) -> Self {
        let mut exclusions = Self::new();
        for fact in facts {
            exclusions.exclude_unless_hash(fact.key(), fact.ast_hash.clone());
            for method in &fact.methods {
                let key = fact.method_key(method);
                match &method.ast_hash {
                    Some(hash) => exclusions.exclude_unless_hash(key, hash.clone()),
                    None => exclusions.exclude(key),
                }
            }
        }
        exclusions
    }

    pub fn excludes(&self, node: &GraphNode) -> bool {
        match self.keys.get(&node.identity()) {
            None => false,
            Some(None) => true,
            Some(Some(hash)) => node.ast_hash() != Some(hash.as_str()),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<IdentityKey> for CloneExclusions {
    fn from_iter<I: IntoIterator<Item = IdentityKey>>(iter: I) -> Self {
        let mut exclusions = Self::new();
        for key in iter {
            exclusions.exclude(key);
        }
        exclusions
    }
}

/// Counts from one clone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneReport {
    pub nodes_copied: usize,
    pub nodes_excluded: usize,
    pub internal_edges: usize,
    pub forward_edges: usize,
    pub overlay_edges: usize,
    pub reverse_edges: usize,
    pub duplicate_nodes_removed: usize,
    pub mappings_swept: usize,
}

impl CloneReport {
    pub fn edges_copied(&self) -> usize {
        self.internal_edges + self.forward_edges + self.overlay_edges + self.reverse_edges
    }

    fn add_edges(&mut self, other: &CloneReport) {
        self.internal_edges += other.internal_edges;
        self.forward_edges += other.forward_edges;
        self.overlay_edges += other.overlay_edges;
        self.reverse_edges += other.reverse_edges;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgePass {
    Internal,
    Forward,
    Reverse,
}

pub struct BranchCloner<'a> {
    store: &'a dyn GraphStore,
    executor: &'a BatchExecutor,
    project_id: &'a str,
    source: &'a str,
    target: &'a str,
    page_size: usize,
}

impl<'a> BranchCloner<'a> {
    pub fn new(
        store: &'a dyn GraphStore,
        executor: &'a BatchExecutor,
        project_id: &'a str,
        source: &'a str,
        target: &'a str,
    ) -> Self {
        Self {
            store,
            executor,
            project_id,
            source,
            target,
            page_size: 500,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn run(&self, exclusions: &CloneExclusions) -> Result<CloneReport, SyncError> {
        if self.source == self.target {
            return Err(SyncError::InvalidClone {
                project: self.project_id.to_string(),
                branch: self.target.to_string(),
            });
        }
        info!(
            "Cloning {}@{} into {} ({} exclusions)",
            self.project_id,
            self.source,
            self.target,
            exclusions.len()
        );
        let mut report = CloneReport::default();

        report.mappings_swept += self.sweep_mappings(true)?;
        self.copy_nodes(exclusions, &mut report)?;
        self.copy_edges(EdgePass::Internal, &mut report)?;
        self.copy_edges(EdgePass::Forward, &mut report)?;
        self.copy_edges(EdgePass::Reverse, &mut report)?;
        report.duplicate_nodes_removed = deduplicate_nodes(self.store, self.project_id, self.target)?;
        report.mappings_swept += self.sweep_mappings(false)?;

        info!(
            "Cloned {} nodes and {} edges into {}",
            report.nodes_copied,
            report.edges_copied(),
            self.target
        );
        Ok(report)
    }

    /// Deletes the target's mapping rows. With `orphans`, also deletes rows
    /// of any branch of the project whose nodes no longer exist.
    fn sweep_mappings(&self, orphans: bool) -> Result<usize, SyncError> {
        let mut swept = 0;
        for (branch, mapping) in self.store.project_mappings(self.project_id)? {
            let stale = if branch == self.target {
                true
            } else if orphans {
                self.store.node(mapping.old_id)?.is_none()
                    || self.store.node(mapping.new_id)?.is_none()
            } else {
                false
            };
            if stale && self.store.delete_mapping(self.project_id, &branch, mapping.old_id)? {
                swept += 1;
            }
        }
        if swept > 0 {
            debug!("Swept {} mapping rows", swept);
        }
        Ok(swept)
    }

    fn copy_nodes(
        &self,
        exclusions: &CloneExclusions,
        report: &mut CloneReport,
    ) -> Result<(), SyncError> {
        let mut after: Option<NodeId> = None;
        let mut page_index = 0;
        loop {
            let page = self.executor.run(Phase::CloneNodes, page_index, || {
                self.store
                    .scan_branch(self.project_id, self.source, after, self.page_size)
            })?;
            let Some(last) = page.last() else { break };
            after = Some(last.id);

            let (copied, excluded) = self.executor.run(Phase::CloneNodes, page_index, || {
                self.copy_page(&page, exclusions)
            })?;
            debug!("Clone node page {}: {} copied", page_index, copied);
            report.nodes_copied += copied;
            report.nodes_excluded += excluded;
            page_index += 1;
        }
        Ok(())
    }

    /// Copies the eligible nodes of one page. Nodes that already have a
    /// mapping were copied by an earlier attempt and are skipped.
    fn copy_page(
        &self,
        page: &[GraphNode],
        exclusions: &CloneExclusions,
    ) -> Result<(usize, usize), StoreError> {
        let mut copied = 0;
        let mut excluded = 0;
        for node in page {
            if node.record.is_pr_scoped() {
                continue;
            }
            if exclusions.excludes(node) {
                excluded += 1;
                continue;
            }
            if self
                .store
                .mapping(self.project_id, self.target, node.id)?
                .is_some()
            {
                continue;
            }
            let copy = self.store.create_node(&node.record.with_branch(self.target))?;
            self.store.put_mapping(
                self.project_id,
                self.target,
                NodeMapping {
                    old_id: node.id,
                    new_id: copy.id,
                },
            )?;
            copied += 1;
        }
        Ok((copied, excluded))
    }

    fn copy_edges(&self, pass: EdgePass, report: &mut CloneReport) -> Result<(), SyncError> {
        let mut after: Option<NodeId> = None;
        let mut page_index = 0;
        loop {
            let page = self.executor.run(Phase::CloneEdges, page_index, || {
                self.store
                    .scan_mappings(self.project_id, self.target, after, self.page_size)
            })?;
            let Some(last) = page.last() else { break };
            after = Some(last.old_id);

            for mapping in &page {
                let counts = self.executor.run(Phase::CloneEdges, page_index, || {
                    self.copy_mapped_edges(pass, mapping)
                })?;
                report.add_edges(&counts);
            }
            page_index += 1;
        }
        debug!("Clone edge pass {:?} done", pass);
        Ok(())
    }

    /// Copies the edges of one mapped node for a pass and returns the edge
    /// counts. A retried attempt counts from zero again.
    fn copy_mapped_edges(
        &self,
        pass: EdgePass,
        mapping: &NodeMapping,
    ) -> Result<CloneReport, StoreError> {
        let mut report = CloneReport::default();
        match pass {
            EdgePass::Internal | EdgePass::Forward => {
                for edge in self.store.outgoing(mapping.old_id)? {
                    let mapped = self.store.mapping(self.project_id, self.target, edge.target)?;
                    match (pass, mapped) {
                        (EdgePass::Internal, Some(new_target)) => {
                            self.connect(mapping.new_id, new_target, edge.kind)?;
                            report.internal_edges += 1;
                        }
                        (EdgePass::Forward, None) => {
                            let Some(target) = self.store.node(edge.target)? else {
                                continue;
                            };
                            if target.branch() != self.source {
                                // Overlay edge: keep pointing at the same node.
                                self.connect(mapping.new_id, target.id, edge.kind)?;
                                report.overlay_edges += 1;
                            } else if let Some(local) = self.resolve_in_target(&target)? {
                                self.connect(mapping.new_id, local.id, edge.kind)?;
                                report.forward_edges += 1;
                            }
                        }
                        _ => {}
                    }
                }
            }
            EdgePass::Reverse => {
                for edge in self.store.incoming(mapping.old_id)? {
                    if self
                        .store
                        .mapping(self.project_id, self.target, edge.source)?
                        .is_some()
                    {
                        continue;
                    }
                    let Some(source) = self.store.node(edge.source)? else {
                        continue;
                    };
                    if source.branch() != self.source {
                        continue;
                    }
                    if let Some(local) = self.resolve_in_target(&source)? {
                        self.connect(local.id, mapping.new_id, edge.kind)?;
                        report.reverse_edges += 1;
                    }
                }
            }
        }
        Ok(report)
    }

    /// The target-branch node with the same identity as a source node that
    /// was not copied.
    fn resolve_in_target(&self, node: &GraphNode) -> Result<Option<GraphNode>, StoreError> {
        if node.record.is_pr_scoped() {
            return Ok(None);
        }
        live_node(
            self.store,
            &node.identity().in_branch(self.project_id, self.target),
        )
    }

    /// Creates an edge unless an identical one exists, so a retried mapping
    /// does not double its edges.
    fn connect(
        &self,
        source: NodeId,
        target: NodeId,
        kind: EdgeKind,
    ) -> Result<(), StoreError> {
        let exists = self
            .store
            .outgoing(source)?
            .iter()
            .any(|e| e.target == target && e.kind == kind);
        if !exists {
            self.store.create_edge(source, target, kind)?;
        }
        Ok(())
    }
}

/// Collapses nodes sharing an identity in a branch, keeping the oldest.
/// PR-scoped nodes are left alone.
pub fn deduplicate_nodes(
    store: &dyn GraphStore,
    project_id: &str,
    branch: &str,
) -> Result<usize, StoreError> {
    let mut groups: BTreeMap<IdentityKey, Vec<NodeId>> = BTreeMap::new();
    for node in store.branch_nodes(project_id, branch)? {
        if node.record.is_pr_scoped() {
            continue;
        }
        groups.entry(node.identity()).or_default().push(node.id);
    }

    let mut removed = 0;
    for (identity, mut ids) in groups {
        if ids.len() < 2 {
            continue;
        }
        ids.sort();
        warn!(
            "Removing {} duplicate nodes for {} in {}",
            ids.len() - 1,
            identity,
            branch
        );
        for id in &ids[1..] {
            if store.delete_node(*id)? {
                removed += 1;
            }
        }
    }
    Ok(removed)
}
