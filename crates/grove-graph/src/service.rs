//! The synchronization service and its entry points.

use crate::cloner::{deduplicate_nodes, BranchCloner, CloneExclusions, CloneReport};
use crate::config::SyncConfig;
use crate::context::SyncContext;
use crate::detector::{ChangeDetector, Verdict, Verdicts};
use crate::error::{ConfigError, Phase, Result, SyncError};
use crate::executor::BatchExecutor;
use crate::generator::MutationGenerator;
use crate::ops::OpOutcome;
use crate::preserve::{deduplicate_edges, merge_pending, restore_ops, save_boundary_edges};
use crate::query::{self, NodeFilter};
use crate::store::{GraphStore, SledGraphStore, StoreStats};
use crate::tombstone::tombstone_ops;
use crate::traversal::{self, Traversal, TraversalOptions};
use grove_core::{ClassFact, DeletedFact, GraphNode, IdentityKey, UNKNOWN_VERSION};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

/// One import call: the facts of a `(project, branch)` partition and how to
/// compare them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportRequest {
    pub project_id: String,
    pub branch: String,
    pub facts: Vec<ClassFact>,
    pub deleted: Vec<DeletedFact>,
    /// Overrides the configured batch size.
    pub batch_size: Option<usize>,
    pub main_branch: Option<String>,
    pub base_branch: Option<String>,
    pub pull_request_id: Option<String>,
    pub version: Option<String>,
    pub base_version: Option<String>,
}

impl ImportRequest {
    pub fn new(
        project_id: impl Into<String>,
        branch: impl Into<String>,
        facts: Vec<ClassFact>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            branch: branch.into(),
            facts,
            ..Self::default()
        }
    }

    pub fn with_deleted(mut self, deleted: Vec<DeletedFact>) -> Self {
        self.deleted = deleted;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn with_main(mut self, branch: impl Into<String>) -> Self {
        self.main_branch = Some(branch.into());
        self
    }

    pub fn with_base(mut self, branch: impl Into<String>) -> Self {
        self.base_branch = Some(branch.into());
        self
    }

    pub fn with_pull_request(mut self, id: impl Into<String>) -> Self {
        self.pull_request_id = Some(id.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_base_version(mut self, version: impl Into<String>) -> Self {
        self.base_version = Some(version.into());
        self
    }

    fn context(&self, default_base: bool) -> SyncContext {
        let mut ctx = SyncContext::new(&self.project_id, &self.branch);
        ctx.main_branch = self.main_branch.clone();
        ctx.base_branch = match (&self.base_branch, &self.main_branch) {
            (Some(base), _) => Some(base.clone()),
            (None, None) if default_base => Some(self.branch.clone()),
            _ => None,
        };
        ctx.pull_request_id = self.pull_request_id.clone();
        ctx.version = self
            .version
            .clone()
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        ctx.base_version = self.base_version.clone();
        ctx
    }

    fn is_empty(&self) -> bool {
        self.facts.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    Preserving,
    Simple,
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportMode::Preserving => write!(f, "preserving"),
            ImportMode::Simple => write!(f, "simple"),
        }
    }
}

/// Counts from one import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub mode: ImportMode,
    /// Class facts accepted.
    pub imported: usize,
    pub batches: usize,
    pub unchanged: usize,
    pub nodes_deleted: usize,
    pub nodes_created: usize,
    pub tombstones: usize,
    /// Boundary edges queued for restore, including any journaled by an
    /// earlier interrupted run.
    pub edges_saved: usize,
    pub edges_restored: usize,
    pub edges_created: usize,
    pub duplicate_edges_removed: usize,
}

impl ImportReport {
    fn empty(mode: ImportMode) -> Self {
        Self {
            mode,
            imported: 0,
            batches: 0,
            unchanged: 0,
            nodes_deleted: 0,
            nodes_created: 0,
            tombstones: 0,
            edges_saved: 0,
            edges_restored: 0,
            edges_created: 0,
            duplicate_edges_removed: 0,
        }
    }

    fn absorb(&mut self, outcome: OpOutcome) {
        self.nodes_deleted += outcome.nodes_deleted;
        self.nodes_created += outcome.nodes_created;
        self.tombstones += outcome.tombstones_created;
        self.edges_restored += outcome.edges_restored;
        self.edges_created += outcome.edges_created;
    }
}

/// Synchronizes code facts into a graph store.
///
/// Owns its store handle. `GraphSync::open` opens a sled store from a
/// configuration and `close` flushes and releases it.
pub struct GraphSync<S: GraphStore = SledGraphStore> {
    store: S,
    config: SyncConfig,
    executor: BatchExecutor,
}

impl GraphSync<SledGraphStore> {
    pub fn open(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        let path = config
            .store_path
            .clone()
            .ok_or(ConfigError::MissingStorePath)?;
        let store = SledGraphStore::open(&path)?;
        info!("Opened graph store at {}", path.display());
        Ok(Self::with_store(store, config))
    }

    pub fn close(self) -> Result<()> {
        self.store.close()?;
        Ok(())
    }
}

impl<S: GraphStore> GraphSync<S> {
    pub fn with_store(store: S, config: SyncConfig) -> Self {
        let executor = BatchExecutor::new(config.max_attempts, config.retry_delay());
        Self {
            store,
            config,
            executor,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Imports facts while keeping edges from untouched neighbors.
    ///
    /// With neither base nor main given the branch is compared against
    /// itself, so only facts whose hash changed are replaced. Re-running
    /// the same request after a failure is safe.
    pub fn import_facts(&self, request: &ImportRequest) -> Result<ImportReport> {
        let mut report = ImportReport::empty(ImportMode::Preserving);
        let Some(plan) = self.prepare(request, true)? else {
            return Ok(report);
        };
        let started = Instant::now();
        let store: &dyn GraphStore = &self.store;
        let ctx = &plan.ctx;
        info!(
            "Importing {} facts into {}@{} (base {:?}, main {:?})",
            request.facts.len(),
            ctx.project_id,
            ctx.branch,
            ctx.base_branch,
            ctx.main_branch
        );

        let mut changed: HashSet<IdentityKey> =
            MutationGenerator::replaced_keys(&request.facts, &plan.verdicts)
                .into_iter()
                .collect();
        changed.extend(request.deleted.iter().map(DeletedFact::identity));

        let pending = self.executor.run(Phase::Restore, 0, || {
            store.pending_edges(&ctx.project_id, &ctx.branch)
        })?;
        if !pending.is_empty() {
            info!(
                "Resuming interrupted import: {} boundary edges still pending",
                pending.len()
            );
        }
        let fresh = self
            .executor
            .run(Phase::Restore, 0, || save_boundary_edges(store, ctx, &changed))?;
        let saved = merge_pending(pending, fresh);
        self.executor.run(Phase::Restore, 0, || {
            store.put_pending_edges(&ctx.project_id, &ctx.branch, &saved)
        })?;
        report.edges_saved = saved.len();

        self.node_phase(&plan, request, &mut report)?;

        let outcome = self
            .executor
            .execute(store, &restore_ops(saved), Phase::Restore, 0)?;
        report.absorb(outcome);
        debug!(
            "Restored {} of {} boundary edges",
            outcome.edges_restored, report.edges_saved
        );

        self.edge_phase(&plan, request, &mut report)?;

        report.duplicate_edges_removed = self.executor.run(Phase::Edges, plan.batch_count, || {
            deduplicate_edges(store, &ctx.project_id, &ctx.branch)
        })?;
        self.executor.run(Phase::Edges, plan.batch_count, || {
            store.clear_pending_edges(&ctx.project_id, &ctx.branch)
        })?;

        info!(
            "Imported {} facts in {:?}: {} created, {} unchanged, {} restored, {} new edges, {} duplicates removed",
            report.imported,
            started.elapsed(),
            report.nodes_created,
            report.unchanged,
            report.edges_restored,
            report.edges_created,
            report.duplicate_edges_removed
        );
        Ok(report)
    }

    /// Imports facts without preserving edges of replaced nodes. Meant for
    /// a first import or a full rebuild.
    pub fn import_facts_simple(&self, request: &ImportRequest) -> Result<ImportReport> {
        let mut report = ImportReport::empty(ImportMode::Simple);
        let Some(plan) = self.prepare(request, false)? else {
            return Ok(report);
        };
        info!(
            "Importing {} facts into {}@{} without preservation",
            request.facts.len(),
            plan.ctx.project_id,
            plan.ctx.branch
        );
        self.node_phase(&plan, request, &mut report)?;
        self.edge_phase(&plan, request, &mut report)?;
        info!(
            "Imported {} facts: {} nodes created, {} edges created",
            report.imported, report.nodes_created, report.edges_created
        );
        Ok(report)
    }

    /// Forks `source` into `target`, leaving out `exclusions`.
    pub fn clone_branch(
        &self,
        project_id: &str,
        source: &str,
        target: &str,
        exclusions: &CloneExclusions,
        page_size: Option<usize>,
    ) -> Result<CloneReport> {
        let page_size = page_size.unwrap_or(self.config.clone_page_size);
        BranchCloner::new(&self.store, &self.executor, project_id, source, target)
            .with_page_size(page_size)
            .run(exclusions)
    }

    /// Deletes every node of a branch, or only those of one pull request.
    pub fn delete_branch(
        &self,
        project_id: &str,
        branch: &str,
        pull_request_id: Option<&str>,
    ) -> Result<usize> {
        let mut deleted = 0;
        for node in self.store.branch_nodes(project_id, branch)? {
            let matches = match pull_request_id {
                Some(pr) => node.record.pull_request_id.as_deref() == Some(pr),
                None => true,
            };
            if matches && self.store.delete_node(node.id)? {
                deleted += 1;
            }
        }
        info!("Deleted {} nodes from {}@{}", deleted, project_id, branch);
        Ok(deleted)
    }

    /// Collapses duplicate identities in a branch.
    pub fn deduplicate_nodes(&self, project_id: &str, branch: &str) -> Result<usize> {
        Ok(deduplicate_nodes(&self.store, project_id, branch)?)
    }

    pub fn nodes_by_keys(
        &self,
        project_id: &str,
        branch: &str,
        keys: &[IdentityKey],
        pull_request_id: Option<&str>,
    ) -> Result<Vec<GraphNode>> {
        Ok(query::nodes_by_keys(
            &self.store,
            project_id,
            branch,
            keys,
            pull_request_id,
        )?)
    }

    pub fn find_nodes(&self, filter: &NodeFilter) -> Result<Vec<GraphNode>> {
        Ok(query::find_nodes(&self.store, filter)?)
    }

    pub fn configuration_nodes(&self, project_id: &str, branch: &str) -> Result<Vec<GraphNode>> {
        Ok(query::configuration_nodes(&self.store, project_id, branch)?)
    }

    pub fn traverse(&self, start: &GraphNode, options: &TraversalOptions) -> Result<Traversal> {
        Ok(traversal::traverse(&self.store, start, options)?)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        Ok(self.store.stats()?)
    }

    /// Validates the request and classifies its facts. `None` means there
    /// is nothing to do.
    fn prepare(&self, request: &ImportRequest, default_base: bool) -> Result<Option<Plan>> {
        if request.is_empty() {
            debug!("Empty import request, nothing to do");
            return Ok(None);
        }
        for fact in &request.facts {
            fact.validate()?;
            if fact.project_id != request.project_id || fact.branch != request.branch {
                return Err(SyncError::MixedPartition {
                    class: fact.full_class_name.clone(),
                    expected: format!("{}@{}", request.project_id, request.branch),
                    found: format!("{}@{}", fact.project_id, fact.branch),
                });
            }
        }
        let batch_size = request.batch_size.unwrap_or(self.config.batch_size).max(1);
        let ctx = request.context(default_base);
        let verdicts = self.executor.run(Phase::Nodes, 0, || {
            ChangeDetector::new(&self.store, &ctx).classify_all(&request.facts)
        })?;
        let batch_count = request.facts.len().div_ceil(batch_size);
        Ok(Some(Plan {
            ctx,
            verdicts,
            batch_size,
            batch_count,
        }))
    }

    fn node_phase(
        &self,
        plan: &Plan,
        request: &ImportRequest,
        report: &mut ImportReport,
    ) -> Result<()> {
        let generator = MutationGenerator::new(&plan.ctx);
        if !request.deleted.is_empty() {
            let ops = tombstone_ops(&request.deleted, &plan.ctx);
            report.absorb(self.executor.execute(&self.store, &ops, Phase::Tombstones, 0)?);
        }
        for (index, batch) in request.facts.chunks(plan.batch_size).enumerate() {
            let ops = generator.node_phase(batch, &plan.verdicts);
            report.absorb(self.executor.execute(&self.store, &ops, Phase::Nodes, index)?);
        }
        report.imported = request.facts.len();
        report.batches = plan.batch_count;
        report.unchanged = plan.verdicts.count(Verdict::Unchanged);
        Ok(())
    }

    fn edge_phase(
        &self,
        plan: &Plan,
        request: &ImportRequest,
        report: &mut ImportReport,
    ) -> Result<()> {
        let generator = MutationGenerator::new(&plan.ctx);
        for (index, batch) in request.facts.chunks(plan.batch_size).enumerate() {
            let ops = generator.edge_phase(batch);
            report.absorb(self.executor.execute(&self.store, &ops, Phase::Edges, index)?);
        }
        Ok(())
    }
}

struct Plan {
    ctx: SyncContext,
    verdicts: Verdicts,
    batch_size: usize,
    batch_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::{MethodFact, NodeStatus};

    fn sync() -> GraphSync<SledGraphStore> {
        let config = SyncConfig::default().with_retry_delay(std::time::Duration::ZERO);
        GraphSync::with_store(SledGraphStore::open_temporary().unwrap(), config)
    }

    #[test]
    fn test_empty_request_is_a_no_op() {
        let sync = sync();
        let report = sync
            .import_facts(&ImportRequest::new("1", "main", vec![]))
            .unwrap();
        assert_eq!(report, ImportReport::empty(ImportMode::Preserving));
        assert_eq!(sync.stats().unwrap().node_count, 0);
    }

    #[test]
    fn test_mixed_partition_rejected() {
        let sync = sync();
        let facts = vec![ClassFact::new("1", "other", "a.Foo", "h")];
        let err = sync
            .import_facts_simple(&ImportRequest::new("1", "main", facts))
            .unwrap_err();
        assert!(matches!(err, SyncError::MixedPartition { .. }));
    }

    #[test]
    fn test_open_requires_store_path() {
        let err = GraphSync::open(SyncConfig::default()).err().unwrap();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_open_close_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig::for_root(dir.path());
        let sync = GraphSync::open(config.clone()).unwrap();
        let facts = vec![ClassFact::new("1", "main", "a.Foo", "h")];
        sync.import_facts_simple(&ImportRequest::new("1", "main", facts))
            .unwrap();
        sync.close().unwrap();

        let sync = GraphSync::open(config).unwrap();
        assert_eq!(sync.stats().unwrap().node_count, 1);
    }

    #[test]
    fn test_version_defaults_to_unknown() {
        let sync = sync();
        let facts = vec![ClassFact::new("1", "main", "a.Foo", "h")];
        sync.import_facts_simple(&ImportRequest::new("1", "main", facts))
            .unwrap();
        let nodes = sync
            .nodes_by_keys("1", "main", &[IdentityKey::class("a.Foo")], None)
            .unwrap();
        assert_eq!(nodes[0].record.version, UNKNOWN_VERSION);
    }

    #[test]
    fn test_delete_branch_by_pull_request() {
        let sync = sync();
        let shared = vec![ClassFact::new("1", "feature", "a.Shared", "h")];
        sync.import_facts_simple(&ImportRequest::new("1", "feature", shared))
            .unwrap();
        let scoped = vec![ClassFact::new("1", "feature", "a.Scoped", "h")
            .with_method(MethodFact::new("run()", "h2"))];
        sync.import_facts_simple(
            &ImportRequest::new("1", "feature", scoped)
                .with_main("main")
                .with_pull_request("77"),
        )
        .unwrap();

        assert_eq!(sync.delete_branch("1", "feature", Some("77")).unwrap(), 2);
        assert_eq!(sync.delete_branch("1", "feature", None).unwrap(), 1);
        assert_eq!(sync.stats().unwrap().node_count, 0);
    }

    #[test]
    fn test_changed_status_comes_from_caller() {
        let sync = sync();
        let v1 = vec![ClassFact::new("1", "main", "a.Foo", "h1")];
        sync.import_facts_simple(&ImportRequest::new("1", "main", v1))
            .unwrap();

        let v2 = vec![ClassFact::new("1", "main", "a.Foo", "h2").with_status(NodeStatus::Modified)];
        let report = sync
            .import_facts(&ImportRequest::new("1", "main", v2))
            .unwrap();
        assert_eq!(report.nodes_created, 1);
        assert_eq!(report.nodes_deleted, 1);

        let nodes = sync
            .nodes_by_keys("1", "main", &[IdentityKey::class("a.Foo")], None)
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].record.status, NodeStatus::Modified);
    }
}
