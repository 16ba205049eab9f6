//! Content-addressed change detection.
//!
//! Each fact is compared against the node with the same identity in the
//! comparison branch (`base`, else `main`). Verdicts are always computed
//! against the graph as it was before the run writes anything.

use crate::context::SyncContext;
use crate::store::{GraphStore, StoreError};
use grove_core::{ClassFact, GraphNode, IdentityKey, NodeStatus};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Classification of one fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// No live node with this identity in the comparison branch.
    New,
    /// A node exists but its hash differs.
    Changed,
    /// A node exists with the same hash. Nothing is created.
    Unchanged,
    /// No comparison branch configured. Always recreated.
    Rebuild,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::New => "new",
            Verdict::Changed => "changed",
            Verdict::Unchanged => "unchanged",
            Verdict::Rebuild => "rebuild",
        }
    }

    pub fn creates_node(&self) -> bool {
        !matches!(self, Verdict::Unchanged)
    }

    /// Status for the created node. New nodes are always active; otherwise
    /// the caller's classification is used.
    pub fn status(&self, supplied: Option<NodeStatus>) -> NodeStatus {
        match self {
            Verdict::New => NodeStatus::Active,
            _ => supplied.unwrap_or_default(),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Verdicts for every identity in a run.
#[derive(Debug, Clone, Default)]
pub struct Verdicts {
    by_key: HashMap<IdentityKey, Verdict>,
    in_place: bool,
}

impl Verdicts {
    /// Verdict for `key`. Identities that were never classified are rebuilt.
    pub fn get(&self, key: &IdentityKey) -> Verdict {
        self.by_key.get(key).copied().unwrap_or(Verdict::Rebuild)
    }

    pub fn insert(&mut self, key: IdentityKey, verdict: Verdict) {
        self.by_key.insert(key, verdict);
    }

    /// Whether the current-branch node at `key` is deleted by the node phase.
    ///
    /// An unchanged verdict against the branch being written keeps the node.
    /// Against any other branch the current-branch node is stale and goes.
    pub fn replaces_current(&self, key: &IdentityKey) -> bool {
        self.get(key).creates_node() || !self.in_place
    }

    pub fn count(&self, verdict: Verdict) -> usize {
        self.by_key.values().filter(|v| **v == verdict).count()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Compares facts against a comparison branch.
pub struct ChangeDetector<'a> {
    store: &'a dyn GraphStore,
    project_id: &'a str,
    comparison: Option<&'a str>,
    in_place: bool,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(store: &'a dyn GraphStore, ctx: &'a SyncContext) -> Self {
        Self {
            store,
            project_id: &ctx.project_id,
            comparison: ctx.comparison_branch(),
            in_place: ctx.compares_in_place(),
        }
    }

    /// Classifies one identity given the hash the fact carries.
    ///
    /// A fact without a hash cannot be compared and counts as changed.
    pub fn classify(
        &self,
        identity: &IdentityKey,
        ast_hash: Option<&str>,
    ) -> Result<Verdict, StoreError> {
        let Some(branch) = self.comparison else {
            return Ok(Verdict::Rebuild);
        };
        let existing = self.existing(branch, identity)?;
        let verdict = match existing {
            None => Verdict::New,
            Some(node) if node.record.is_tombstone() => Verdict::New,
            Some(node) => match ast_hash {
                Some(hash) if node.ast_hash() == Some(hash) => Verdict::Unchanged,
                _ => Verdict::Changed,
            },
        };
        Ok(verdict)
    }

    /// Classifies every class and method in a batch.
    pub fn classify_all(&self, facts: &[ClassFact]) -> Result<Verdicts, StoreError> {
        let mut verdicts = Verdicts {
            by_key: HashMap::new(),
            in_place: self.in_place,
        };
        for fact in facts {
            let verdict = self.classify(&fact.key(), Some(&fact.ast_hash))?;
            verdicts.insert(fact.key(), verdict);
            for method in &fact.methods {
                let key = fact.method_key(method);
                let verdict = self.classify(&key, method.ast_hash.as_deref())?;
                verdicts.insert(key, verdict);
            }
        }
        debug!(
            "Classified {} identities against {:?}: {} new, {} changed, {} unchanged",
            verdicts.len(),
            self.comparison,
            verdicts.count(Verdict::New),
            verdicts.count(Verdict::Changed),
            verdicts.count(Verdict::Unchanged),
        );
        Ok(verdicts)
    }

    /// The non-PR node at `identity`. With duplicates present the oldest wins.
    fn existing(
        &self,
        branch: &str,
        identity: &IdentityKey,
    ) -> Result<Option<GraphNode>, StoreError> {
        let nodes = self.store.nodes_at(self.project_id, branch, identity)?;
        Ok(nodes
            .into_iter()
            .filter(|n| !n.record.is_pr_scoped())
            .min_by_key(|n| n.id))
    }
}
