//! Persisted graph storage.
//!
//! `GraphStore` is the seam between the synchronization engine and the
//! database holding the property graph. The engine only needs NULL-aware
//! key lookups, method-name lookups, branch scans, detach-delete, plain edge
//! creation, a scratch table for clone id remapping and a journal of boundary
//! edges waiting to be restored.
//!
//! `SledGraphStore` implements it on an embedded sled database. Records are
//! bincode-encoded; see `keys` for the index layout.

use crate::edge::{EdgeId, EdgeKind, GraphEdge, KeyedEdge};
use crate::keys;
use grove_core::{GraphNode, IdentityKey, NodeId, NodeRecord};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sled(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("Node {0} does not exist")]
    MissingNode(NodeId),
    #[error("Corrupt entry in tree '{0}'")]
    Corrupt(&'static str),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// One row of the clone scratch table: `old_id` in the source branch was
/// copied to `new_id` in `branch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMapping {
    pub old_id: NodeId,
    pub new_id: NodeId,
}

/// Row counts of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub mapping_count: usize,
}

/// Operations the synchronization engine performs against a graph database.
///
/// Lookups that can legitimately miss return `Option` or an empty `Vec`;
/// errors are reserved for the store itself failing.
pub trait GraphStore: Send + Sync {
    /// Creates a node and returns it with its new id.
    fn create_node(&self, record: &NodeRecord) -> Result<GraphNode, StoreError>;

    fn node(&self, id: NodeId) -> Result<Option<GraphNode>, StoreError>;

    /// Nodes whose `(class_name, method_name)` equals `identity` exactly.
    /// A class-level identity never matches method nodes.
    fn nodes_at(
        &self,
        project_id: &str,
        branch: &str,
        identity: &IdentityKey,
    ) -> Result<Vec<GraphNode>, StoreError>;

    /// Method-level nodes with the given method name, in any class.
    fn nodes_by_method_name(
        &self,
        project_id: &str,
        branch: &str,
        method_name: &str,
    ) -> Result<Vec<GraphNode>, StoreError>;

    /// One page of a branch's nodes, ordered by id, starting after `after`.
    fn scan_branch(
        &self,
        project_id: &str,
        branch: &str,
        after: Option<NodeId>,
        limit: usize,
    ) -> Result<Vec<GraphNode>, StoreError>;

    /// Deletes a node together with every edge touching it.
    /// Returns false when the node did not exist.
    fn delete_node(&self, id: NodeId) -> Result<bool, StoreError>;

    /// Creates an edge. Exact duplicates are allowed.
    fn create_edge(
        &self,
        source: NodeId,
        target: NodeId,
        kind: EdgeKind,
    ) -> Result<GraphEdge, StoreError>;

    fn delete_edge(&self, id: EdgeId) -> Result<bool, StoreError>;

    fn outgoing(&self, id: NodeId) -> Result<Vec<GraphEdge>, StoreError>;

    fn incoming(&self, id: NodeId) -> Result<Vec<GraphEdge>, StoreError>;

    fn put_mapping(
        &self,
        project_id: &str,
        branch: &str,
        mapping: NodeMapping,
    ) -> Result<(), StoreError>;

    fn mapping(
        &self,
        project_id: &str,
        branch: &str,
        old_id: NodeId,
    ) -> Result<Option<NodeId>, StoreError>;

    /// Mapping rows of one clone target, ordered by old id, after `after`.
    fn scan_mappings(
        &self,
        project_id: &str,
        branch: &str,
        after: Option<NodeId>,
        limit: usize,
    ) -> Result<Vec<NodeMapping>, StoreError>;

    /// Every mapping row of a project, with the branch it belongs to.
    fn project_mappings(&self, project_id: &str) -> Result<Vec<(String, NodeMapping)>, StoreError>;

    fn delete_mapping(
        &self,
        project_id: &str,
        branch: &str,
        old_id: NodeId,
    ) -> Result<bool, StoreError>;

    /// Replaces the boundary edges journaled for a partition.
    fn put_pending_edges(
        &self,
        project_id: &str,
        branch: &str,
        edges: &[KeyedEdge],
    ) -> Result<(), StoreError>;

    /// Boundary edges journaled by an import of the partition that has not
    /// completed.
    fn pending_edges(&self, project_id: &str, branch: &str) -> Result<Vec<KeyedEdge>, StoreError>;

    fn clear_pending_edges(&self, project_id: &str, branch: &str) -> Result<bool, StoreError>;

    fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Every node of a branch.
    fn branch_nodes(&self, project_id: &str, branch: &str) -> Result<Vec<GraphNode>, StoreError> {
        let mut all = Vec::new();
        let mut after = None;
        loop {
            let page = self.scan_branch(project_id, branch, after, 1024)?;
            match page.last() {
                Some(last) => after = Some(last.id),
                None => break,
            }
            all.extend(page);
        }
        Ok(all)
    }
}

/// sled-backed graph store.
pub struct SledGraphStore {
    db: Db,
    nodes: Tree,
    node_keys: Tree,
    method_index: Tree,
    branch_index: Tree,
    edges: Tree,
    out_edges: Tree,
    in_edges: Tree,
    mappings: Tree,
    pending_edges: Tree,
}

impl SledGraphStore {
    /// Opens or creates a graph store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Opens a store that is removed when dropped.
    pub fn open_temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        Ok(Self {
            nodes: db.open_tree("nodes")?,
            node_keys: db.open_tree("node_keys")?,
            method_index: db.open_tree("method_index")?,
            branch_index: db.open_tree("branch_index")?,
            edges: db.open_tree("edges")?,
            out_edges: db.open_tree("out_edges")?,
            in_edges: db.open_tree("in_edges")?,
            mappings: db.open_tree("node_mappings")?,
            pending_edges: db.open_tree("pending_edges")?,
            db,
        })
    }

    /// Flushes pending writes and releases the database.
    pub fn close(self) -> Result<(), StoreError> {
        let bytes = self.db.flush()?;
        debug!("Closed graph store ({} bytes flushed)", bytes);
        Ok(())
    }

    fn load_nodes(&self, ids: impl IntoIterator<Item = u64>) -> Result<Vec<GraphNode>, StoreError> {
        let mut nodes = Vec::new();
        for id in ids {
            if let Some(node) = self.node(NodeId(id))? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    fn ids_with_prefix(tree: &Tree, prefix: &[u8], name: &'static str) -> Result<Vec<u64>, StoreError> {
        let mut ids = Vec::new();
        for entry in tree.scan_prefix(prefix) {
            let (key, _) = entry?;
            ids.push(keys::trailing_id(&key).ok_or(StoreError::Corrupt(name))?);
        }
        Ok(ids)
    }

    fn load_edges(&self, adjacency: &Tree, node: NodeId, name: &'static str) -> Result<Vec<GraphEdge>, StoreError> {
        let mut edges = Vec::new();
        for edge_id in Self::ids_with_prefix(adjacency, &keys::id_bytes(node.0), name)? {
            if let Some(bytes) = self.edges.get(keys::id_bytes(edge_id))? {
                edges.push(bincode::deserialize(&bytes)?);
            }
        }
        Ok(edges)
    }

    fn index_entries(record: &NodeRecord, id: u64) -> Vec<(&'static str, Vec<u8>)> {
        let mut entries = vec![
            (
                "node_keys",
                keys::with_id(
                    keys::identity_prefix(&record.project_id, &record.branch, &record.identity()),
                    id,
                ),
            ),
            (
                "branch_index",
                keys::with_id(keys::branch_prefix(&record.project_id, &record.branch), id),
            ),
        ];
        if let Some(method) = &record.method_name {
            entries.push((
                "method_index",
                keys::with_id(keys::method_prefix(&record.project_id, &record.branch, method), id),
            ));
        }
        entries
    }

    fn index_tree(&self, name: &str) -> &Tree {
        match name {
            "node_keys" => &self.node_keys,
            "method_index" => &self.method_index,
            _ => &self.branch_index,
        }
    }
}

impl GraphStore for SledGraphStore {
    fn create_node(&self, record: &NodeRecord) -> Result<GraphNode, StoreError> {
        let id = self.db.generate_id()?;
        let node = GraphNode {
            id: NodeId(id),
            record: record.clone(),
        };
        // Record first, indexes second: an index entry always has a record.
        self.nodes
            .insert(keys::id_bytes(id), bincode::serialize(&node)?)?;
        for (tree, key) in Self::index_entries(record, id) {
            self.index_tree(tree).insert(key, &[] as &[u8])?;
        }
        Ok(node)
    }

    fn node(&self, id: NodeId) -> Result<Option<GraphNode>, StoreError> {
        match self.nodes.get(keys::id_bytes(id.0))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn nodes_at(
        &self,
        project_id: &str,
        branch: &str,
        identity: &IdentityKey,
    ) -> Result<Vec<GraphNode>, StoreError> {
        let prefix = keys::identity_prefix(project_id, branch, identity);
        let ids = Self::ids_with_prefix(&self.node_keys, &prefix, "node_keys")?;
        self.load_nodes(ids)
    }

    fn nodes_by_method_name(
        &self,
        project_id: &str,
        branch: &str,
        method_name: &str,
    ) -> Result<Vec<GraphNode>, StoreError> {
        let prefix = keys::method_prefix(project_id, branch, method_name);
        let ids = Self::ids_with_prefix(&self.method_index, &prefix, "method_index")?;
        self.load_nodes(ids)
    }

    fn scan_branch(
        &self,
        project_id: &str,
        branch: &str,
        after: Option<NodeId>,
        limit: usize,
    ) -> Result<Vec<GraphNode>, StoreError> {
        let prefix = keys::branch_prefix(project_id, branch);
        let start = match after {
            Some(id) => keys::with_id(prefix.clone(), id.0.saturating_add(1)),
            None => prefix.clone(),
        };
        let mut ids = Vec::new();
        for entry in self.branch_index.range(start..) {
            let (key, _) = entry?;
            if !key.starts_with(&prefix) || ids.len() >= limit {
                break;
            }
            ids.push(keys::trailing_id(&key).ok_or(StoreError::Corrupt("branch_index"))?);
        }
        self.load_nodes(ids)
    }

    fn delete_node(&self, id: NodeId) -> Result<bool, StoreError> {
        let node = match self.node(id)? {
            Some(node) => node,
            None => return Ok(false),
        };
        // Indexes first, so a half-finished delete leaves an unreachable
        // record rather than a dangling key.
        for (tree, key) in Self::index_entries(&node.record, id.0) {
            self.index_tree(tree).remove(key)?;
        }
        for edge in self.outgoing(id)?.into_iter().chain(self.incoming(id)?) {
            self.delete_edge(edge.id)?;
        }
        self.nodes.remove(keys::id_bytes(id.0))?;
        Ok(true)
    }

    fn create_edge(
        &self,
        source: NodeId,
        target: NodeId,
        kind: EdgeKind,
    ) -> Result<GraphEdge, StoreError> {
        for endpoint in [source, target] {
            if !self.nodes.contains_key(keys::id_bytes(endpoint.0))? {
                return Err(StoreError::MissingNode(endpoint));
            }
        }
        let id = self.db.generate_id()?;
        let edge = GraphEdge {
            id: EdgeId(id),
            source,
            target,
            kind,
        };
        self.edges
            .insert(keys::id_bytes(id), bincode::serialize(&edge)?)?;
        self.out_edges
            .insert(keys::adjacency_key(source, id), &[] as &[u8])?;
        self.in_edges
            .insert(keys::adjacency_key(target, id), &[] as &[u8])?;
        Ok(edge)
    }

    fn delete_edge(&self, id: EdgeId) -> Result<bool, StoreError> {
        let edge: GraphEdge = match self.edges.get(keys::id_bytes(id.0))? {
            Some(bytes) => bincode::deserialize(&bytes)?,
            None => return Ok(false),
        };
        self.out_edges
            .remove(keys::adjacency_key(edge.source, id.0))?;
        self.in_edges
            .remove(keys::adjacency_key(edge.target, id.0))?;
        self.edges.remove(keys::id_bytes(id.0))?;
        Ok(true)
    }

    fn outgoing(&self, id: NodeId) -> Result<Vec<GraphEdge>, StoreError> {
        self.load_edges(&self.out_edges, id, "out_edges")
    }

    fn incoming(&self, id: NodeId) -> Result<Vec<GraphEdge>, StoreError> {
        self.load_edges(&self.in_edges, id, "in_edges")
    }

    fn put_mapping(
        &self,
        project_id: &str,
        branch: &str,
        mapping: NodeMapping,
    ) -> Result<(), StoreError> {
        let key = keys::with_id(keys::branch_prefix(project_id, branch), mapping.old_id.0);
        self.mappings
            .insert(key, &keys::id_bytes(mapping.new_id.0)[..])?;
        Ok(())
    }

    fn mapping(
        &self,
        project_id: &str,
        branch: &str,
        old_id: NodeId,
    ) -> Result<Option<NodeId>, StoreError> {
        let key = keys::with_id(keys::branch_prefix(project_id, branch), old_id.0);
        match self.mappings.get(key)? {
            Some(value) => keys::id_value(&value)
                .map(|id| Some(NodeId(id)))
                .ok_or(StoreError::Corrupt("node_mappings")),
            None => Ok(None),
        }
    }

    fn scan_mappings(
        &self,
        project_id: &str,
        branch: &str,
        after: Option<NodeId>,
        limit: usize,
    ) -> Result<Vec<NodeMapping>, StoreError> {
        let prefix = keys::branch_prefix(project_id, branch);
        let start = match after {
            Some(id) => keys::with_id(prefix.clone(), id.0.saturating_add(1)),
            None => prefix.clone(),
        };
        let mut rows = Vec::new();
        for entry in self.mappings.range(start..) {
            let (key, value) = entry?;
            if !key.starts_with(&prefix) || rows.len() >= limit {
                break;
            }
            let old_id = keys::trailing_id(&key).ok_or(StoreError::Corrupt("node_mappings"))?;
            let new_id = keys::id_value(&value).ok_or(StoreError::Corrupt("node_mappings"))?;
            rows.push(NodeMapping {
                old_id: NodeId(old_id),
                new_id: NodeId(new_id),
            });
        }
        Ok(rows)
    }

    fn project_mappings(&self, project_id: &str) -> Result<Vec<(String, NodeMapping)>, StoreError> {
        let prefix = keys::project_prefix(project_id);
        let mut rows = Vec::new();
        for entry in self.mappings.scan_prefix(&prefix) {
            let (key, value) = entry?;
            let branch = keys::branch_of(&key, prefix.len()).ok_or(StoreError::Corrupt("node_mappings"))?;
            let old_id = keys::trailing_id(&key).ok_or(StoreError::Corrupt("node_mappings"))?;
            let new_id = keys::id_value(&value).ok_or(StoreError::Corrupt("node_mappings"))?;
            rows.push((
                branch,
                NodeMapping {
                    old_id: NodeId(old_id),
                    new_id: NodeId(new_id),
                },
            ));
        }
        Ok(rows)
    }

    fn delete_mapping(
        &self,
        project_id: &str,
        branch: &str,
        old_id: NodeId,
    ) -> Result<bool, StoreError> {
        let key = keys::with_id(keys::branch_prefix(project_id, branch), old_id.0);
        Ok(self.mappings.remove(key)?.is_some())
    }

    fn put_pending_edges(
        &self,
        project_id: &str,
        branch: &str,
        edges: &[KeyedEdge],
    ) -> Result<(), StoreError> {
        let key = keys::branch_prefix(project_id, branch);
        self.pending_edges.insert(key, bincode::serialize(edges)?)?;
        // The journal must survive a crash in the node phase that follows.
        self.pending_edges.flush()?;
        Ok(())
    }

    fn pending_edges(&self, project_id: &str, branch: &str) -> Result<Vec<KeyedEdge>, StoreError> {
        match self.pending_edges.get(keys::branch_prefix(project_id, branch))? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    fn clear_pending_edges(&self, project_id: &str, branch: &str) -> Result<bool, StoreError> {
        let removed = self
            .pending_edges
            .remove(keys::branch_prefix(project_id, branch))?;
        Ok(removed.is_some())
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(StoreStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            mapping_count: self.mappings.len(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use grove_core::{NodeLabel, NodeStatus};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;

    pub(crate) fn record(branch: &str, class: &str, method: Option<&str>) -> NodeRecord {
        NodeRecord {
            label: if method.is_some() {
                NodeLabel::Method
            } else {
                NodeLabel::Class
            },
            name: method.unwrap_or(class).to_string(),
            class_name: class.to_string(),
            method_name: method.map(str::to_string),
            file_path: format!("{}.java", class),
            content: String::new(),
            ast_hash: Some(format!("{}-{}", class, method.unwrap_or("class"))),
            project_id: "1".to_string(),
            branch: branch.to_string(),
            version: "v1".to_string(),
            status: NodeStatus::Active,
            base_branch: None,
            base_version: None,
            pull_request_id: None,
            endpoint: BTreeMap::new(),
        }
    }

    /// Wraps a temporary store and fails a set number of node or edge
    /// creations, then behaves normally.
    pub(crate) struct FlakyStore {
        pub(crate) inner: SledGraphStore,
        node_failures: AtomicU32,
        edge_grace: AtomicU32,
        edge_failures: AtomicU32,
        pub(crate) node_calls: AtomicU32,
    }

    impl FlakyStore {
        pub(crate) fn failing_nodes(failures: u32) -> Self {
            Self {
                inner: SledGraphStore::open_temporary().unwrap(),
                node_failures: AtomicU32::new(failures),
                edge_grace: AtomicU32::new(0),
                edge_failures: AtomicU32::new(0),
                node_calls: AtomicU32::new(0),
            }
        }

        /// Lets `grace` edge creations through, then fails the next
        /// `failures`.
        pub(crate) fn failing_edges(grace: u32, failures: u32) -> Self {
            let store = Self::failing_nodes(0);
            store.edge_grace.store(grace, Ordering::SeqCst);
            store.edge_failures.store(failures, Ordering::SeqCst);
            store
        }

        fn take(counter: &AtomicU32) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    impl GraphStore for FlakyStore {
        fn create_node(&self, record: &NodeRecord) -> Result<GraphNode, StoreError> {
            self.node_calls.fetch_add(1, Ordering::SeqCst);
            if Self::take(&self.node_failures) {
                return Err(StoreError::Unavailable("connection reset".into()));
            }
            self.inner.create_node(record)
        }
        fn node(&self, id: NodeId) -> Result<Option<GraphNode>, StoreError> {
            self.inner.node(id)
        }
        fn nodes_at(
            &self,
            project_id: &str,
            branch: &str,
            identity: &IdentityKey,
        ) -> Result<Vec<GraphNode>, StoreError> {
            self.inner.nodes_at(project_id, branch, identity)
        }
        fn nodes_by_method_name(
            &self,
            project_id: &str,
            branch: &str,
            method_name: &str,
        ) -> Result<Vec<GraphNode>, StoreError> {
            self.inner.nodes_by_method_name(project_id, branch, method_name)
        }
        fn scan_branch(
            &self,
            project_id: &str,
            branch: &str,
            after: Option<NodeId>,
            limit: usize,
        ) -> Result<Vec<GraphNode>, StoreError> {
            self.inner.scan_branch(project_id, branch, after, limit)
        }
        fn delete_node(&self, id: NodeId) -> Result<bool, StoreError> {
            self.inner.delete_node(id)
        }
        fn create_edge(
            &self,
            source: NodeId,
            target: NodeId,
            kind: EdgeKind,
        ) -> Result<GraphEdge, StoreError> {
            if !Self::take(&self.edge_grace) && Self::take(&self.edge_failures) {
                return Err(StoreError::Unavailable("connection reset".into()));
            }
            self.inner.create_edge(source, target, kind)
        }
        fn delete_edge(&self, id: EdgeId) -> Result<bool, StoreError> {
            self.inner.delete_edge(id)
        }
        fn outgoing(&self, id: NodeId) -> Result<Vec<GraphEdge>, StoreError> {
            self.inner.outgoing(id)
        }
        fn incoming(&self, id: NodeId) -> Result<Vec<GraphEdge>, StoreError> {
            self.inner.incoming(id)
        }
        fn put_mapping(
            &self,
            project_id: &str,
            branch: &str,
            mapping: NodeMapping,
        ) -> Result<(), StoreError> {
            self.inner.put_mapping(project_id, branch, mapping)
        }
        fn mapping(
            &self,
            project_id: &str,
            branch: &str,
            old_id: NodeId,
        ) -> Result<Option<NodeId>, StoreError> {
            self.inner.mapping(project_id, branch, old_id)
        }
        fn scan_mappings(
            &self,
            project_id: &str,
            branch: &str,
            after: Option<NodeId>,
            limit: usize,
        ) -> Result<Vec<NodeMapping>, StoreError> {
            self.inner.scan_mappings(project_id, branch, after, limit)
        }
        fn project_mappings(
            &self,
            project_id: &str,
        ) -> Result<Vec<(String, NodeMapping)>, StoreError> {
            self.inner.project_mappings(project_id)
        }
        fn delete_mapping(
            &self,
            project_id: &str,
            branch: &str,
            old_id: NodeId,
        ) -> Result<bool, StoreError> {
            self.inner.delete_mapping(project_id, branch, old_id)
        }
        fn put_pending_edges(
            &self,
            project_id: &str,
            branch: &str,
            edges: &[KeyedEdge],
        ) -> Result<(), StoreError> {
            self.inner.put_pending_edges(project_id, branch, edges)
        }
        fn pending_edges(
            &self,
            project_id: &str,
            branch: &str,
        ) -> Result<Vec<KeyedEdge>, StoreError> {
            self.inner.pending_edges(project_id, branch)
        }
        fn clear_pending_edges(&self, project_id: &str, branch: &str) -> Result<bool, StoreError> {
            self.inner.clear_pending_edges(project_id, branch)
        }
        fn stats(&self) -> Result<StoreStats, StoreError> {
            self.inner.stats()
        }
    }

    #[test]
    fn test_null_aware_lookup() {
        let store = SledGraphStore::open_temporary().unwrap();
        let class = store.create_node(&record("main", "Foo", None)).unwrap();
        let method = store
            .create_node(&record("main", "Foo", Some("bar()")))
            .unwrap();

        let found = store
            .nodes_at("1", "main", &IdentityKey::class("Foo"))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, class.id);

        let found = store
            .nodes_at("1", "main", &IdentityKey::method("Foo", "bar()"))
            .unwrap();
        assert_eq!(found[0].id, method.id);

        let by_name = store.nodes_by_method_name("1", "main", "bar()").unwrap();
        assert_eq!(by_name.len(), 1);
        assert!(store
            .nodes_at("1", "feature", &IdentityKey::class("Foo"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_detach_delete_removes_edges_and_indexes() {
        let store = SledGraphStore::open_temporary().unwrap();
        let a = store.create_node(&record("main", "A", None)).unwrap();
        let b = store.create_node(&record("main", "B", None)).unwrap();
        store.create_edge(a.id, b.id, EdgeKind::Use).unwrap();
        store.create_edge(b.id, a.id, EdgeKind::Use).unwrap();

        assert!(store.delete_node(b.id).unwrap());
        assert!(!store.delete_node(b.id).unwrap());

        assert!(store.outgoing(a.id).unwrap().is_empty());
        assert!(store.incoming(a.id).unwrap().is_empty());
        assert!(store
            .nodes_at("1", "main", &IdentityKey::class("B"))
            .unwrap()
            .is_empty());
        assert_eq!(store.stats().unwrap().edge_count, 0);
    }

    #[test]
    fn test_edge_to_missing_node_is_an_error() {
        let store = SledGraphStore::open_temporary().unwrap();
        let a = store.create_node(&record("main", "A", None)).unwrap();
        let result = store.create_edge(a.id, NodeId(999_999), EdgeKind::Call);
        assert!(matches!(result, Err(StoreError::MissingNode(_))));
    }

    #[test]
    fn test_scan_branch_pages() {
        let store = SledGraphStore::open_temporary().unwrap();
        for i in 0..5 {
            store
                .create_node(&record("main", &format!("C{}", i), None))
                .unwrap();
        }
        store.create_node(&record("other", "X", None)).unwrap();

        let first = store.scan_branch("1", "main", None, 2).unwrap();
        assert_eq!(first.len(), 2);
        let second = store
            .scan_branch("1", "main", first.last().map(|n| n.id), 10)
            .unwrap();
        assert_eq!(second.len(), 3);
        assert!(second.iter().all(|n| n.id > first[1].id));
        assert_eq!(store.branch_nodes("1", "main").unwrap().len(), 5);
    }

    #[test]
    fn test_mappings() {
        let store = SledGraphStore::open_temporary().unwrap();
        let row = NodeMapping {
            old_id: NodeId(3),
            new_id: NodeId(9),
        };
        store.put_mapping("1", "feature", row).unwrap();

        assert_eq!(store.mapping("1", "feature", NodeId(3)).unwrap(), Some(NodeId(9)));
        assert_eq!(store.mapping("1", "main", NodeId(3)).unwrap(), None);
        assert_eq!(
            store.project_mappings("1").unwrap(),
            vec![("feature".to_string(), row)]
        );
        assert_eq!(store.scan_mappings("1", "feature", None, 10).unwrap(), vec![row]);
        assert!(store.delete_mapping("1", "feature", NodeId(3)).unwrap());
        assert_eq!(store.stats().unwrap().mapping_count, 0);
    }

    #[test]
    fn test_pending_edges_are_per_partition() {
        let store = SledGraphStore::open_temporary().unwrap();
        let edge = KeyedEdge {
            source: IdentityKey::method("A", "run()").in_branch("1", "main"),
            target: IdentityKey::method("B", "m()").in_branch("1", "main"),
            kind: EdgeKind::Call,
        };
        store.put_pending_edges("1", "main", &[edge.clone()]).unwrap();

        assert_eq!(store.pending_edges("1", "main").unwrap(), vec![edge]);
        assert!(store.pending_edges("1", "feature").unwrap().is_empty());
        assert!(store.clear_pending_edges("1", "main").unwrap());
        assert!(!store.clear_pending_edges("1", "main").unwrap());
        assert!(store.pending_edges("1", "main").unwrap().is_empty());
    }

    #[test]
    fn test_reopen_persists() {
        let dir = tempdir().unwrap();
        let id = {
            let store = SledGraphStore::open(dir.path()).unwrap();
            let node = store.create_node(&record("main", "A", None)).unwrap();
            store.close().unwrap();
            node.id
        };

        let store = SledGraphStore::open(dir.path()).unwrap();
        let node = store.node(id).unwrap().unwrap();
        assert_eq!(node.record.class_name, "A");
    }
}
