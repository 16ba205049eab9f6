//! Bounded traversal from one node.
//!
//! Breadth-first, and every node is visited at most once across all paths.
//! Edges may cross branches (overlay edges); when asked, a node reached
//! over an overlay edge is dropped if the start node's branch has its own
//! node for that identity, since the local node supersedes it.

use crate::edge::{EdgeKind, GraphEdge};
use crate::store::{GraphStore, StoreError};
use grove_core::{GraphNode, NodeId};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

impl Direction {
    fn allows(&self, outgoing: bool) -> bool {
        match self {
            Direction::Both => true,
            Direction::Outgoing => outgoing,
            Direction::Incoming => !outgoing,
        }
    }
}

/// One `KIND>`, `<KIND`, `KIND` or `>` term of a relationship filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    /// None matches every kind.
    pub kind: Option<EdgeKind>,
    pub direction: Direction,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid relationship filter term '{0}'")]
pub struct FilterParseError(pub String);

/// Which edges a traversal follows, e.g. `CALL>|<IMPLEMENT|USE>`.
///
/// `>` follows outgoing edges, `<` incoming ones, no arrow both. An empty
/// filter follows everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipFilter {
    rules: Vec<FilterRule>,
}

impl RelationshipFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    pub fn follows(&self, kind: EdgeKind, outgoing: bool) -> bool {
        self.rules.is_empty()
            || self.rules.iter().any(|rule| {
                rule.kind.map_or(true, |k| k == kind) && rule.direction.allows(outgoing)
            })
    }
}

impl FromStr for RelationshipFilter {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rules = Vec::new();
        for term in s.split('|').map(str::trim).filter(|t| !t.is_empty()) {
            let (direction, name) = match (term.strip_prefix('<'), term.strip_suffix('>')) {
                (Some(_), Some(_)) => return Err(FilterParseError(term.to_string())),
                (Some(name), None) => (Direction::Incoming, name),
                (None, Some(name)) => (Direction::Outgoing, name),
                (None, None) => (Direction::Both, term),
            };
            let kind = if name.trim().is_empty() {
                None
            } else {
                Some(EdgeKind::parse(name).ok_or_else(|| FilterParseError(term.to_string()))?)
            };
            rules.push(FilterRule { kind, direction });
        }
        Ok(Self { rules })
    }
}

impl fmt::Display for RelationshipFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self
            .rules
            .iter()
            .map(|rule| {
                let name = rule.kind.map(|k| k.as_str()).unwrap_or("");
                match rule.direction {
                    Direction::Outgoing => format!("{}>", name),
                    Direction::Incoming => format!("<{}", name),
                    Direction::Both => name.to_string(),
                }
            })
            .collect();
        write!(f, "{}", terms.join("|"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalOptions {
    pub filter: RelationshipFilter,
    /// Visits shallower than this are not reported. Level 0 is the start.
    pub min_level: usize,
    pub max_level: usize,
    /// Skip overlay neighbors shadowed by a node in the start's branch.
    pub exclude_shadowed_overlay: bool,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            filter: RelationshipFilter::all(),
            min_level: 1,
            max_level: 20,
            exclude_shadowed_overlay: true,
        }
    }
}

impl TraversalOptions {
    pub fn with_filter(mut self, filter: RelationshipFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_max_level(mut self, max_level: usize) -> Self {
        self.max_level = max_level;
        self
    }

    pub fn with_min_level(mut self, min_level: usize) -> Self {
        self.min_level = min_level;
        self
    }
}

/// How a node was first reached.
#[derive(Debug, Clone, PartialEq)]
pub struct Visit {
    pub node: GraphNode,
    pub depth: usize,
    /// The edge it was reached over and the node on the other end.
    pub via: Option<(EdgeKind, NodeId)>,
    /// Reached over an edge into another branch.
    pub overlay: bool,
}

/// Result of a traversal: the discovered sub-graph and the visit order.
#[derive(Debug)]
pub struct Traversal {
    pub graph: DiGraph<GraphNode, EdgeKind>,
    index: HashMap<NodeId, NodeIndex>,
    visits: Vec<Visit>,
    min_level: usize,
}

impl Traversal {
    /// Visits at or beyond the minimum level, in BFS order.
    pub fn visits(&self) -> impl Iterator<Item = &Visit> {
        let min = self.min_level;
        self.visits.iter().filter(move |v| v.depth >= min)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.visits().any(|v| v.node.id == id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn index_of(&self, id: NodeId) -> Option<NodeIndex> {
        self.index.get(&id).copied()
    }

    /// Nodes from the start to `id` along the BFS tree.
    pub fn path_to(&self, id: NodeId) -> Option<Vec<&GraphNode>> {
        let by_id: HashMap<NodeId, &Visit> =
            self.visits.iter().map(|v| (v.node.id, v)).collect();
        let mut path = Vec::new();
        let mut current: &Visit = *by_id.get(&id)?;
        loop {
            path.push(&current.node);
            match current.via {
                Some((_, parent)) => current = *by_id.get(&parent)?,
                None => break,
            }
        }
        path.reverse();
        Some(path)
    }
}

/// Breadth-first traversal from `start`. Tombstones are never visited.
pub fn traverse(
    store: &dyn GraphStore,
    start: &GraphNode,
    options: &TraversalOptions,
) -> Result<Traversal, StoreError> {
    let home = start.branch().to_string();
    let mut graph: DiGraph<GraphNode, EdgeKind> = DiGraph::new();
    let mut index: HashMap<NodeId, NodeIndex> = HashMap::new();
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut visits = Vec::new();
    let mut queue: VecDeque<(NodeId, usize)> = VecDeque::new();

    index.insert(start.id, graph.add_node(start.clone()));
    visited.insert(start.id);
    visits.push(Visit {
        node: start.clone(),
        depth: 0,
        via: None,
        overlay: false,
    });
    queue.push_back((start.id, 0));

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= options.max_level {
            continue;
        }
        let Some(from) = store.node(current)? else {
            continue;
        };

        let outgoing = store.outgoing(current)?.into_iter().map(|e| (e, true));
        let incoming = store.incoming(current)?.into_iter().map(|e| (e, false));
        let mut steps: Vec<(GraphEdge, bool)> = outgoing.chain(incoming).collect();
        steps.sort_by_key(|(e, _)| e.id);

        for (edge, out) in steps {
            if !options.filter.follows(edge.kind, out) {
                continue;
            }
            let next_id = if out { edge.target } else { edge.source };
            if visited.contains(&next_id) {
                continue;
            }
            let Some(next) = store.node(next_id)? else {
                continue;
            };
            if next.record.is_tombstone() {
                continue;
            }
            let overlay = next.branch() != from.branch();
            if overlay && options.exclude_shadowed_overlay && next.branch() != home {
                let shadowed = store
                    .nodes_at(&next.record.project_id, &home, &next.identity())?
                    .iter()
                    .any(|n| !n.record.is_tombstone());
                if shadowed {
                    continue;
                }
            }

            visited.insert(next_id);
            let next_index = graph.add_node(next.clone());
            index.insert(next_id, next_index);
            let current_index = index[&current];
            if out {
                graph.add_edge(current_index, next_index, edge.kind);
            } else {
                graph.add_edge(next_index, current_index, edge.kind);
            }
            visits.push(Visit {
                node: next,
                depth: depth + 1,
                via: Some((edge.kind, current)),
                overlay,
            });
            queue.push_back((next_id, depth + 1));
        }
    }

    Ok(Traversal {
        graph,
        index,
        visits,
        min_level: options.min_level,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::record;
    use crate::store::SledGraphStore;

    #[test]
    fn test_parse_filter() {
        let filter: RelationshipFilter = "CALL>|<IMPLEMENT|USE".parse().unwrap();
        assert!(filter.follows(EdgeKind::Call, true));
        assert!(!filter.follows(EdgeKind::Call, false));
        assert!(filter.follows(EdgeKind::Implement, false));
        assert!(!filter.follows(EdgeKind::Implement, true));
        assert!(filter.follows(EdgeKind::Use, false));
        assert_eq!(filter.to_string(), "CALL>|<IMPLEMENT|USE");

        assert!("FOO>".parse::<RelationshipFilter>().is_err());
        assert!("<CALL>".parse::<RelationshipFilter>().is_err());
        assert!(RelationshipFilter::all().follows(EdgeKind::Use, true));
    }

    #[test]
    fn test_bfs_levels_and_global_uniqueness() {
        let store = SledGraphStore::open_temporary().unwrap();
        let a = store.create_node(&record("main", "A", Some("a()"))).unwrap();
        let b = store.create_node(&record("main", "B", Some("b()"))).unwrap();
        let c = store.create_node(&record("main", "C", Some("c()"))).unwrap();
        let d = store.create_node(&record("main", "D", Some("d()"))).unwrap();
        store.create_edge(a.id, b.id, EdgeKind::Call).unwrap();
        store.create_edge(a.id, c.id, EdgeKind::Call).unwrap();
        store.create_edge(b.id, d.id, EdgeKind::Call).unwrap();
        store.create_edge(c.id, d.id, EdgeKind::Call).unwrap();

        let options = TraversalOptions::default().with_filter("CALL>".parse().unwrap());
        let result = traverse(&store, &a, &options).unwrap();
        let depths: Vec<(NodeId, usize)> =
            result.visits().map(|v| (v.node.id, v.depth)).collect();
        assert_eq!(depths, vec![(b.id, 1), (c.id, 1), (d.id, 2)]);
        assert_eq!(result.graph.edge_count(), 3);

        let path = result.path_to(d.id).unwrap();
        let ids: Vec<NodeId> = path.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![a.id, b.id, d.id]);

        let shallow = traverse(&store, &a, &options.clone().with_max_level(1)).unwrap();
        assert!(!shallow.contains(d.id));

        let upstream = traverse(
            &store,
            &d,
            &TraversalOptions::default().with_filter("<CALL".parse().unwrap()),
        )
        .unwrap();
        assert!(upstream.contains(a.id));
    }

    #[test]
    fn test_shadowed_overlay_is_skipped() {
        let store = SledGraphStore::open_temporary().unwrap();
        let y = store.create_node(&record("feature", "Y", Some("y()"))).unwrap();
        let x_main = store.create_node(&record("main", "X", Some("x()"))).unwrap();
        let z_main = store.create_node(&record("main", "Z", Some("z()"))).unwrap();
        store.create_node(&record("feature", "Z", Some("z()"))).unwrap();
        store.create_edge(y.id, x_main.id, EdgeKind::Call).unwrap();
        store.create_edge(y.id, z_main.id, EdgeKind::Call).unwrap();

        let result = traverse(&store, &y, &TraversalOptions::default()).unwrap();
        assert!(result.contains(x_main.id));
        assert!(!result.contains(z_main.id));
        assert!(result.visits().all(|v| v.overlay));

        let mut options = TraversalOptions::default();
        options.exclude_shadowed_overlay = false;
        let result = traverse(&store, &y, &options).unwrap();
        assert!(result.contains(z_main.id));
    }
}
