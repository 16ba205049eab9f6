//! Grove Graph - Branch-aware incremental graph synchronization
//!
//! Takes batches of code facts and keeps a persisted code graph in step
//! with them across branches:
//!
//! - facts are compared by AST hash against a comparison branch and only
//!   new or changed ones produce nodes
//! - replaced nodes keep the edges of neighbors that were not re-analyzed
//! - edge targets missing from a sparse branch resolve in `base` or `main`
//! - removed code leaves a `DELETED` tombstone
//! - branches fork by copying everything except what is about to change
//!
//! # Example
//!
//! ```no_run
//! use grove_core::{ClassFact, MethodFact};
//! use grove_graph::{GraphSync, ImportRequest, SyncConfig};
//!
//! let sync = GraphSync::open(SyncConfig::default().with_store_path(".grove/db"))?;
//! let facts = vec![ClassFact::new("1", "develop", "com.acme.Billing", "h1")
//!     .with_method(MethodFact::new("charge(int)", "h2").with_calls(["audit()"]))];
//!
//! let report = sync.import_facts(&ImportRequest::new("1", "develop", facts).with_main("main"))?;
//! println!("{} nodes created", report.nodes_created);
//! sync.close()?;
//! # Ok::<(), grove_graph::SyncError>(())
//! ```

mod cloner;
mod config;
mod context;
mod detector;
mod edge;
mod error;
mod executor;
mod fallback;
mod generator;
mod keys;
mod ops;
mod preserve;
mod query;
mod service;
mod store;
mod tombstone;
mod traversal;

pub use cloner::{deduplicate_nodes, BranchCloner, CloneExclusions, CloneReport};
pub use config::{SyncConfig, CONFIG_DIR, CONFIG_FILE, ENV_BATCH_SIZE, ENV_STORE_PATH};
pub use context::SyncContext;
pub use detector::{ChangeDetector, Verdict, Verdicts};
pub use edge::{EdgeId, EdgeKind, GraphEdge, KeyedEdge};
pub use error::{ConfigError, Phase, SyncError};
pub use executor::BatchExecutor;
pub use fallback::{branch_candidates, first_match, BranchCandidate};
pub use generator::MutationGenerator;
pub use ops::{Endpoint, OpOutcome, Operation, Selector};
pub use preserve::{deduplicate_edges, save_boundary_edges};
pub use query::{configuration_nodes, find_nodes, nodes_by_keys, NodeFilter};
pub use service::{GraphSync, ImportMode, ImportReport, ImportRequest};
pub use store::{GraphStore, NodeMapping, SledGraphStore, StoreError, StoreStats};
pub use tombstone::{tombstone_record, TOMBSTONE_PREFIX};
pub use traversal::{
    traverse, Direction, FilterParseError, FilterRule, RelationshipFilter, Traversal,
    TraversalOptions, Visit,
};
