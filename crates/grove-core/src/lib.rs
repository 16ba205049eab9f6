//! Grove Core - Code facts and graph identities
//!
//! This crate defines the data that flows into the Grove graph: facts
//! extracted from source code by an external analyzer, and the identity
//! keys used to find the persisted nodes those facts correspond to.
//!
//! # Identity
//!
//! Every persisted node is addressed by a composite business key:
//! `(project_id, branch, class_name, method_name?)`. A class-level node has
//! no method name, and that absence is part of the identity: a lookup for
//! `Foo` never matches `Foo.bar()`.
//!
//! # Example
//!
//! ```
//! use grove_core::{ClassFact, IdentityKey, MethodFact};
//!
//! let fact = ClassFact::new("1", "develop", "com.acme.Billing", "h1")
//!     .with_method(MethodFact::new("charge(int)", "h2").with_calls(["audit()"]));
//!
//! let keys: Vec<IdentityKey> = fact.identity_keys().collect();
//! assert_eq!(keys.len(), 2);
//! assert!(keys[0].is_class_level());
//! ```

mod escape;
mod facts;
mod key;
mod node;

pub use escape::escape_content;
pub use facts::{ClassFact, ClassKind, DeletedFact, Endpoint, FactError, MethodFact, MethodKind};
pub use key::{IdentityKey, NodeKey};
pub use node::{GraphNode, NodeId, NodeLabel, NodeRecord, NodeStatus};

/// Version recorded on nodes when the caller does not supply one.
pub const UNKNOWN_VERSION: &str = "unknown";
