//! Identity keys for graph nodes.
//!
//! Nodes are never addressed by their storage id across runs: ids change
//! every time a node is replaced. Business keys are stable, so everything
//! that must survive a replacement (saved boundary edges, clone exclusions,
//! lookups) goes through these types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a code element inside a branch: `(class_name, method_name?)`.
///
/// `method_name == None` denotes the class-level node. Equality is exact,
/// so a class-level key never equals any method key of the same class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey {
    pub class_name: String,
    pub method_name: Option<String>,
}

impl IdentityKey {
    /// Key of a class-level node.
    pub fn class(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: None,
        }
    }

    /// Key of a method-level node.
    pub fn method(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: Some(method_name.into()),
        }
    }

    pub fn is_class_level(&self) -> bool {
        self.method_name.is_none()
    }

    /// Scopes this identity to a project and branch.
    pub fn in_branch(&self, project_id: &str, branch: &str) -> NodeKey {
        NodeKey {
            project_id: project_id.to_string(),
            branch: branch.to_string(),
            identity: self.clone(),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method_name {
            Some(method) => write!(f, "{}.{}", self.class_name, method),
            None => write!(f, "{}", self.class_name),
        }
    }
}

/// Full business key of a persisted node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub project_id: String,
    pub branch: String,
    pub identity: IdentityKey,
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.project_id, self.branch, self.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_class_key_distinct_from_method_key() {
        let class = IdentityKey::class("Foo");
        let method = IdentityKey::method("Foo", "bar()");

        assert_ne!(class, method);
        assert!(class.is_class_level());
        assert!(!method.is_class_level());

        let set: HashSet<_> = [class.clone(), method].into_iter().collect();
        assert!(set.contains(&class));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(IdentityKey::class("a.B").to_string(), "a.B");
        assert_eq!(IdentityKey::method("a.B", "c()").to_string(), "a.B.c()");
        assert_eq!(
            IdentityKey::class("a.B").in_branch("7", "main").to_string(),
            "7@main:a.B"
        );
    }
}
