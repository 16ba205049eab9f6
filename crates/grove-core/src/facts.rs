//! Fact records produced by the external analyzer.
//!
//! A fact describes one class or method at a point in source history. Facts
//! arrive in batches per `(project, branch, version)`; a class fact owns the
//! method facts declared in it.

use crate::escape::escape_content;
use crate::key::IdentityKey;
use crate::node::{NodeLabel, NodeStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Problems with a fact that make it impossible to key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FactError {
    #[error("class fact in {file} has an empty class name")]
    EmptyClassName { file: String },
    #[error("method fact in class {class} has an empty method name")]
    EmptyMethodName { class: String },
}

/// What kind of class-level element a fact describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassKind {
    #[default]
    Regular,
    Configuration,
}

/// What kind of method-level element a fact describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    #[default]
    Regular,
    Endpoint,
    Configuration,
}

/// A REST endpoint exposed by a method.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    pub http_method: String,
    pub path: String,
    pub produces: String,
    pub consumes: String,
}

/// One analyzed method or constructor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodFact {
    /// Simple method name, used for display.
    pub name: String,
    /// Signature-qualified name. This is the `method_name` of the node.
    pub full_name: String,
    pub body: String,
    /// Structural fingerprint. Absent for abstract or empty bodies.
    pub ast_hash: Option<String>,
    /// Full names of called methods.
    pub calls: Vec<String>,
    pub used_types: Vec<String>,
    pub field_access: Vec<String>,
    /// Full names of methods this one overrides or implements.
    pub inheritance: Vec<String>,
    pub endpoints: Vec<Endpoint>,
    pub annotations: Vec<String>,
    /// Annotation type this method is a handler for.
    pub handles_annotation: Option<String>,
    pub kind: MethodKind,
    /// Caller-supplied status for changed nodes.
    pub status: Option<NodeStatus>,
}

impl MethodFact {
    pub fn new(full_name: impl Into<String>, ast_hash: impl Into<String>) -> Self {
        let full_name = full_name.into();
        let name = full_name
            .split('(')
            .next()
            .unwrap_or(full_name.as_str())
            .to_string();
        Self {
            name,
            full_name,
            ast_hash: Some(ast_hash.into()),
            ..Self::default()
        }
    }

    /// A method without a meaningful fingerprint (abstract or empty body).
    pub fn abstract_method(full_name: impl Into<String>) -> Self {
        Self {
            ast_hash: None,
            ..Self::new(full_name, "")
        }
    }

    pub fn with_calls<I, S>(mut self, calls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.calls = calls.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_used_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.used_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_inheritance<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inheritance = parents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_annotations<I, S>(mut self, annotations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.annotations = annotations.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_kind(mut self, kind: MethodKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.kind = MethodKind::Endpoint;
        self.endpoints.push(endpoint);
        self
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn label(&self) -> NodeLabel {
        match self.kind {
            MethodKind::Regular => NodeLabel::Method,
            MethodKind::Endpoint => NodeLabel::Endpoint,
            MethodKind::Configuration => NodeLabel::Configuration,
        }
    }

    /// Node content: escaped body followed by the field accesses.
    pub fn content(&self) -> String {
        format!(
            "{} [{}]",
            escape_content(&self.body),
            self.field_access.join(", ")
        )
    }

    /// Endpoint metadata of the first declared endpoint.
    pub fn endpoint_metadata(&self) -> BTreeMap<String, String> {
        let mut meta = BTreeMap::new();
        if let Some(endpoint) = self.endpoints.first() {
            meta.insert("http_method".to_string(), endpoint.http_method.clone());
            meta.insert("path".to_string(), endpoint.path.clone());
            if !endpoint.produces.is_empty() {
                meta.insert("produces".to_string(), endpoint.produces.clone());
            }
            if !endpoint.consumes.is_empty() {
                meta.insert("consumes".to_string(), endpoint.consumes.clone());
            }
        }
        meta
    }
}

/// One analyzed class, interface or annotation type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassFact {
    pub project_id: String,
    pub branch: String,
    /// Simple class name, used for display.
    pub name: String,
    pub full_class_name: String,
    pub file_path: String,
    pub content: String,
    pub ast_hash: String,
    /// Interfaces this class implements.
    pub implements: Vec<String>,
    pub used_types: Vec<String>,
    pub annotations: Vec<String>,
    pub handles_annotation: Option<String>,
    pub kind: ClassKind,
    pub methods: Vec<MethodFact>,
    /// Caller-supplied status for changed nodes.
    pub status: Option<NodeStatus>,
}

impl ClassFact {
    pub fn new(
        project_id: impl Into<String>,
        branch: impl Into<String>,
        full_class_name: impl Into<String>,
        ast_hash: impl Into<String>,
    ) -> Self {
        let full_class_name = full_class_name.into();
        let name = full_class_name
            .rsplit('.')
            .next()
            .unwrap_or(full_class_name.as_str())
            .to_string();
        Self {
            project_id: project_id.into(),
            branch: branch.into(),
            name,
            full_class_name,
            ast_hash: ast_hash.into(),
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: MethodFact) -> Self {
        self.methods.push(method);
        self
    }

    pub fn with_implements<I, S>(mut self, interfaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.implements = interfaces.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_used_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.used_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_annotations<I, S>(mut self, annotations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.annotations = annotations.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_handles_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.handles_annotation = Some(annotation.into());
        self
    }

    pub fn with_kind(mut self, kind: ClassKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_file(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = file_path.into();
        self
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn label(&self) -> NodeLabel {
        match self.kind {
            ClassKind::Regular => NodeLabel::Class,
            ClassKind::Configuration => NodeLabel::Configuration,
        }
    }

    pub fn key(&self) -> IdentityKey {
        IdentityKey::class(&self.full_class_name)
    }

    pub fn method_key(&self, method: &MethodFact) -> IdentityKey {
        IdentityKey::method(&self.full_class_name, &method.full_name)
    }

    /// The class key followed by the key of every method, in declaration order.
    pub fn identity_keys(&self) -> impl Iterator<Item = IdentityKey> + '_ {
        std::iter::once(self.key()).chain(self.methods.iter().map(|m| self.method_key(m)))
    }

    /// Rejects facts that cannot be keyed.
    pub fn validate(&self) -> Result<(), FactError> {
        if self.full_class_name.trim().is_empty() {
            return Err(FactError::EmptyClassName {
                file: self.file_path.clone(),
            });
        }
        for method in &self.methods {
            if method.full_name.trim().is_empty() {
                return Err(FactError::EmptyMethodName {
                    class: self.full_class_name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// A code element the caller declares removed since the previous run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletedFact {
    pub class_name: String,
    pub method_name: Option<String>,
    /// Label to give the tombstone. Inferred from `method_name` when absent.
    pub kind_hint: Option<NodeLabel>,
    pub prior_ast_hash: Option<String>,
    pub file_path: Option<String>,
}

impl DeletedFact {
    pub fn class(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            ..Self::default()
        }
    }

    pub fn method(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: Some(method_name.into()),
            ..Self::default()
        }
    }

    pub fn with_prior_hash(mut self, hash: impl Into<String>) -> Self {
        self.prior_ast_hash = Some(hash.into());
        self
    }

    pub fn identity(&self) -> IdentityKey {
        IdentityKey {
            class_name: self.class_name.clone(),
            method_name: self.method_name.clone(),
        }
    }

    pub fn label(&self) -> NodeLabel {
        match (self.kind_hint, &self.method_name) {
            (Some(label), _) => label,
            (None, Some(_)) => NodeLabel::Method,
            (None, None) => NodeLabel::Class,
        }
    }

    /// Display name of the removed element.
    pub fn name(&self) -> String {
        match &self.method_name {
            Some(method) => method.clone(),
            None => self
                .class_name
                .rsplit('.')
                .next()
                .unwrap_or(self.class_name.as_str())
                .to_string(),
        }
    }
}
