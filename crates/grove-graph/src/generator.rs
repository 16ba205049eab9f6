//! Turns facts and verdicts into ordered operation lists.
//!
//! The node phase of every batch runs before the edge phase of any batch,
//! so edge targets created in a later batch already exist when edges are
//! attempted.

use crate::context::SyncContext;
use crate::detector::Verdicts;
use crate::edge::EdgeKind;
use crate::fallback::{current_only, BranchCandidate};
use crate::ops::{Endpoint, Operation, Selector};
use grove_core::{escape_content, ClassFact, IdentityKey, MethodFact, NodeRecord, NodeStatus};
use std::collections::BTreeMap;

pub struct MutationGenerator<'a> {
    ctx: &'a SyncContext,
    /// Branches searched for nodes a fact refers to.
    referenced: Vec<BranchCandidate>,
    /// Nodes of the fact itself only exist in the current branch.
    owned: Vec<BranchCandidate>,
}

impl<'a> MutationGenerator<'a> {
    pub fn new(ctx: &'a SyncContext) -> Self {
        Self {
            ctx,
            referenced: ctx.target_candidates(),
            owned: current_only(&ctx.branch),
        }
    }

    /// Deletes for every replaced identity of the batch, then creates for
    /// every identity whose verdict asks for a node.
    pub fn node_phase(&self, batch: &[ClassFact], verdicts: &Verdicts) -> Vec<Operation> {
        let mut deletes = Vec::new();
        let mut creates = Vec::new();
        for fact in batch {
            let key = fact.key();
            if verdicts.replaces_current(&key) {
                deletes.push(self.delete(key.clone()));
            }
            let verdict = verdicts.get(&key);
            if verdict.creates_node() {
                let record = self.class_record(fact, verdict.status(fact.status));
                creates.push(Operation::CreateNode { record });
            }

            for method in &fact.methods {
                let key = fact.method_key(method);
                if verdicts.replaces_current(&key) {
                    deletes.push(self.delete(key.clone()));
                }
                let verdict = verdicts.get(&key);
                if verdict.creates_node() {
                    let record =
                        self.method_record(fact, method, verdict.status(method.status));
                    creates.push(Operation::CreateNode { record });
                }
            }
        }
        deletes.extend(creates);
        deletes
    }

    /// Edge operations for a batch, grouped CALL, IMPLEMENT, USE.
    pub fn edge_phase(&self, batch: &[ClassFact]) -> Vec<Operation> {
        let mut calls = Vec::new();
        let mut implements = Vec::new();
        let mut uses = Vec::new();

        for fact in batch {
            let class_key = fact.key();

            for interface in non_empty(&fact.implements) {
                implements.push(self.edge_from(
                    EdgeKind::Implement,
                    Selector::Key(IdentityKey::class(interface)),
                    Selector::Key(class_key.clone()),
                ));
            }
            for used in non_empty(&fact.used_types).chain(non_empty(&fact.annotations)) {
                uses.push(self.edge_to(
                    EdgeKind::Use,
                    Selector::Key(class_key.clone()),
                    Selector::Key(IdentityKey::class(used)),
                ));
            }
            if let Some(annotation) = fact.handles_annotation.as_deref().filter(|a| !a.is_empty())
            {
                uses.push(self.edge_from(
                    EdgeKind::Use,
                    Selector::Key(IdentityKey::class(annotation)),
                    Selector::Key(class_key.clone()),
                ));
            }

            for method in &fact.methods {
                let method_key = fact.method_key(method);

                for callee in non_empty(&method.calls) {
                    calls.push(self.edge_to(
                        EdgeKind::Call,
                        Selector::Key(method_key.clone()),
                        Selector::MethodName(callee.to_string()),
                    ));
                }
                for parent in non_empty(&method.inheritance) {
                    implements.push(self.edge_from(
                        EdgeKind::Implement,
                        Selector::MethodName(parent.to_string()),
                        Selector::Key(method_key.clone()),
                    ));
                }
                for used in non_empty(&method.used_types).chain(non_empty(&method.annotations)) {
                    uses.push(self.edge_to(
                        EdgeKind::Use,
                        Selector::Key(method_key.clone()),
                        Selector::Key(IdentityKey::class(used)),
                    ));
                }
                if let Some(annotation) =
                    method.handles_annotation.as_deref().filter(|a| !a.is_empty())
                {
                    uses.push(self.edge_from(
                        EdgeKind::Use,
                        Selector::Key(IdentityKey::class(annotation)),
                        Selector::Key(method_key.clone()),
                    ));
                }
            }
        }

        calls.extend(implements);
        calls.extend(uses);
        calls
    }

    /// Identities of the batch whose current-branch node the node phase
    /// deletes.
    pub fn replaced_keys(batch: &[ClassFact], verdicts: &Verdicts) -> Vec<IdentityKey> {
        batch
            .iter()
            .flat_map(ClassFact::identity_keys)
            .filter(|key| verdicts.replaces_current(key))
            .collect()
    }

    fn delete(&self, identity: IdentityKey) -> Operation {
        Operation::DeleteNodes {
            project_id: self.ctx.project_id.clone(),
            branch: self.ctx.branch.clone(),
            identity,
            pull_request_id: self.ctx.pr_scope().map(str::to_string),
        }
    }

    /// An edge from a node of the fact to a node it refers to.
    fn edge_to(&self, kind: EdgeKind, owned: Selector, referenced: Selector) -> Operation {
        self.edge(
            kind,
            Endpoint::new(owned, self.owned.clone()),
            Endpoint::new(referenced, self.referenced.clone()),
        )
    }

    /// An edge from a node the fact refers to into a node of the fact.
    fn edge_from(&self, kind: EdgeKind, referenced: Selector, owned: Selector) -> Operation {
        self.edge(
            kind,
            Endpoint::new(referenced, self.referenced.clone()),
            Endpoint::new(owned, self.owned.clone()),
        )
    }

    fn edge(&self, kind: EdgeKind, source: Endpoint, target: Endpoint) -> Operation {
        Operation::CreateEdge {
            project_id: self.ctx.project_id.clone(),
            kind,
            source,
            target,
        }
    }

    fn class_record(&self, fact: &ClassFact, status: NodeStatus) -> NodeRecord {
        NodeRecord {
            label: fact.label(),
            name: fact.name.clone(),
            class_name: fact.full_class_name.clone(),
            method_name: None,
            file_path: fact.file_path.clone(),
            content: escape_content(&fact.content),
            ast_hash: Some(fact.ast_hash.clone()).filter(|h| !h.is_empty()),
            project_id: self.ctx.project_id.clone(),
            branch: self.ctx.branch.clone(),
            version: self.ctx.version.clone(),
            status,
            base_branch: self.ctx.base_branch.clone(),
            base_version: self.ctx.base_version.clone(),
            pull_request_id: self.ctx.pr_scope().map(str::to_string),
            endpoint: BTreeMap::new(),
        }
    }

    fn method_record(
        &self,
        fact: &ClassFact,
        method: &MethodFact,
        status: NodeStatus,
    ) -> NodeRecord {
        NodeRecord {
            label: method.label(),
            name: method.name.clone(),
            class_name: fact.full_class_name.clone(),
            method_name: Some(method.full_name.clone()),
            file_path: fact.file_path.clone(),
            content: method.content(),
            ast_hash: method.ast_hash.clone(),
            project_id: self.ctx.project_id.clone(),
            branch: self.ctx.branch.clone(),
            version: self.ctx.version.clone(),
            status,
            base_branch: self.ctx.base_branch.clone(),
            base_version: self.ctx.base_version.clone(),
            pull_request_id: self.ctx.pr_scope().map(str::to_string),
            endpoint: method.endpoint_metadata(),
        }
    }
}

fn non_empty(names: &[String]) -> impl Iterator<Item = &str> {
    names.iter().map(String::as_str).filter(|n| !n.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::Verdict;
    use grove_core::{ClassKind, Endpoint as HttpEndpoint, MethodKind, NodeLabel};

    fn billing() -> ClassFact {
        ClassFact::new("1", "feature", "a.Billing", "h1")
            .with_implements(["a.Payable"])
            .with_used_types(["a.Money"])
            .with_method(
                MethodFact::new("charge(int)", "h2")
                    .with_calls(["audit()", ""])
                    .with_inheritance(["pay(int)"])
                    .with_used_types(["a.Card"]),
            )
    }

    fn edges(ops: &[Operation]) -> Vec<(EdgeKind, Selector, Selector)> {
        ops.iter()
            .filter_map(|op| match op {
                Operation::CreateEdge {
                    kind,
                    source,
                    target,
                    ..
                } => Some((*kind, source.selector.clone(), target.selector.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_node_phase_skips_unchanged() {
        let ctx = SyncContext::new("1", "feature");
        let fact = billing();
        let mut verdicts = Verdicts::default();
        verdicts.insert(fact.key(), Verdict::Unchanged);
        verdicts.insert(fact.method_key(&fact.methods[0]), Verdict::Changed);

        let ops = MutationGenerator::new(&ctx).node_phase(&[fact], &verdicts);
        let names: Vec<_> = ops.iter().map(Operation::name).collect();
        // No comparison in place: both current-branch nodes go, one returns.
        assert_eq!(names, vec!["delete_nodes", "delete_nodes", "create_node"]);
    }

    #[test]
    fn test_records_carry_run_metadata() {
        let mut ctx = SyncContext::new("1", "feature");
        ctx.version = "v3".into();
        ctx.main_branch = Some("main".into());
        ctx.pull_request_id = Some("12".into());

        let fact = ClassFact::new("1", "feature", "a.Api", "h1")
            .with_kind(ClassKind::Configuration)
            .with_method(
                MethodFact::new("get()", "h2")
                    .with_kind(MethodKind::Endpoint)
                    .with_status(NodeStatus::Modified)
                    .with_endpoint(HttpEndpoint {
                        http_method: "GET".into(),
                        path: "/items".into(),
                        ..HttpEndpoint::default()
                    }),
            );
        let mut verdicts = Verdicts::default();
        verdicts.insert(fact.method_key(&fact.methods[0]), Verdict::Changed);

        let ops = MutationGenerator::new(&ctx).node_phase(&[fact], &verdicts);
        let records: Vec<&NodeRecord> = ops
            .iter()
            .filter_map(|op| match op {
                Operation::CreateNode { record } => Some(record),
                _ => None,
            })
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].label, NodeLabel::Configuration);
        assert_eq!(records[0].status, NodeStatus::Active);
        assert_eq!(records[1].label, NodeLabel::Endpoint);
        assert_eq!(records[1].status, NodeStatus::Modified);
        assert_eq!(records[1].endpoint["path"], "/items");
        assert_eq!(records[1].version, "v3");
        assert_eq!(records[1].pull_request_id.as_deref(), Some("12"));
    }

    #[test]
    fn test_relationship_rules() {
        let ctx = SyncContext::new("1", "feature");
        let fact = billing().with_handles_annotation("a.Audited");
        let ops = MutationGenerator::new(&ctx).edge_phase(&[fact]);
        let method = IdentityKey::method("a.Billing", "charge(int)");
        let class = IdentityKey::class("a.Billing");

        assert_eq!(
            edges(&ops),
            vec![
                (
                    EdgeKind::Call,
                    Selector::Key(method.clone()),
                    Selector::MethodName("audit()".into())
                ),
                (
                    EdgeKind::Implement,
                    Selector::Key(IdentityKey::class("a.Payable")),
                    Selector::Key(class.clone())
                ),
                (
                    EdgeKind::Implement,
                    Selector::MethodName("pay(int)".into()),
                    Selector::Key(method.clone())
                ),
                (
                    EdgeKind::Use,
                    Selector::Key(class.clone()),
                    Selector::Key(IdentityKey::class("a.Money"))
                ),
                (
                    EdgeKind::Use,
                    Selector::Key(IdentityKey::class("a.Audited")),
                    Selector::Key(class)
                ),
                (
                    EdgeKind::Use,
                    Selector::Key(method),
                    Selector::Key(IdentityKey::class("a.Card"))
                ),
            ]
        );
    }

    #[test]
    fn test_only_referenced_ends_fall_back() {
        let mut ctx = SyncContext::new("1", "feature");
        ctx.main_branch = Some("main".into());
        let fact = billing().with_handles_annotation("a.Audited");
        let ops = MutationGenerator::new(&ctx).edge_phase(&[fact]);
        let own_class = Selector::Key(IdentityKey::class("a.Billing"));
        let own_method = Selector::Key(IdentityKey::method("a.Billing", "charge(int)"));

        let mut seen = 0;
        for op in ops {
            if let Operation::CreateEdge { source, target, .. } = op {
                let (owned, referenced) =
                    if source.selector == own_class || source.selector == own_method {
                        (source, target)
                    } else {
                        (target, source)
                    };
                assert!(owned.selector == own_class || owned.selector == own_method);
                assert_eq!(owned.branches, current_only("feature"));
                assert_eq!(referenced.branches.len(), 2);
                assert_eq!(referenced.branches[1].branch, "main");
                seen += 1;
            }
        }
        assert_eq!(seen, 6);
    }
}
