//! Replacement compilation
//!
//! Every reference to a replaced rule becomes a `variations` node: one
//! branch per applicable replacement, tried in priority order, and a last
//! branch falling back to the original reference. Many reference sites see
//! the same replacements, so compiled nodes are shared through a table keyed
//! by the ordered list of replacement ids.

use crate::ast::NodeIdGenerator;
use crate::parser::ParsedRules;
use crate::semantic::{
    is_within, Condition, Node, NodeKind, NodeRef, ReplacementId, ReplacementKind,
    ReplacementRule, VariationBranch,
};
use crate::traversal::{transform, Transform};
use std::collections::HashMap;
use std::sync::Arc;

/// Replacements of a rule set, indexed by replaced rule, with the compiled
/// `variations` nodes
#[derive(Debug, Clone, Default)]
pub struct ReplacementTable {
    by_target: HashMap<String, Vec<Arc<ReplacementRule>>>,
    compiled: HashMap<Vec<ReplacementId>, NodeRef>,
}

impl ReplacementTable {
    /// Index the replacements declared by resolved rules
    pub fn new(rules: &ParsedRules) -> Self {
        let mut by_target: HashMap<String, Vec<Arc<ReplacementRule>>> = HashMap::new();
        for rule in rules.values().filter_map(|rule| rule.as_rule()) {
            for replacement in &rule.replacements {
                by_target
                    .entry(replacement.replaced.resolved().to_string())
                    .or_default()
                    .push(replacement.clone());
            }
        }
        for replacements in by_target.values_mut() {
            replacements.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| a.definition_rule.cmp(&b.definition_rule))
                    .then_with(|| a.id.cmp(&b.id))
            });
        }
        Self {
            by_target,
            compiled: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }

    /// Number of distinct compiled `variations` nodes
    pub fn compiled_count(&self) -> usize {
        self.compiled.len()
    }

    /// Replacements of `target` that apply to a reference written in `context`,
    /// in the order they are tried
    pub fn applicable(&self, target: &str, context: &str) -> Vec<&Arc<ReplacementRule>> {
        let Some(replacements) = self.by_target.get(target) else {
            return Vec::new();
        };
        replacements
            .iter()
            .filter(|replacement| !is_within(context, &replacement.definition_rule))
            .filter(|replacement| {
                replacement.whitelist.is_empty()
                    || replacement
                        .whitelist
                        .iter()
                        .any(|namespace| is_within(context, namespace))
            })
            .filter(|replacement| {
                !replacement
                    .blacklist
                    .iter()
                    .any(|namespace| is_within(context, namespace))
            })
            .collect()
    }

    /// Rewrite every replaced reference of a rule
    pub fn apply(&mut self, rule: &NodeRef, ids: &NodeIdGenerator) -> NodeRef {
        if self.by_target.is_empty() {
            return rule.clone();
        }
        transform(
            rule,
            &mut |node| {
                let NodeKind::Reference(reference) = &node.kind else {
                    return Transform::Descend;
                };
                let Some(target) = reference.dotted_name.as_deref() else {
                    return Transform::Keep;
                };
                let applicable: Vec<Arc<ReplacementRule>> = self
                    .applicable(target, &reference.context)
                    .into_iter()
                    .cloned()
                    .collect();
                if applicable.is_empty() {
                    return Transform::Keep;
                }
                let key: Vec<ReplacementId> =
                    applicable.iter().map(|replacement| replacement.id.clone()).collect();
                let compiled = self
                    .compiled
                    .entry(key)
                    .or_insert_with(|| compile(node, &applicable, ids));
                Transform::Replace(compiled.clone())
            },
            ids,
        )
    }
}

fn compile(
    original: &NodeRef,
    replacements: &[Arc<ReplacementRule>],
    ids: &NodeIdGenerator,
) -> NodeRef {
    let mut branches: Vec<VariationBranch> = replacements
        .iter()
        .map(|replacement| {
            let declaring =
                Node::resolved_reference(&replacement.definition_rule, &replacement.definition_rule, ids);
            let applicable = Node::new(
                NodeKind::Condition(Condition {
                    si: Node::new(NodeKind::EstNonApplicable(declaring.clone()), ids),
                    alors: Node::boolean(false, ids),
                    sinon: Node::boolean(true, ids),
                }),
                ids,
            );
            let consequence = match replacement.kind {
                ReplacementKind::Value => declaring,
                ReplacementKind::NotApplicable => Node::not_applicable(ids),
            };
            VariationBranch {
                condition: applicable,
                consequence,
            }
        })
        .collect();
    branches.push(VariationBranch {
        condition: Node::boolean(true, ids),
        consequence: original.clone(),
    });
    Node::new(NodeKind::Variations(branches), ids)
}
