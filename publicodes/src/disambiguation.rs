//! Reference resolution
//!
//! A name written in rule `C` is looked up as `C . name`, then in each
//! ancestor namespace of `C` (nearest first), then at the root. `C` itself
//! only matches when nothing else does. Leading `^` segments start the
//! search that many levels above `C`.
//!
//! A private rule is visible from its own subtree, from its parent's subtree
//! (siblings and their children) and from nowhere else.

use crate::ast::NodeIdGenerator;
use crate::error::EngineError;
use crate::parser::ParsedRules;
use crate::semantic::{
    ancestors, join_name, parent_name, split_name, Contexte, ContextAmendment, Inversion, Node,
    NodeKind, NodeRef, Reference, ReferenceName, ReplacementRule, RuleNode, SEPARATOR,
};
use crate::traversal::{transform, visit, Transform, VisitAction};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

const PARENT_ESCAPE: &str = "^";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("unknown rule \"{name}\"")]
    NotFound { name: String },

    #[error("rule \"{target}\" is private and cannot be referenced from \"{context}\"")]
    Inaccessible { target: String, context: String },
}

/// Fully-qualified names `name` may designate from `context`, in lookup
/// order, and whether it may also designate `context` itself
fn lookup(name: &str, context: &str) -> (Vec<String>, bool) {
    let mut segments = split_name(name);
    let mut start = context;
    while segments.first() == Some(&PARENT_ESCAPE) {
        segments.remove(0);
        start = parent_name(start).unwrap_or("");
    }
    let rest = segments.join(SEPARATOR);

    let mut namespaces = vec![start];
    namespaces.extend(ancestors(start));
    if !start.is_empty() {
        namespaces.push("");
    }

    let mut candidates: Vec<String> = Vec::new();
    let mut designates_self = false;
    for namespace in namespaces {
        let candidate = join_name(namespace, &rest);
        if candidate == context {
            designates_self = true;
        } else if !candidate.is_empty() && !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }
    (candidates, designates_self)
}

/// Fully-qualified names `name` may designate from `context`, in lookup order
///
/// `context` itself is never part of the list.
pub fn candidates(name: &str, context: &str) -> Vec<String> {
    lookup(name, context).0
}

/// Nearest namespace containing both names
fn common_ancestor<'a>(a: &'a str, b: &str) -> &'a str {
    let mut namespace = a;
    loop {
        if b == namespace || b.starts_with(&format!("{}{}", namespace, SEPARATOR)) {
            return namespace;
        }
        match parent_name(namespace) {
            Some(parent) => namespace = parent,
            None => return "",
        }
    }
}

/// Whether `target` may be referenced from `context`
pub fn is_accessible(rules: &ParsedRules, context: &str, target: &str) -> bool {
    let common = common_ancestor(context, target);
    let mut chain = vec![target];
    chain.extend(ancestors(target));
    let position = if common.is_empty() {
        chain.len()
    } else {
        chain.iter().position(|name| *name == common).unwrap_or(0)
    };
    // The child of the common ancestor is a sibling of the context: not checked
    let checked = position.saturating_sub(1);
    chain[..checked].iter().all(|name| {
        rules
            .get(*name)
            .and_then(|rule| rule.as_rule())
            .map_or(true, |rule| !rule.private)
    })
}

/// Resolve a written name to the dotted name of an existing rule
pub fn resolve_name(
    name: &str,
    context: &str,
    rules: &ParsedRules,
) -> Result<String, ResolutionError> {
    let (candidates, designates_self) = lookup(name, context);
    let mut inaccessible = None;
    for candidate in candidates {
        if !rules.contains_key(&candidate) {
            continue;
        }
        if is_accessible(rules, context, &candidate) {
            return Ok(candidate);
        }
        inaccessible.get_or_insert(candidate);
    }
    if designates_self && rules.contains_key(context) {
        return Ok(context.to_string());
    }

    match inaccessible {
        Some(target) => Err(ResolutionError::Inaccessible {
            target,
            context: context.to_string(),
        }),
        None => Err(ResolutionError::NotFound {
            name: name.to_string(),
        }),
    }
}

fn resolve(
    name: &ReferenceName,
    context: &str,
    rules: &ParsedRules,
) -> Result<ReferenceName, EngineError> {
    if name.dotted_name.is_some() {
        return Ok(name.clone());
    }
    let dotted_name = resolve_name(&name.name, context, rules)
        .map_err(|error| EngineError::syntax(context, error.to_string()))?;
    Ok(ReferenceName {
        name: name.name.clone(),
        dotted_name: Some(dotted_name),
    })
}

fn resolve_namespace(namespace: &str, context: &str, rules: &ParsedRules) -> Result<String, EngineError> {
    resolve_name(namespace, context, rules)
        .map_err(|error| EngineError::syntax(context, error.to_string()))
}

/// Bind every reference of a rule to a dotted name
///
/// Parent links are recomputed too, since an added rule may become a parent.
pub fn disambiguate_rule(
    rule: &NodeRef,
    rules: &ParsedRules,
    ids: &NodeIdGenerator,
) -> Result<NodeRef, EngineError> {
    let Some(rule_node) = rule.as_rule() else {
        return Err(EngineError::Internal(format!(
            "{} is not a rule node",
            rule.kind.name()
        )));
    };
    let rule_name = rule_node.dotted_name.as_str();

    let replacements = rule_node
        .replacements
        .iter()
        .map(|replacement| {
            let whitelist = replacement
                .whitelist
                .iter()
                .map(|namespace| resolve_namespace(namespace, rule_name, rules))
                .collect::<Result<Vec<_>, _>>()?;
            let blacklist = replacement
                .blacklist
                .iter()
                .map(|namespace| resolve_namespace(namespace, rule_name, rules))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Arc::new(ReplacementRule {
                replaced: resolve(&replacement.replaced, rule_name, rules)?,
                whitelist,
                blacklist,
                ..replacement.as_ref().clone()
            }))
        })
        .collect::<Result<Vec<_>, EngineError>>()?;

    let parents = ancestors(rule_name)
        .into_iter()
        .filter(|ancestor| rules.contains_key(*ancestor))
        .map(|ancestor| Node::resolved_reference(ancestor, rule_name, ids))
        .collect();

    let linked = Node::new(
        NodeKind::Rule(RuleNode {
            parents,
            replacements,
            ..rule_node.clone()
        }),
        ids,
    );

    disambiguate_node(&linked, rule_name, rules, ids)
}

/// Bind the references of any node, `context` being the rule it belongs to
pub fn disambiguate_node(
    node: &NodeRef,
    context: &str,
    rules: &ParsedRules,
    ids: &NodeIdGenerator,
) -> Result<NodeRef, EngineError> {
    let mut failure: Option<EngineError> = None;
    let resolved = transform(
        node,
        &mut |node| {
            if failure.is_some() {
                return Transform::Keep;
            }
            match resolve_node(node, context, rules, ids) {
                Ok(transform) => transform,
                Err(error) => {
                    failure = Some(error);
                    Transform::Keep
                }
            }
        },
        ids,
    );
    match failure {
        Some(error) => Err(error),
        None => Ok(resolved),
    }
}

fn resolve_node(
    node: &NodeRef,
    rule_name: &str,
    rules: &ParsedRules,
    ids: &NodeIdGenerator,
) -> Result<Transform, EngineError> {
    match &node.kind {
        NodeKind::Reference(reference) if reference.dotted_name.is_none() => {
            let dotted_name = resolve_name(&reference.name, &reference.context, rules)
                .map_err(|error| EngineError::syntax(&reference.context, error.to_string()))?;
            Ok(Transform::Replace(Node::new(
                NodeKind::Reference(Reference {
                    dotted_name: Some(dotted_name),
                    ..reference.clone()
                }),
                ids,
            )))
        }
        NodeKind::Contexte(contexte) => {
            let amendments = contexte
                .amendments
                .iter()
                .map(|amendment| {
                    let target = resolve(&amendment.target, rule_name, rules)?;
                    let amendable = rules
                        .get(target.resolved())
                        .and_then(|rule| rule.as_rule())
                        .is_some_and(|rule| !rule.private && !rule.situation_seam);
                    if !amendable {
                        return Err(EngineError::syntax(
                            rule_name,
                            format!("\"contexte\" cannot amend private rule \"{}\"", target),
                        ));
                    }
                    Ok(ContextAmendment {
                        target,
                        value: amendment.value.clone(),
                    })
                })
                .collect::<Result<Vec<_>, EngineError>>()?;
            Ok(Transform::ReplaceAndDescend(Node::new(
                NodeKind::Contexte(Contexte {
                    valeur: contexte.valeur.clone(),
                    amendments,
                }),
                ids,
            )))
        }
        NodeKind::Inversion(inversion) => {
            let candidates = inversion
                .candidates
                .iter()
                .map(|candidate| resolve(candidate, rule_name, rules))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Transform::Replace(Node::new(
                NodeKind::Inversion(Inversion {
                    candidates,
                    ..inversion.clone()
                }),
                ids,
            )))
        }
        _ => Ok(Transform::Descend),
    }
}

/// Rule names a resolved rule depends on, its own situation seam excluded
pub fn references_of(rule: &NodeRef) -> BTreeSet<String> {
    let mut references = BTreeSet::new();
    let own_seam = rule
        .as_rule()
        .map(|rule| crate::semantic::situation_name(&rule.dotted_name));
    visit(rule, &mut |node| {
        match &node.kind {
            NodeKind::Reference(Reference {
                dotted_name: Some(dotted_name),
                ..
            }) if Some(dotted_name) != own_seam.as_ref() => {
                references.insert(dotted_name.clone());
            }
            NodeKind::Contexte(contexte) => {
                references.extend(
                    contexte
                        .amendments
                        .iter()
                        .map(|amendment| amendment.target.resolved().to_string()),
                );
            }
            NodeKind::Inversion(inversion) => {
                references.extend(
                    inversion
                        .candidates
                        .iter()
                        .map(|candidate| candidate.resolved().to_string()),
                );
            }
            _ => {}
        }
        VisitAction::Descend
    });
    references
}

/// Names written in a rule before resolution, with the rule they were written in
pub fn written_references(rule: &NodeRef) -> Vec<(String, String)> {
    let mut written = Vec::new();
    let rule_name = rule
        .as_rule()
        .map(|rule| rule.dotted_name.clone())
        .unwrap_or_default();
    visit(rule, &mut |node| {
        match &node.kind {
            NodeKind::Reference(reference) if reference.dotted_name.is_none() => {
                written.push((reference.name.clone(), reference.context.clone()));
            }
            NodeKind::Contexte(contexte) => written.extend(
                contexte
                    .amendments
                    .iter()
                    .map(|amendment| (amendment.target.name.clone(), rule_name.clone())),
            ),
            NodeKind::Inversion(inversion) => written.extend(
                inversion
                    .candidates
                    .iter()
                    .map(|candidate| (candidate.name.clone(), rule_name.clone())),
            ),
            _ => {}
        }
        VisitAction::Descend
    });
    if let Some(rule_node) = rule.as_rule() {
        for replacement in &rule_node.replacements {
            written.push((replacement.replaced.name.clone(), rule_name.clone()));
        }
    }
    written
}
