//! Generic traversal of the node tree
//!
//! `children` and `map_children` are the only places that know the shape of
//! each node kind. Both match exhaustively, so a new kind cannot be added
//! without deciding how it is traversed.
//!
//! A rule's `parents` are not children: they are links to other rules, and
//! following them would turn every traversal into a walk over the whole rule
//! set.

use crate::ast::NodeIdGenerator;
use crate::semantic::{
    Abattement, Arrondi, Bound, CircularResolution, Condition, ContextAmendment, Contexte, Duree,
    Guard, Node, NodeKind, NodeRef, Operation, ParDefaut, RuleNode, Schedule, TextPart, Tranche,
    UnePossibilite, UnitConversion, VariationBranch,
};
use std::ops::ControlFlow;
use std::sync::Arc;

/// What `transform` does with the node it was handed
pub enum Transform {
    /// Keep the node and its subtree unchanged
    Keep,
    /// Keep the node, transform its children
    Descend,
    /// Use another node; its children are not visited
    Replace(NodeRef),
    /// Use another node and transform its children
    ReplaceAndDescend(NodeRef),
}

/// What `visit` does after handing a node to the visitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitAction {
    Descend,
    Skip,
}

/// Direct children of a node, in evaluation order
pub fn children(node: &Node) -> Vec<&NodeRef> {
    match &node.kind {
        NodeKind::Rule(rule) => {
            let mut children = vec![&rule.valeur];
            children.extend(rule.default_value.iter());
            children.extend(rule.possibilities.iter());
            children
        }
        NodeKind::Reference(_) | NodeKind::Constant(_) | NodeKind::Inversion(_) => Vec::new(),
        NodeKind::Operation(operation) => vec![&operation.left, &operation.right],
        NodeKind::Condition(condition) => vec![&condition.si, &condition.alors, &condition.sinon],
        NodeKind::Variations(branches) => branches
            .iter()
            .flat_map(|branch| [&branch.condition, &branch.consequence])
            .collect(),
        NodeKind::Bareme(schedule) | NodeKind::Grille(schedule) | NodeKind::TauxProgressif(schedule) => {
            let mut children = vec![&schedule.assiette, &schedule.multiplicateur];
            for tranche in &schedule.tranches {
                children.extend(tranche.plafond.iter());
                children.push(&tranche.value);
            }
            children
        }
        NodeKind::Unite(conversion) => vec![&conversion.valeur],
        NodeKind::Arrondi(arrondi) => vec![&arrondi.valeur, &arrondi.precision],
        NodeKind::Contexte(contexte) => {
            let mut children = vec![&contexte.valeur];
            children.extend(contexte.amendments.iter().map(|amendment| &amendment.value));
            children
        }
        NodeKind::UnePossibilite(une_possibilite) => une_possibilite.possibilities.iter().collect(),
        NodeKind::ApplicableSi(guard) | NodeKind::NonApplicableSi(guard) => {
            vec![&guard.condition, &guard.valeur]
        }
        NodeKind::ParDefaut(par_defaut) => vec![&par_defaut.valeur, &par_defaut.default],
        NodeKind::Plancher(bound) | NodeKind::Plafond(bound) => vec![&bound.valeur, &bound.bound],
        NodeKind::Abattement(abattement) => vec![&abattement.valeur, &abattement.abattement],
        NodeKind::EstNonDefini(inner)
        | NodeKind::EstNonApplicable(inner)
        | NodeKind::SimplifierUnite(inner) => vec![inner],
        NodeKind::ResoudreReferenceCirculaire(resolution) => vec![&resolution.valeur],
        NodeKind::Duree(duree) => {
            let mut children = vec![&duree.depuis];
            children.extend(duree.jusqua.iter());
            children
        }
        NodeKind::Texte(parts) => parts
            .iter()
            .filter_map(|part| match part {
                TextPart::Node(node) => Some(node),
                TextPart::Literal(_) => None,
            })
            .collect(),
    }
}

/// Rebuild a node kind with every child passed through `map`
pub fn map_children(kind: &NodeKind, map: &mut dyn FnMut(&NodeRef) -> NodeRef) -> NodeKind {
    let schedule = |schedule: &Schedule, map: &mut dyn FnMut(&NodeRef) -> NodeRef| Schedule {
        assiette: map(&schedule.assiette),
        multiplicateur: map(&schedule.multiplicateur),
        tranches: schedule
            .tranches
            .iter()
            .map(|tranche| Tranche {
                plafond: tranche.plafond.as_ref().map(|plafond| map(plafond)),
                value: map(&tranche.value),
            })
            .collect(),
    };
    let guard = |guard: &Guard, map: &mut dyn FnMut(&NodeRef) -> NodeRef| Guard {
        condition: map(&guard.condition),
        valeur: map(&guard.valeur),
    };
    let bound = |bound: &Bound, map: &mut dyn FnMut(&NodeRef) -> NodeRef| Bound {
        valeur: map(&bound.valeur),
        bound: map(&bound.bound),
    };

    match kind {
        NodeKind::Rule(rule) => NodeKind::Rule(RuleNode {
            valeur: map(&rule.valeur),
            default_value: rule.default_value.as_ref().map(|node| map(node)),
            possibilities: rule.possibilities.as_ref().map(|node| map(node)),
            ..rule.clone()
        }),
        NodeKind::Reference(_) | NodeKind::Constant(_) | NodeKind::Inversion(_) => kind.clone(),
        NodeKind::Operation(operation) => NodeKind::Operation(Operation {
            operator: operation.operator,
            left: map(&operation.left),
            right: map(&operation.right),
        }),
        NodeKind::Condition(condition) => NodeKind::Condition(Condition {
            si: map(&condition.si),
            alors: map(&condition.alors),
            sinon: map(&condition.sinon),
        }),
        NodeKind::Variations(branches) => NodeKind::Variations(
            branches
                .iter()
                .map(|branch| VariationBranch {
                    condition: map(&branch.condition),
                    consequence: map(&branch.consequence),
                })
                .collect(),
        ),
        NodeKind::Bareme(s) => NodeKind::Bareme(schedule(s, map)),
        NodeKind::Grille(s) => NodeKind::Grille(schedule(s, map)),
        NodeKind::TauxProgressif(s) => NodeKind::TauxProgressif(schedule(s, map)),
        NodeKind::Unite(conversion) => NodeKind::Unite(UnitConversion {
            valeur: map(&conversion.valeur),
            unit: conversion.unit.clone(),
        }),
        NodeKind::Arrondi(arrondi) => NodeKind::Arrondi(Arrondi {
            valeur: map(&arrondi.valeur),
            precision: map(&arrondi.precision),
        }),
        NodeKind::Contexte(contexte) => NodeKind::Contexte(Contexte {
            valeur: map(&contexte.valeur),
            amendments: contexte
                .amendments
                .iter()
                .map(|amendment| ContextAmendment {
                    target: amendment.target.clone(),
                    value: map(&amendment.value),
                })
                .collect(),
        }),
        NodeKind::UnePossibilite(une_possibilite) => NodeKind::UnePossibilite(UnePossibilite {
            possibilities: une_possibilite.possibilities.iter().map(|node| map(node)).collect(),
            mandatory: une_possibilite.mandatory,
        }),
        NodeKind::ApplicableSi(g) => NodeKind::ApplicableSi(guard(g, map)),
        NodeKind::NonApplicableSi(g) => NodeKind::NonApplicableSi(guard(g, map)),
        NodeKind::ParDefaut(par_defaut) => NodeKind::ParDefaut(ParDefaut {
            valeur: map(&par_defaut.valeur),
            default: map(&par_defaut.default),
        }),
        NodeKind::Plancher(b) => NodeKind::Plancher(bound(b, map)),
        NodeKind::Plafond(b) => NodeKind::Plafond(bound(b, map)),
        NodeKind::Abattement(abattement) => NodeKind::Abattement(Abattement {
            valeur: map(&abattement.valeur),
            abattement: map(&abattement.abattement),
        }),
        NodeKind::EstNonDefini(inner) => NodeKind::EstNonDefini(map(inner)),
        NodeKind::EstNonApplicable(inner) => NodeKind::EstNonApplicable(map(inner)),
        NodeKind::SimplifierUnite(inner) => NodeKind::SimplifierUnite(map(inner)),
        NodeKind::ResoudreReferenceCirculaire(resolution) => {
            NodeKind::ResoudreReferenceCirculaire(CircularResolution {
                valeur: map(&resolution.valeur),
                rule: resolution.rule.clone(),
            })
        }
        NodeKind::Duree(duree) => NodeKind::Duree(Duree {
            depuis: map(&duree.depuis),
            jusqua: duree.jusqua.as_ref().map(|node| map(node)),
            unit: duree.unit.clone(),
        }),
        NodeKind::Texte(parts) => NodeKind::Texte(
            parts
                .iter()
                .map(|part| match part {
                    TextPart::Node(node) => TextPart::Node(map(node)),
                    TextPart::Literal(text) => TextPart::Literal(text.clone()),
                })
                .collect(),
        ),
    }
}

/// Depth-first rewrite
///
/// A node whose subtree is left untouched keeps its identity (and its id);
/// any change produces new nodes up to the root.
pub fn transform<F>(node: &NodeRef, f: &mut F, ids: &NodeIdGenerator) -> NodeRef
where
    F: FnMut(&NodeRef) -> Transform,
{
    match f(node) {
        Transform::Keep => node.clone(),
        Transform::Descend => rebuild(node, f, ids),
        Transform::Replace(replacement) => replacement,
        Transform::ReplaceAndDescend(replacement) => rebuild(&replacement, f, ids),
    }
}

fn rebuild<F>(node: &NodeRef, f: &mut F, ids: &NodeIdGenerator) -> NodeRef
where
    F: FnMut(&NodeRef) -> Transform,
{
    let mut changed = false;
    let kind = map_children(&node.kind, &mut |child| {
        let rewritten = transform(child, f, ids);
        changed |= !Arc::ptr_eq(&rewritten, child);
        rewritten
    });
    if changed {
        Node::new(kind, ids)
    } else {
        node.clone()
    }
}

/// Read-only depth-first traversal
pub fn visit<F>(node: &NodeRef, f: &mut F)
where
    F: FnMut(&NodeRef) -> VisitAction,
{
    if f(node) == VisitAction::Skip {
        return;
    }
    for child in children(node) {
        visit(child, f);
    }
}

/// Fold over the tree
///
/// `Break(value)` is the result for the node and its subtree;
/// `Continue(acc)` folds the children starting from `acc`.
pub fn reduce<T, F>(node: &NodeRef, f: &mut F, seed: T) -> T
where
    F: FnMut(T, &NodeRef) -> ControlFlow<T, T>,
{
    match f(seed, node) {
        ControlFlow::Break(value) => value,
        ControlFlow::Continue(acc) => children(node)
            .into_iter()
            .fold(acc, |acc, child| reduce(child, f, acc)),
    }
}
