//! Type and nullability inference
//!
//! One structural pass per node, memoized by node id. References are
//! followed into the rule they designate; a node is seeded with an unknown
//! placeholder before its children are inferred, so reference cycles
//! terminate.

use crate::ast::NodeId;
use crate::evaluated::NodeValue;
use crate::parser::ParsedRules;
use crate::semantic::{NodeKind, NodeRef, Operator, ValueType};
use crate::traversal::{visit, VisitAction};
use serde::Serialize;
use std::collections::HashMap;

/// What is statically known about the result of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct InferredType {
    /// The node may evaluate to not applicable
    pub nullable: bool,
    pub value_type: Option<ValueType>,
}

impl InferredType {
    fn new(nullable: bool, value_type: Option<ValueType>) -> Self {
        Self {
            nullable,
            value_type,
        }
    }

    /// Whether the node can disable the rules below it
    pub fn can_disable(&self) -> bool {
        self.nullable || self.value_type == Some(ValueType::Boolean)
    }

    fn or(self, other: InferredType) -> InferredType {
        InferredType {
            nullable: self.nullable || other.nullable,
            value_type: self.value_type.or(other.value_type),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    types: HashMap<NodeId, InferredType>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<InferredType> {
        self.types.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Forget every node of the given subtrees
    pub fn invalidate<'a>(&mut self, roots: impl IntoIterator<Item = &'a NodeRef>) {
        for root in roots {
            visit(root, &mut |node| {
                self.types.remove(&node.id);
                VisitAction::Descend
            });
        }
    }

    pub fn infer(&mut self, node: &NodeRef, rules: &ParsedRules) -> InferredType {
        if let Some(known) = self.types.get(&node.id) {
            return *known;
        }
        self.types.insert(node.id, InferredType::default());
        let inferred = self.infer_kind(node, rules);
        self.types.insert(node.id, inferred);
        inferred
    }

    fn infer_kind(&mut self, node: &NodeRef, rules: &ParsedRules) -> InferredType {
        match &node.kind {
            NodeKind::Rule(rule) => {
                let mut inferred = self.infer(&rule.valeur, rules);
                if let Some(default) = &rule.default_value {
                    let default = self.infer(default, rules);
                    inferred.value_type = inferred.value_type.or(default.value_type);
                }
                if let Some(possibilities) = &rule.possibilities {
                    let possibilities = self.infer(possibilities, rules);
                    inferred.value_type = inferred.value_type.or(possibilities.value_type);
                }
                for parent in &rule.parents {
                    if self.infer(parent, rules).can_disable() {
                        inferred.nullable = true;
                    }
                }
                inferred
            }
            NodeKind::Reference(reference) => {
                match reference.dotted_name.as_ref().and_then(|name| rules.get(name)) {
                    Some(rule) => {
                        let rule = rule.clone();
                        self.infer(&rule, rules)
                    }
                    None => InferredType::default(),
                }
            }
            NodeKind::Constant(constant) => match &constant.value {
                NodeValue::Value(value) => InferredType::new(false, Some(value.value_type())),
                NodeValue::NotApplicable => InferredType::new(true, None),
                NodeValue::Undefined => InferredType::default(),
            },
            NodeKind::Operation(operation) => {
                let left = self.infer(&operation.left, rules);
                let right = self.infer(&operation.right, rules);
                match operation.operator {
                    Operator::And | Operator::Or => {
                        InferredType::new(false, Some(ValueType::Boolean))
                    }
                    Operator::Add | Operator::Subtract | Operator::Min | Operator::Max => {
                        InferredType::new(
                            left.nullable && right.nullable,
                            left.value_type.or(right.value_type),
                        )
                    }
                    Operator::Equal | Operator::NotEqual => {
                        InferredType::new(false, Some(ValueType::Boolean))
                    }
                    operator if operator.is_comparison() => InferredType::new(
                        left.nullable || right.nullable,
                        Some(ValueType::Boolean),
                    ),
                    _ => InferredType::new(left.nullable || right.nullable, Some(ValueType::Number)),
                }
            }
            NodeKind::Condition(condition) => {
                self.infer(&condition.si, rules);
                let alors = self.infer(&condition.alors, rules);
                let sinon = self.infer(&condition.sinon, rules);
                alors.or(sinon)
            }
            NodeKind::Variations(branches) => {
                let mut inferred = InferredType::default();
                for branch in branches {
                    self.infer(&branch.condition, rules);
                    inferred = inferred.or(self.infer(&branch.consequence, rules));
                }
                inferred
            }
            NodeKind::Bareme(schedule)
            | NodeKind::Grille(schedule)
            | NodeKind::TauxProgressif(schedule) => {
                let assiette = self.infer(&schedule.assiette, rules);
                self.infer(&schedule.multiplicateur, rules);
                for tranche in &schedule.tranches {
                    if let Some(plafond) = &tranche.plafond {
                        self.infer(plafond, rules);
                    }
                    self.infer(&tranche.value, rules);
                }
                InferredType::new(assiette.nullable, Some(ValueType::Number))
            }
            NodeKind::Unite(conversion) => self.infer(&conversion.valeur, rules),
            NodeKind::Arrondi(arrondi) => {
                self.infer(&arrondi.precision, rules);
                self.infer(&arrondi.valeur, rules)
            }
            NodeKind::Inversion(_) => InferredType::new(false, Some(ValueType::Number)),
            NodeKind::Contexte(contexte) => {
                for amendment in &contexte.amendments {
                    self.infer(&amendment.value, rules);
                }
                self.infer(&contexte.valeur, rules)
            }
            NodeKind::UnePossibilite(une_possibilite) => {
                let mut value_type = None;
                for possibility in &une_possibilite.possibilities {
                    let possibility_type = match &possibility.kind {
                        NodeKind::Reference(_) => Some(ValueType::Text),
                        _ => self.infer(possibility, rules).value_type,
                    };
                    value_type = value_type.or(possibility_type);
                }
                InferredType::new(false, value_type)
            }
            NodeKind::ApplicableSi(guard) | NodeKind::NonApplicableSi(guard) => {
                self.infer(&guard.condition, rules);
                let valeur = self.infer(&guard.valeur, rules);
                InferredType::new(true, valeur.value_type)
            }
            NodeKind::ParDefaut(par_defaut) => {
                let valeur = self.infer(&par_defaut.valeur, rules);
                let default = self.infer(&par_defaut.default, rules);
                InferredType::new(valeur.nullable, valeur.value_type.or(default.value_type))
            }
            NodeKind::Plancher(bound) | NodeKind::Plafond(bound) => {
                self.infer(&bound.bound, rules);
                self.infer(&bound.valeur, rules)
            }
            NodeKind::Abattement(abattement) => {
                self.infer(&abattement.abattement, rules);
                self.infer(&abattement.valeur, rules)
            }
            NodeKind::EstNonDefini(inner) | NodeKind::EstNonApplicable(inner) => {
                self.infer(inner, rules);
                InferredType::new(false, Some(ValueType::Boolean))
            }
            NodeKind::SimplifierUnite(inner) => self.infer(inner, rules),
            NodeKind::ResoudreReferenceCirculaire(resolution) => {
                self.infer(&resolution.valeur, rules)
            }
            NodeKind::Duree(duree) => {
                let depuis = self.infer(&duree.depuis, rules);
                let jusqua = duree
                    .jusqua
                    .as_ref()
                    .map(|jusqua| self.infer(jusqua, rules))
                    .unwrap_or_default();
                InferredType::new(depuis.nullable || jusqua.nullable, Some(ValueType::Number))
            }
            NodeKind::Texte(_) => {
                for child in crate::traversal::children(node) {
                    self.infer(child, rules);
                }
                InferredType::new(false, Some(ValueType::Text))
            }
        }
    }
}
