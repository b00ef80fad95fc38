//! Tree-walking evaluator
//!
//! Evaluating a node is a cache lookup by node id; on a miss the node is
//! dispatched on its kind, and the result is memoized before it is returned,
//! unless it relied on a parent check skipped by re-entrancy.
//! Three-valued results flow through every kind: a value, "not applicable"
//! or "undefined", each carrying the missing inputs of its operands.
//!
//! - `operations` - operators, short-circuiting and unit propagation
//! - `mechanisms` - conditions, schedules, rounding and the other mechanisms
//! - `rules` - references, rule evaluation, disabling parents and cycles
//! - `contexte` - evaluation under amended situations

pub mod cache;
mod contexte;
pub(crate) mod mechanisms;
pub mod operations;
mod rules;

pub use cache::Cache;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::evaluated::{EvaluatedNode, MissingVariables, NodeValue};
use crate::semantic::{LiteralValue, NodeKind, NodeRef};
use crate::EngineResult;

impl Engine {
    /// Evaluate a compiled node against the current situation
    pub(crate) fn evaluate_node(&mut self, node: &NodeRef) -> EngineResult<EvaluatedNode> {
        if let Some(cached) = self.cache.nodes.get(&node.id) {
            let cached = cached.clone();
            if let Some(traversed) = &cached.traversed_variables {
                self.cache.record_traversed(traversed);
            }
            return Ok(cached);
        }

        let assumed = self.cache.assumed.len();
        let evaluated = match &node.kind {
            NodeKind::Rule(rule) => self.evaluate_rule(node, rule)?,
            NodeKind::Reference(reference) => self.evaluate_reference(node, reference)?,
            NodeKind::Constant(constant) => EvaluatedNode::new(node.clone(), constant.value.clone())
                .with_unit(constant.unit.clone()),
            NodeKind::Operation(operation) => self.evaluate_operation(node, operation)?,
            NodeKind::Condition(condition) => self.evaluate_condition(node, condition)?,
            NodeKind::Variations(branches) => self.evaluate_variations(node, branches)?,
            NodeKind::Bareme(schedule) => self.evaluate_bareme(node, schedule)?,
            NodeKind::Grille(schedule) => self.evaluate_grille(node, schedule)?,
            NodeKind::TauxProgressif(schedule) => self.evaluate_taux_progressif(node, schedule)?,
            NodeKind::Unite(conversion) => self.evaluate_unite(node, conversion)?,
            NodeKind::Arrondi(arrondi) => self.evaluate_arrondi(node, arrondi)?,
            NodeKind::Inversion(inversion) => self.evaluate_inversion(node, inversion)?,
            NodeKind::Contexte(contexte) => self.evaluate_contexte(node, contexte)?,
            // Choices are only meaningful on the rule declaring them
            NodeKind::UnePossibilite(_) => EvaluatedNode::new(node.clone(), NodeValue::Undefined),
            NodeKind::ApplicableSi(guard) => self.evaluate_guard(node, guard, true)?,
            NodeKind::NonApplicableSi(guard) => self.evaluate_guard(node, guard, false)?,
            NodeKind::ParDefaut(par_defaut) => self.evaluate_par_defaut(node, par_defaut)?,
            NodeKind::Plancher(bound) => self.evaluate_bound(node, bound, true)?,
            NodeKind::Plafond(bound) => self.evaluate_bound(node, bound, false)?,
            NodeKind::Abattement(abattement) => self.evaluate_abattement(node, abattement)?,
            NodeKind::EstNonDefini(inner) => self.evaluate_predicate(node, inner, |value| {
                Some(value.is_undefined())
            })?,
            NodeKind::EstNonApplicable(inner) => {
                self.evaluate_predicate(node, inner, |value| match value {
                    NodeValue::Undefined => None,
                    other => Some(other.is_not_applicable()),
                })?
            }
            NodeKind::ResoudreReferenceCirculaire(resolution) => {
                self.evaluate_circular_resolution(node, resolution)?
            }
            NodeKind::Duree(duree) => self.evaluate_duree(node, duree)?,
            NodeKind::Texte(parts) => self.evaluate_texte(node, parts)?,
            NodeKind::SimplifierUnite(inner) => self.evaluate_simplifier_unite(node, inner)?,
        };

        if self.cache.settle_assumptions(assumed) {
            self.cache.nodes.insert(node.id, evaluated.clone());
        }
        Ok(evaluated)
    }

    /// Log a user-facing warning, naming the rule being evaluated
    pub(crate) fn warn(&self, message: impl AsRef<str>) {
        let rule = self.cache.current_rule();
        let message = if rule.is_empty() {
            message.as_ref().to_string()
        } else {
            format!("In rule \"{}\": {}", rule, message.as_ref())
        };
        self.context.options.logger.warn(&message);
    }

    pub(crate) fn evaluation_error(&self, message: impl Into<String>) -> EngineError {
        EngineError::evaluation(self.cache.current_rule(), message)
    }

    /// Read a condition: `None` while it is undefined, not-applicable counts
    /// as false
    pub(crate) fn condition_value(&self, evaluated: &EvaluatedNode) -> EngineResult<Option<bool>> {
        match &evaluated.value {
            NodeValue::Value(LiteralValue::Boolean(b)) => Ok(Some(*b)),
            NodeValue::NotApplicable => Ok(Some(false)),
            NodeValue::Undefined => Ok(None),
            NodeValue::Value(other) => Err(self.evaluation_error(format!(
                "condition must be a boolean, got {} ({})",
                other,
                other.value_type()
            ))),
        }
    }

    /// Read a number: `Ok(None)` when not applicable or undefined
    pub(crate) fn number_value(
        &self,
        evaluated: &EvaluatedNode,
        what: &str,
    ) -> EngineResult<Option<f64>> {
        match &evaluated.value {
            NodeValue::Value(LiteralValue::Number(n)) => Ok(Some(*n)),
            NodeValue::NotApplicable | NodeValue::Undefined => Ok(None),
            NodeValue::Value(other) => Err(self.evaluation_error(format!(
                "{} must be a number, got {} ({})",
                what,
                other,
                other.value_type()
            ))),
        }
    }
}

/// Union of the missing inputs of evaluated operands
pub(crate) fn merge_missing<'a>(
    evaluated: impl IntoIterator<Item = &'a EvaluatedNode>,
) -> MissingVariables {
    let mut missing = MissingVariables::new();
    for node in evaluated {
        missing.merge(&node.missing_variables);
    }
    missing
}
