//! Rule evaluation
//!
//! A rule is evaluated in four steps:
//! 1. Situation seam: the implicit `$SITUATION` child returns the situation value
//! 2. Cycle check: a rule already on the evaluation stack yields undefined
//! 3. Disabling parent: the nearest ancestor that can be not applicable or
//!    false is evaluated first; if it is, so is the rule
//! 4. Value: the rule's expression, then its default value and enum choice

use crate::engine::Engine;
use crate::error::EngineError;
use crate::evaluated::{EvaluatedNode, MissingVariables, NodeValue};
use crate::semantic::{
    leaf_name, parent_name, LiteralValue, NodeKind, NodeRef, Reference, RuleNode,
};
use crate::units::Unit;
use crate::EngineResult;
use std::collections::BTreeSet;

impl Engine {
    pub(super) fn evaluate_reference(
        &mut self,
        node: &NodeRef,
        reference: &Reference,
    ) -> EngineResult<EvaluatedNode> {
        let Some(dotted_name) = reference.dotted_name.as_deref() else {
            return Err(EngineError::Internal(format!(
                "reference \"{}\" was never resolved",
                reference.name
            )));
        };
        let Some(rule) = self.context.rules.get(dotted_name).cloned() else {
            return Err(EngineError::Internal(format!(
                "reference to unknown rule \"{}\"",
                dotted_name
            )));
        };
        let evaluated = self.evaluate_node(&rule)?;
        Ok(EvaluatedNode {
            node: node.clone(),
            ..evaluated
        })
    }

    pub(super) fn evaluate_rule(
        &mut self,
        node: &NodeRef,
        rule: &RuleNode,
    ) -> EngineResult<EvaluatedNode> {
        if rule.situation_seam {
            return self.evaluate_situation(node, rule);
        }
        if !self.context.options.track_traversed_variables {
            return self.evaluate_rule_value(node, rule);
        }

        self.cache.record_traversed([&rule.dotted_name]);
        self.cache.traversed.push(BTreeSet::new());
        let result = self.evaluate_rule_value(node, rule);
        let mut traversed = self.cache.traversed.pop().unwrap_or_default();
        traversed.insert(rule.dotted_name.clone());
        self.cache.record_traversed(&traversed);
        let evaluated = result?;
        Ok(EvaluatedNode {
            traversed_variables: Some(traversed),
            ..evaluated
        })
    }

    fn evaluate_situation(&mut self, node: &NodeRef, seam: &RuleNode) -> EngineResult<EvaluatedNode> {
        let owner = parent_name(&seam.dotted_name).unwrap_or_default();
        let Some(value) = self.situation.get(owner).cloned() else {
            return Ok(EvaluatedNode::new(node.clone(), NodeValue::Undefined));
        };
        let evaluated = self.evaluate_node(&value)?;
        Ok(EvaluatedNode::new(node.clone(), evaluated.value.clone())
            .with_unit(evaluated.unit.clone())
            .with_missing(evaluated.missing_variables.clone()))
    }

    fn evaluate_rule_value(&mut self, node: &NodeRef, rule: &RuleNode) -> EngineResult<EvaluatedNode> {
        let name = &rule.dotted_name;
        if let Some(start) = self.cache.evaluation_stack.iter().position(|n| n == name) {
            let mut cycle = self.cache.evaluation_stack[start..].to_vec();
            cycle.push(name.clone());
            if self.context.options.strict_cycles {
                return Err(EngineError::Cycle { cycle });
            }
            self.warn(format!(
                "circular reference {}, the rule is left undefined",
                cycle.join(" -> ")
            ));
            return Ok(EvaluatedNode::new(node.clone(), NodeValue::Undefined));
        }

        let mut missing = MissingVariables::new();
        if let Some(parent) = self.disabling_parent(rule) {
            self.cache.parent_stack.push(name.clone());
            let evaluated = self.evaluate_node(&parent);
            self.cache.parent_stack.pop();
            let evaluated = evaluated?;
            let bonus = evaluated.missing_variables.bonus();
            if matches!(
                evaluated.value,
                NodeValue::NotApplicable | NodeValue::Value(LiteralValue::Boolean(false))
            ) {
                return Ok(EvaluatedNode::new(node.clone(), NodeValue::NotApplicable)
                    .with_missing(bonus));
            }
            missing.merge(&bonus);
        }

        self.cache.evaluation_stack.push(name.clone());
        let result = self.evaluate_rule_body(rule, missing);
        self.cache.evaluation_stack.pop();
        let (value, unit, missing) = result?;
        Ok(EvaluatedNode::new(node.clone(), value)
            .with_unit(unit)
            .with_missing(missing))
    }

    fn evaluate_rule_body(
        &mut self,
        rule: &RuleNode,
        mut missing: MissingVariables,
    ) -> EngineResult<(NodeValue, Option<Unit>, MissingVariables)> {
        let valeur = self.evaluate_node(&rule.valeur)?;
        missing.merge(&valeur.missing_variables);
        let mut value = valeur.value.clone();
        let mut unit = valeur.unit.clone();

        if value.is_undefined() && valeur.missing_variables.is_empty() {
            missing.merge(&MissingVariables::single(rule.dotted_name.clone()));
        }

        if value.is_undefined() {
            if let Some(default) = &rule.default_value {
                let default = self.evaluate_node(default)?;
                missing.merge(&default.missing_variables.bonus());
                value = default.value.clone();
                unit = default.unit.clone().or(unit);
            }
        }

        if let (Some(possibilities), NodeValue::Value(LiteralValue::Text(choice))) =
            (&rule.possibilities, &value)
        {
            if let Some(possibility) = chosen_possibility(possibilities, choice) {
                let chosen = self.evaluate_node(&possibility)?;
                missing.merge(&chosen.missing_variables.bonus());
                if chosen.is_not_applicable() {
                    value = NodeValue::NotApplicable;
                }
            }
        }

        Ok((value, unit, missing))
    }

    /// Nearest ancestor able to disable the rule, unless that check is
    /// already under way
    fn disabling_parent(&mut self, rule: &RuleNode) -> Option<NodeRef> {
        if self.cache.parent_stack.contains(&rule.dotted_name) {
            self.cache.assumed.push(rule.dotted_name.clone());
            return None;
        }
        let parent = rule.parents.iter().find(|parent| {
            parent
                .as_reference()
                .and_then(|reference| reference.dotted_name.as_deref())
                .and_then(|name| self.context.rules.get(name))
                .and_then(|parent_rule| self.context.types.get(parent_rule.id))
                .is_some_and(|inferred| inferred.can_disable())
        })?;
        // Inside the parent's own value, its guards have already been applied
        let ancestor = parent.as_reference()?.dotted_name.as_ref()?;
        if self.cache.evaluation_stack.contains(ancestor) {
            self.cache.assumed.push(ancestor.clone());
            return None;
        }
        Some(parent.clone())
    }
}

/// The rule-reference possibility designated by a chosen text value
fn chosen_possibility(possibilities: &NodeRef, choice: &str) -> Option<NodeRef> {
    let NodeKind::UnePossibilite(une_possibilite) = &possibilities.kind else {
        return None;
    };
    une_possibilite
        .possibilities
        .iter()
        .find(|possibility| {
            possibility
                .as_reference()
                .and_then(|reference| reference.dotted_name.as_deref())
                .is_some_and(|name| leaf_name(name) == choice)
        })
        .cloned()
}
