//! `contexte`: evaluation under an amended situation
//!
//! The amendments are evaluated in the current engine, then the value is
//! evaluated by a sub-engine sharing the compiled rules, with its own
//! situation and cache.

use super::cache::ContexteFrame;
use crate::engine::Engine;
use crate::evaluated::{EvaluatedNode, MissingVariables, NodeValue};
use crate::semantic::{Contexte, Node, NodeRef};
use crate::units::Unit;
use crate::EngineResult;

impl Engine {
    pub(super) fn evaluate_contexte(
        &mut self,
        node: &NodeRef,
        contexte: &Contexte,
    ) -> EngineResult<EvaluatedNode> {
        let mut missing = MissingVariables::new();
        let mut amendments = Vec::with_capacity(contexte.amendments.len());
        for amendment in &contexte.amendments {
            let evaluated = self.evaluate_node(&amendment.value)?;
            missing.merge(&evaluated.missing_variables);
            amendments.push((
                amendment.target.resolved().to_string(),
                evaluated.value.clone(),
                evaluated.unit.clone(),
            ));
        }
        let frame = ContexteFrame {
            node: node.id,
            amendments,
        };

        if self.cache.contexte_stack.contains(&frame) {
            self.context.options.logger.log(&format!(
                "In rule \"{}\": \"contexte\" re-entered with the same amendments, the value is not applicable",
                self.cache.current_rule()
            ));
            return Ok(EvaluatedNode::new(node.clone(), NodeValue::NotApplicable).with_missing(missing));
        }

        let valeur = if self.situation_matches(&frame.amendments)? {
            self.evaluate_node(&contexte.valeur)?
        } else {
            let mut situation = self.situation.clone();
            for (target, value, unit) in &frame.amendments {
                situation.insert(
                    target.clone(),
                    Node::constant(value.clone(), unit.clone(), &self.context.ids),
                );
            }
            let mut cache = self.cache.nested();
            cache.contexte_stack.push(frame);
            let mut sub_engine = self.sub_engine(situation, cache)?;
            tracing::debug!(depth = sub_engine.depth, "evaluating contexte in a sub-engine");
            let valeur = sub_engine.evaluate_node(&contexte.valeur)?;
            self.cache.inversion_failed |= sub_engine.cache.inversion_failed;
            valeur
        };

        Ok(EvaluatedNode::new(node.clone(), valeur.value.clone())
            .with_unit(valeur.unit.clone())
            .with_missing(missing.merged(&valeur.missing_variables)))
    }

    /// Whether the current situation already holds every amendment
    fn situation_matches(
        &mut self,
        amendments: &[(String, NodeValue, Option<Unit>)],
    ) -> EngineResult<bool> {
        for (target, value, unit) in amendments {
            let Some(current) = self.situation.get(target).cloned() else {
                return Ok(false);
            };
            let evaluated = self.evaluate_node(&current)?;
            if evaluated.value != *value || evaluated.unit != *unit {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
