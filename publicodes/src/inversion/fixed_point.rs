//! Circular-reference resolution
//!
//! Seeks `v` such that the rule's expression, evaluated with the rule set to
//! `v`, gives back `v`: a root of `f(v) − v`, starting from `v = 1` then
//! `v = f(1)`.

use super::solver::{bracket, uniroot, Sample};
use crate::engine::Engine;
use crate::evaluated::{EvaluatedNode, NodeValue};
use crate::semantic::{CircularResolution, NodeRef};
use crate::EngineResult;

const FIRST_TRIAL: f64 = 1.0;

impl Engine {
    pub(crate) fn evaluate_circular_resolution(
        &mut self,
        node: &NodeRef,
        resolution: &CircularResolution,
    ) -> EngineResult<EvaluatedNode> {
        let rule = resolution.rule.as_str();
        if self.cache.solving_stack.iter().any(|solving| solving == rule) {
            return Ok(EvaluatedNode::new(node.clone(), NodeValue::Undefined));
        }

        let mut unit = self
            .context
            .rules
            .get(rule)
            .and_then(|rule| rule.as_rule())
            .and_then(|rule| rule.unit.clone());
        let mut first = self.probe(rule, (FIRST_TRIAL, unit.as_ref()), None, &resolution.valeur)?;
        if first.unit.is_some() && first.unit != unit {
            unit = first.unit.clone();
            first = self.probe(rule, (FIRST_TRIAL, unit.as_ref()), None, &resolution.valeur)?;
        }
        let Some(y0) = first.as_number() else {
            return Ok(EvaluatedNode::new(node.clone(), first.value.clone())
                .with_unit(first.unit.clone())
                .with_missing(first.missing_variables.clone()));
        };

        let options = self.context.options.solver.clone();
        let root = {
            let mut residual = |v: f64| -> EngineResult<Option<f64>> {
                let evaluated = self.probe(rule, (v, unit.as_ref()), None, &resolution.valeur)?;
                Ok(evaluated
                    .as_number()
                    .map(|y| self.align(y, evaluated.unit.as_ref(), unit.as_ref(), "compare"))
                    .map(|y| y - v)
                    .filter(|r| r.is_finite()))
            };
            let g0 = y0 - FIRST_TRIAL;
            if g0.abs() <= options.tolerance {
                Some(FIRST_TRIAL)
            } else {
                let mut samples: Vec<Sample> = vec![(FIRST_TRIAL, g0)];
                match residual(y0)? {
                    Some(g1) if g1.abs() <= options.tolerance => Some(y0),
                    Some(g1) => {
                        samples.push((y0, g1));
                        match bracket(&mut residual, &samples, &options)? {
                            Some((a, b)) => uniroot(
                                &mut residual,
                                a,
                                b,
                                options.tolerance,
                                options.max_iterations,
                            )?,
                            None => None,
                        }
                    }
                    None => None,
                }
            }
        };

        match root.filter(|root| *root >= options.min && *root <= options.max) {
            Some(root) => Ok(EvaluatedNode::new(node.clone(), NodeValue::number(root))
                .with_unit(unit)
                .with_missing(first.missing_variables.clone())),
            None => {
                tracing::debug!(rule, "no fixed point found");
                self.cache.inversion_failed = true;
                Ok(EvaluatedNode::new(node.clone(), NodeValue::Undefined))
            }
        }
    }
}
