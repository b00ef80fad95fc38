//! Numeric inversion
//!
//! The goal is the situation value of the first candidate that has one and
//! needs no other input. Two blind probes give two samples: the goal itself
//! as trial input, then the goal rescaled by what the first probe produced.
//! From there a bracket is derived and `uniroot` refines it.

use super::solver::{bracket, uniroot, Sample};
use crate::engine::Engine;
use crate::evaluated::{EvaluatedNode, MissingVariables, NodeValue};
use crate::semantic::{Inversion, NodeRef};
use crate::units::Unit;
use crate::EngineResult;

struct Goal {
    /// Candidate rule whose situation value is reached
    candidate: String,
    rule: NodeRef,
    value: f64,
    unit: Option<Unit>,
}

impl Engine {
    pub(crate) fn evaluate_inversion(
        &mut self,
        node: &NodeRef,
        inversion: &Inversion,
    ) -> EngineResult<EvaluatedNode> {
        // Re-entered from one of our own probes: only private rules get here
        if self.cache.solving_stack.contains(&inversion.rule) {
            return Ok(EvaluatedNode::new(node.clone(), NodeValue::Undefined));
        }
        let Some(goal) = self.inversion_goal(inversion)? else {
            let missing: MissingVariables = inversion
                .candidates
                .iter()
                .map(|candidate| (candidate.resolved().to_string(), 1))
                .collect();
            return Ok(EvaluatedNode::new(node.clone(), NodeValue::Undefined).with_missing(missing));
        };

        let options = self.context.options.solver.clone();
        let unit = inversion.unit.clone();
        let root = {
            let mut distance = |x: f64| -> EngineResult<Option<f64>> {
                let evaluated = self.probe(
                    &inversion.rule,
                    (x, unit.as_ref()),
                    Some(&goal.candidate),
                    &goal.rule,
                )?;
                Ok(evaluated
                    .as_number()
                    .map(|y| self.align(y, evaluated.unit.as_ref(), goal.unit.as_ref(), "compare"))
                    .map(|y| y - goal.value)
                    .filter(|g| g.is_finite()))
            };
            solve(&mut distance, goal.value, &options)?
        };

        match root.filter(|root| *root >= options.min && *root <= options.max) {
            Some(root) => Ok(EvaluatedNode::new(node.clone(), NodeValue::number(root)).with_unit(unit)),
            None => {
                tracing::debug!(rule = %inversion.rule, goal = goal.value, "inversion failed");
                self.cache.inversion_failed = true;
                Ok(EvaluatedNode::new(node.clone(), NodeValue::Undefined))
            }
        }
    }

    fn inversion_goal(&mut self, inversion: &Inversion) -> EngineResult<Option<Goal>> {
        for candidate in &inversion.candidates {
            let name = candidate.resolved();
            if !self.situation.contains_key(name) {
                continue;
            }
            let Some(rule) = self.context.rules.get(name).cloned() else {
                continue;
            };
            let evaluated = self.evaluate_node(&rule)?;
            if let Some(value) = evaluated.as_number() {
                if evaluated.missing_variables.is_empty() {
                    return Ok(Some(Goal {
                        candidate: name.to_string(),
                        rule,
                        value,
                        unit: evaluated.unit.clone(),
                    }));
                }
            }
        }
        Ok(None)
    }
}

/// Root of `distance` (f(x) − goal) from two blind probes
fn solve<F>(
    distance: &mut F,
    goal: f64,
    options: &crate::options::SolverOptions,
) -> EngineResult<Option<f64>>
where
    F: FnMut(f64) -> EngineResult<Option<f64>>,
{
    let x0 = goal;
    let Some(g0) = distance(x0)? else {
        return Ok(None);
    };
    if g0.abs() <= options.tolerance {
        return Ok(Some(x0));
    }
    let mut samples: Vec<Sample> = vec![(x0, g0)];

    let y0 = g0 + goal;
    let x1 = x0 * goal / y0;
    if x1.is_finite() && x1 != x0 {
        if let Some(g1) = distance(x1)? {
            if g1.abs() <= options.tolerance {
                return Ok(Some(x1));
            }
            samples.push((x1, g1));
        }
    }

    match bracket(distance, &samples, options)? {
        Some((a, b)) => uniroot(distance, a, b, options.tolerance, options.max_iterations),
        None => Ok(None),
    }
}
