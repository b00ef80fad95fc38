//! Numeric solving
//!
//! Inversion ("which input gives this output") and circular-reference
//! resolution ("which value reproduces itself") are both root searches over
//! probe evaluations. A probe sets a trial value for one rule in a
//! sub-engine and evaluates a node there, so the outer engine's cache and
//! traversed variables are never touched.

mod fixed_point;
mod numeric;
pub mod solver;

pub use solver::{bracket, uniroot, Sample};

use crate::engine::Engine;
use crate::evaluated::EvaluatedNode;
use crate::semantic::{Node, NodeRef};
use crate::units::Unit;
use crate::EngineResult;

impl Engine {
    /// Evaluate `probed` in a sub-engine where `rule` is set to `value` and
    /// `removed` is dropped from the situation
    pub(crate) fn probe(
        &mut self,
        rule: &str,
        (value, unit): (f64, Option<&Unit>),
        removed: Option<&str>,
        probed: &NodeRef,
    ) -> EngineResult<EvaluatedNode> {
        let mut situation = self.situation.clone();
        if let Some(removed) = removed {
            situation.remove(removed);
        }
        situation.insert(
            rule.to_string(),
            Node::number(value, unit.cloned(), &self.context.ids),
        );
        let mut cache = self.cache.nested();
        cache.solving_stack.push(rule.to_string());
        let mut sub_engine = self.sub_engine(situation, cache)?;
        let evaluated = sub_engine.evaluate_node(probed)?;
        tracing::trace!(rule, value, result = ?evaluated.value, "probe");
        self.cache.inversion_failed |= sub_engine.cache.inversion_failed;
        Ok(evaluated)
    }
}
