//! Per-engine evaluation state
//!
//! Every engine and sub-engine owns one `Cache`. It is dropped whenever the
//! situation or the rule set changes.

use crate::ast::NodeId;
use crate::evaluated::{EvaluatedNode, NodeValue};
use crate::units::Unit;
use std::collections::{BTreeSet, HashMap};

/// Amendments of a `contexte` node being evaluated, compared structurally to
/// detect re-entrancy
#[derive(Debug, Clone, PartialEq)]
pub struct ContexteFrame {
    pub node: NodeId,
    pub amendments: Vec<(String, NodeValue, Option<Unit>)>,
}

/// Memoized results and the stacks used to detect re-entrancy
#[derive(Debug, Clone, Default)]
pub struct Cache {
    /// Results by node identity
    pub nodes: HashMap<NodeId, EvaluatedNode>,

    /// Rules whose value is being evaluated, outermost first
    pub evaluation_stack: Vec<String>,

    /// Rules whose ancestors' applicability is being evaluated
    pub parent_stack: Vec<String>,

    /// Rules whose presence on a stack skipped a parent check; results that
    /// relied on one are not memoized until that rule is left
    pub assumed: Vec<String>,

    /// One frame per rule being evaluated, collecting the rules it touched
    pub traversed: Vec<BTreeSet<String>>,

    /// `contexte` nodes being evaluated by this engine or its parents
    pub contexte_stack: Vec<ContexteFrame>,

    /// Rules being solved by inversion or fixed-point resolution
    pub solving_stack: Vec<String>,

    /// Set when a numeric inversion could not find a solution
    pub inversion_failed: bool,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache for a sub-engine
    ///
    /// Results and rule stacks start empty: the sub-engine's situation
    /// differs, and rules are legitimately re-entered under it. The
    /// `contexte` and solving stacks carry over so nested solving terminates.
    pub fn nested(&self) -> Self {
        Self {
            contexte_stack: self.contexte_stack.clone(),
            solving_stack: self.solving_stack.clone(),
            ..Self::default()
        }
    }

    /// Record `names` in the innermost traversal frame
    pub fn record_traversed<'a>(&mut self, names: impl IntoIterator<Item = &'a String>) {
        if let Some(frame) = self.traversed.last_mut() {
            frame.extend(names.into_iter().cloned());
        }
    }

    /// Drop the assumptions recorded since `mark` whose rule has left the
    /// stacks; `true` when none remain and the result can be memoized
    pub fn settle_assumptions(&mut self, mark: usize) -> bool {
        let evaluation_stack = &self.evaluation_stack;
        let parent_stack = &self.parent_stack;
        let pending: Vec<String> = self
            .assumed
            .drain(mark..)
            .filter(|name| evaluation_stack.contains(name) || parent_stack.contains(name))
            .collect();
        let settled = pending.is_empty();
        self.assumed.extend(pending);
        settled
    }

    /// The rule currently being evaluated, for error messages
    pub fn current_rule(&self) -> &str {
        self.evaluation_stack
            .last()
            .map(String::as_str)
            .unwrap_or("")
    }
}
