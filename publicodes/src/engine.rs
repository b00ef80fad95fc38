use crate::analysis::DependencyGraph;
use crate::ast::NodeIdGenerator;
use crate::disambiguation::{
    candidates, disambiguate_node, disambiguate_rule, references_of, written_references,
};
use crate::error::EngineError;
use crate::evaluated::{EvaluatedNode, NodeValue};
use crate::evaluator::Cache;
use crate::inference::{InferredType, TypeTable};
use crate::options::{EngineOptions, SituationOptions};
use crate::parser::expressions::parse_inline;
use crate::parser::mechanisms::{constant_text, parse_value};
use crate::parser::{parse_rules, ParseContext, ParsedRules};
use crate::replacement::ReplacementTable;
use crate::semantic::{
    ancestors, normalize_name, LiteralValue, Node, NodeKind, NodeRef, RuleNode, UnitConversion,
};
use crate::EngineResult;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Compiled rule set, shared read-only by an engine and its sub-engines
#[derive(Clone)]
pub struct Context {
    pub ids: Arc<NodeIdGenerator>,
    pub options: EngineOptions,
    /// Rules as parsed, references unresolved
    written: ParsedRules,
    /// Rules with resolved references, before replacements
    resolved: ParsedRules,
    /// Rules ready for evaluation
    pub rules: ParsedRules,
    pub dependencies: DependencyGraph,
    pub replacements: ReplacementTable,
    pub types: TypeTable,
}

impl Context {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            ids: Arc::new(NodeIdGenerator::new()),
            options,
            written: ParsedRules::new(),
            resolved: ParsedRules::new(),
            rules: ParsedRules::new(),
            dependencies: DependencyGraph::new(),
            replacements: ReplacementTable::default(),
            types: TypeTable::new(),
        }
    }

    fn parse_settings<'a>(&'a self, dotted_name: &'a str) -> ParseContext<'a> {
        ParseContext::new(
            dotted_name,
            &self.ids,
            self.options.unit_normalizer.as_ref(),
            &self.options.unit_table,
            &self.options.limits,
        )
    }

    /// Parse a rule map and merge it into the compiled rules
    ///
    /// Only the rules the new ones can affect are resolved again: the new
    /// rules, rules whose written names may now designate a new rule, and
    /// rules nested under a new rule. Nothing is committed on error.
    pub fn add_rules(&mut self, raw: &Value) -> EngineResult<()> {
        let parsed = parse_rules(raw, &self.written, &self.parse_settings(""))?;
        if parsed.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = parsed.len(), "adding rules");

        let mut written = self.written.clone();
        written.extend(parsed.iter().map(|(name, rule)| (name.clone(), rule.clone())));

        let affected: BTreeSet<String> = written
            .iter()
            .filter(|(name, rule)| {
                parsed.contains_key(*name)
                    || ancestors(name).iter().any(|ancestor| parsed.contains_key(*ancestor))
                    || written_references(rule).iter().any(|(written_name, context)| {
                        candidates(written_name, context)
                            .iter()
                            .any(|candidate| parsed.contains_key(candidate))
                    })
            })
            .map(|(name, _)| name.clone())
            .collect();

        let mut resolved = self.resolved.clone();
        let mut dependencies = self.dependencies.clone();
        let mut replacements_changed = false;
        for name in &affected {
            let rule = disambiguate_rule(&written[name], &written, &self.ids)?;
            replacements_changed |= rule
                .as_rule()
                .is_some_and(|rule| !rule.replacements.is_empty());
            dependencies.set_references(name, references_of(&rule));
            resolved.insert(name.clone(), rule);
        }

        let mut rules = self.rules.clone();
        let recompiled: BTreeSet<String> = if replacements_changed {
            let mut replacements = ReplacementTable::new(&resolved);
            for (name, rule) in &resolved {
                rules.insert(name.clone(), replacements.apply(rule, &self.ids));
            }
            self.replacements = replacements;
            resolved.keys().cloned().collect()
        } else {
            for name in &affected {
                let rule = self.replacements.apply(&resolved[name], &self.ids);
                rules.insert(name.clone(), rule);
            }
            affected
        };

        let retyped = dependencies.transitive_users(recompiled.iter().map(String::as_str));
        self.types
            .invalidate(retyped.iter().filter_map(|name| self.rules.get(name)));
        self.types
            .invalidate(retyped.iter().filter_map(|name| rules.get(name)));
        for name in &retyped {
            if let Some(rule) = rules.get(name) {
                self.types.infer(rule, &rules);
            }
        }

        self.written = written;
        self.resolved = resolved;
        self.rules = rules;
        self.dependencies = dependencies;
        Ok(())
    }

    /// Bind and compile a node written in `rule`
    fn link(&mut self, node: &NodeRef, rule: &str) -> EngineResult<NodeRef> {
        let resolved = disambiguate_node(node, rule, &self.written, &self.ids)?;
        Ok(self.replacements.apply(&resolved, &self.ids))
    }

    /// Bind and compile an expression evaluated from the root
    ///
    /// A bare rule name designates the rule itself: replacements only rewrite
    /// references written inside expressions.
    fn link_root(&mut self, node: &NodeRef) -> EngineResult<NodeRef> {
        let resolved = disambiguate_node(node, "", &self.written, &self.ids)?;
        if resolved
            .as_reference()
            .is_some_and(|reference| reference.dotted_name.is_some())
        {
            return Ok(resolved);
        }
        Ok(self.replacements.apply(&resolved, &self.ids))
    }
}

/// An expression to evaluate
#[derive(Debug, Clone)]
pub enum Expression {
    /// Inline syntax, as written in a rule (`salaire brut * 12`)
    Text(String),
    /// A rule-definition value (`{"somme": [...]}`)
    Json(Value),
    /// An already parsed node
    Node(NodeRef),
}

impl From<&str> for Expression {
    fn from(text: &str) -> Self {
        Expression::Text(text.to_string())
    }
}

impl From<String> for Expression {
    fn from(text: String) -> Self {
        Expression::Text(text)
    }
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Expression::Json(value)
    }
}

impl From<NodeRef> for Expression {
    fn from(node: NodeRef) -> Self {
        Expression::Node(node)
    }
}

/// A situation entry
#[derive(Debug, Clone)]
pub enum SituationValue {
    /// Parsed like a rule value; `null` makes the rule not applicable
    Json(Value),
    Node(NodeRef),
}

impl From<Value> for SituationValue {
    fn from(value: Value) -> Self {
        SituationValue::Json(value)
    }
}

impl From<&str> for SituationValue {
    fn from(text: &str) -> Self {
        SituationValue::Json(Value::String(text.to_string()))
    }
}

impl From<f64> for SituationValue {
    fn from(number: f64) -> Self {
        SituationValue::Json(Value::from(number))
    }
}

impl From<NodeRef> for SituationValue {
    fn from(node: NodeRef) -> Self {
        SituationValue::Node(node)
    }
}

/// The publicodes evaluation engine
///
/// Compiles a rule map once, then evaluates expressions against a situation.
/// Results are memoized until the situation or the rules change.
pub struct Engine {
    pub(crate) context: Arc<Context>,
    pub(crate) situation: BTreeMap<String, NodeRef>,
    pub(crate) cache: Cache,
    /// Nesting level of sub-engines, 0 for the engine built by the caller
    pub(crate) depth: usize,
}

impl Engine {
    pub fn new(rules: Value) -> EngineResult<Self> {
        Self::with_options(rules, EngineOptions::default())
    }

    pub fn with_options(rules: Value, options: EngineOptions) -> EngineResult<Self> {
        let mut context = Context::new(options);
        context.add_rules(&rules)?;
        Ok(Self {
            context: Arc::new(context),
            situation: BTreeMap::new(),
            cache: Cache::new(),
            depth: 0,
        })
    }

    /// Add rules to a built engine; redeclaring a rule is an error
    pub fn add_rules(&mut self, rules: Value) -> EngineResult<()> {
        Arc::make_mut(&mut self.context).add_rules(&rules)?;
        self.cache = Cache::new();
        Ok(())
    }

    pub fn options(&self) -> &EngineOptions {
        &self.context.options
    }

    /// Engine evaluating the same rules under another situation
    pub(crate) fn sub_engine(
        &self,
        situation: BTreeMap<String, NodeRef>,
        cache: Cache,
    ) -> EngineResult<Engine> {
        let max_depth = self.context.options.limits.max_context_depth;
        if self.depth >= max_depth {
            return Err(EngineError::evaluation(
                self.cache.current_rule(),
                format!("nested evaluations exceed the maximum depth of {}", max_depth),
            ));
        }
        Ok(Engine {
            context: Arc::clone(&self.context),
            situation,
            cache,
            depth: self.depth + 1,
        })
    }

    /// Replace (or extend) the situation
    ///
    /// Every entry must target a public rule. Values are parsed like rule
    /// values, in the namespace of their target. In strict mode an invalid
    /// entry is an error; otherwise it is logged and left out.
    ///
    /// # Examples
    /// ```text
    /// contrat:
    ///   une possibilité: ['CDI', 'CDD']
    ///
    /// set_situation([("contrat", "CDI")])     -> contrat = 'CDI'
    /// set_situation([("contrat", "'CDD'")])   -> contrat = 'CDD'
    /// set_situation([("contrat", "'stage'")]) -> error (strict) or dropped
    /// ```
    pub fn set_situation<K, V>(
        &mut self,
        entries: impl IntoIterator<Item = (K, V)>,
        options: SituationOptions,
    ) -> EngineResult<()>
    where
        K: AsRef<str>,
        V: Into<SituationValue>,
    {
        let mut situation = if options.keep_previous_situation {
            self.situation.clone()
        } else {
            BTreeMap::new()
        };
        for (name, value) in entries {
            let name = normalize_name(name.as_ref());
            match self.situation_entry(&name, value.into()) {
                Ok(node) => {
                    situation.insert(name, node);
                }
                Err(error) if options.strict => return Err(error),
                Err(error) => {
                    self.context
                        .options
                        .logger
                        .warn(&format!("{}, the situation entry is ignored", error));
                }
            }
        }
        self.situation = situation;
        self.cache = Cache::new();
        Ok(())
    }

    fn situation_entry(&mut self, name: &str, value: SituationValue) -> EngineResult<NodeRef> {
        let rule = match self.context.rules.get(name).and_then(|rule| rule.as_rule()) {
            Some(rule) if rule.private || rule.situation_seam => {
                return Err(EngineError::situation(
                    name,
                    "private rules cannot be set in the situation",
                ))
            }
            Some(rule) => rule.clone(),
            None => return Err(EngineError::situation(name, "unknown rule")),
        };

        let node = match value {
            SituationValue::Node(node) => node,
            SituationValue::Json(Value::Null) => Node::not_applicable(&self.context.ids),
            SituationValue::Json(value) => {
                parse_value(&value, &self.context.parse_settings(name))?
            }
        };
        let node = choice_as_text(node, &rule, &self.context.ids)?;

        let context = Arc::make_mut(&mut self.context);
        let node = context.link(&node, name)?;
        match &rule.unit {
            Some(unit) if rule.possibilities.is_none() => Ok(Node::new(
                NodeKind::Unite(UnitConversion {
                    valeur: node,
                    unit: Some(unit.clone()),
                }),
                &context.ids,
            )),
            _ => Ok(node),
        }
    }

    /// Current situation entries, compiled
    pub fn situation(&self) -> &BTreeMap<String, NodeRef> {
        &self.situation
    }

    /// Evaluate an expression against the current situation
    ///
    /// Names in the expression are resolved from the root namespace, so
    /// private rules are out of reach.
    pub fn evaluate(&mut self, expression: impl Into<Expression>) -> EngineResult<EvaluatedNode> {
        let node = match expression.into() {
            Expression::Text(text) => parse_inline(&text, &self.context.parse_settings(""))?,
            Expression::Json(value) => parse_value(&value, &self.context.parse_settings(""))?,
            Expression::Node(node) => node,
        };
        let node = Arc::make_mut(&mut self.context).link_root(&node)?;

        self.cache.evaluation_stack.clear();
        self.cache.parent_stack.clear();
        self.cache.assumed.clear();
        self.cache.traversed.clear();
        if !self.context.options.track_traversed_variables {
            return self.evaluate_node(&node);
        }
        self.cache.traversed.push(BTreeSet::new());
        let result = self.evaluate_node(&node);
        let traversed = self.cache.traversed.pop().unwrap_or_default();
        Ok(EvaluatedNode {
            traversed_variables: Some(traversed),
            ..result?
        })
    }

    pub fn get_rule(&self, name: &str) -> EngineResult<&RuleNode> {
        let name = normalize_name(name);
        self.context
            .rules
            .get(&name)
            .and_then(|rule| rule.as_rule())
            .ok_or_else(|| EngineError::evaluation(name, "unknown rule"))
    }

    /// Compiled rules by dotted name, `$SITUATION` seams included
    pub fn rules(&self) -> &ParsedRules {
        &self.context.rules
    }

    pub fn inferred_type(&self, name: &str) -> Option<InferredType> {
        let rule = self.context.rules.get(&normalize_name(name))?;
        self.context.types.get(rule.id)
    }

    /// Rules referencing `name`
    pub fn rules_that_use(&self, name: &str) -> Vec<String> {
        self.context
            .dependencies
            .rules_that_use(&normalize_name(name))
            .map(str::to_string)
            .collect()
    }

    /// Rules referenced by `name`
    pub fn references_in(&self, name: &str) -> Vec<String> {
        self.context
            .dependencies
            .references_in(&normalize_name(name))
            .map(str::to_string)
            .collect()
    }

    /// Shortest reference cycles, one per strongly connected component
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        self.context.dependencies.find_cycles()
    }

    /// Whether an inversion failed since the situation was last set
    pub fn inversion_failed(&self) -> bool {
        self.cache.inversion_failed
    }
}

/// Check a value given to a rule with `une possibilité`
///
/// A bare possibility name is turned into the text of the choice.
fn choice_as_text(node: NodeRef, rule: &RuleNode, ids: &NodeIdGenerator) -> EngineResult<NodeRef> {
    let Some(NodeKind::UnePossibilite(une_possibilite)) =
        rule.possibilities.as_ref().map(|possibilities| &possibilities.kind)
    else {
        return Ok(node);
    };
    let names = une_possibilite.names();
    let choice = match (&node.kind, constant_text(&node)) {
        (_, Some(text)) => text.to_string(),
        (NodeKind::Reference(reference), None) if names.contains(&normalize_name(&reference.name)) => {
            normalize_name(&reference.name)
        }
        (NodeKind::Constant(constant), None) => match &constant.value {
            NodeValue::Value(value) => {
                return Err(EngineError::situation(
                    &rule.dotted_name,
                    format!(
                        "expects one of the possibilities ({}), got {} ({})",
                        names.join(", "),
                        value,
                        value.value_type()
                    ),
                ))
            }
            _ => return Ok(node),
        },
        _ => return Ok(node),
    };
    if !names.contains(&choice) {
        return Err(EngineError::situation(
            &rule.dotted_name,
            format!(
                "\"{}\" is not one of the possibilities ({})",
                choice,
                names.join(", ")
            ),
        ));
    }
    Ok(Node::constant(
        NodeValue::Value(LiteralValue::Text(choice)),
        None,
        ids,
    ))
}
