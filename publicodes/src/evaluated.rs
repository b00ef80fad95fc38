use crate::semantic::{LiteralValue, NodeRef};
use crate::units::Unit;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

/// Result of evaluating a node: a value, "not applicable" or "unknown"
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NodeValue {
    /// Evaluation produced a value
    Value(LiteralValue),
    /// The quantity structurally does not apply (e.g. a disabled branch)
    NotApplicable,
    /// The value is not known yet, usually because an input is missing
    #[default]
    Undefined,
}

impl NodeValue {
    pub fn number(value: f64) -> Self {
        NodeValue::Value(LiteralValue::Number(value))
    }

    pub fn boolean(value: bool) -> Self {
        NodeValue::Value(LiteralValue::Boolean(value))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, NodeValue::Undefined)
    }

    pub fn is_not_applicable(&self) -> bool {
        matches!(self, NodeValue::NotApplicable)
    }

    /// Get the value if present
    pub fn value(&self) -> Option<&LiteralValue> {
        match self {
            NodeValue::Value(v) => Some(v),
            NodeValue::NotApplicable | NodeValue::Undefined => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        self.value().and_then(LiteralValue::as_number)
    }

    pub fn as_boolean(&self) -> Option<bool> {
        self.value().and_then(LiteralValue::as_boolean)
    }
}

impl From<LiteralValue> for NodeValue {
    fn from(value: LiteralValue) -> Self {
        NodeValue::Value(value)
    }
}

impl Serialize for NodeValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            NodeValue::Value(value) => value.serialize(serializer),
            NodeValue::NotApplicable => serializer.serialize_none(),
            NodeValue::Undefined => serializer.serialize_unit(),
        }
    }
}

/// Missing inputs, each with a weight: lower weights are more directly needed
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct MissingVariables(BTreeMap<String, u32>);

impl MissingVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single missing variable of weight 1
    pub fn single(dotted_name: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(dotted_name.into(), 1);
        Self(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, dotted_name: &str) -> Option<u32> {
        self.0.get(dotted_name).copied()
    }

    pub fn contains(&self, dotted_name: &str) -> bool {
        self.0.contains_key(dotted_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(name, weight)| (name.as_str(), *weight))
    }

    /// Merge another map in, summing the weights of shared names
    pub fn merge(&mut self, other: &MissingVariables) {
        for (name, weight) in &other.0 {
            *self.0.entry(name.clone()).or_insert(0) += weight;
        }
    }

    pub fn merged(mut self, other: &MissingVariables) -> Self {
        self.merge(other);
        self
    }

    /// Every weight increased by one, for inputs reached through an
    /// ancestor, a default value or an enum choice
    pub fn bonus(&self) -> MissingVariables {
        Self(
            self.0
                .iter()
                .map(|(name, weight)| (name.clone(), weight + 1))
                .collect(),
        )
    }

    /// Names ordered by weight, lowest first
    pub fn by_relevance(&self) -> Vec<&str> {
        let mut names: Vec<(&String, &u32)> = self.0.iter().collect();
        names.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));
        names.into_iter().map(|(name, _)| name.as_str()).collect()
    }
}

impl FromIterator<(String, u32)> for MissingVariables {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// An AST node decorated with the result of its evaluation
#[derive(Debug, Clone, Serialize)]
pub struct EvaluatedNode {
    #[serde(skip)]
    pub node: NodeRef,
    #[serde(rename = "nodeValue")]
    pub value: NodeValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
    #[serde(rename = "missingVariables")]
    pub missing_variables: MissingVariables,
    #[serde(
        rename = "traversedVariables",
        skip_serializing_if = "Option::is_none"
    )]
    pub traversed_variables: Option<BTreeSet<String>>,
}

impl EvaluatedNode {
    pub fn new(node: NodeRef, value: NodeValue) -> Self {
        Self {
            node,
            value,
            unit: None,
            missing_variables: MissingVariables::new(),
            traversed_variables: None,
        }
    }

    pub fn with_unit(mut self, unit: Option<crate::units::Unit>) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_missing(mut self, missing_variables: MissingVariables) -> Self {
        self.missing_variables = missing_variables;
        self
    }

    pub fn as_number(&self) -> Option<f64> {
        self.value.as_number()
    }

    pub fn as_boolean(&self) -> Option<bool> {
        self.value.as_boolean()
    }

    pub fn is_not_applicable(&self) -> bool {
        self.value.is_not_applicable()
    }

    pub fn is_undefined(&self) -> bool {
        self.value.is_undefined()
    }
}
