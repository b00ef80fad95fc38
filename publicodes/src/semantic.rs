//! The closed node-kind union produced by the parser
//!
//! Nodes are created once and never mutated: every node is shared behind an
//! `Arc` and rewrites build new nodes with fresh ids.

use crate::ast::{NodeId, NodeIdGenerator};
use crate::evaluated::NodeValue;
use crate::units::Unit;
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Separator between the segments of a dotted name
pub const SEPARATOR: &str = " . ";

/// Name of the implicit child rule holding a rule's situation value
pub const SITUATION_SEGMENT: &str = "$SITUATION";

pub type NodeRef = Arc<Node>;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(kind: NodeKind, ids: &NodeIdGenerator) -> NodeRef {
        Arc::new(Node {
            id: ids.next_id(),
            kind,
        })
    }

    pub fn constant(value: NodeValue, unit: Option<Unit>, ids: &NodeIdGenerator) -> NodeRef {
        Node::new(NodeKind::Constant(Constant { value, unit }), ids)
    }

    pub fn number(value: f64, unit: Option<Unit>, ids: &NodeIdGenerator) -> NodeRef {
        Node::constant(NodeValue::Value(LiteralValue::Number(value)), unit, ids)
    }

    pub fn boolean(value: bool, ids: &NodeIdGenerator) -> NodeRef {
        Node::constant(NodeValue::Value(LiteralValue::Boolean(value)), None, ids)
    }

    pub fn not_applicable(ids: &NodeIdGenerator) -> NodeRef {
        Node::constant(NodeValue::NotApplicable, None, ids)
    }

    pub fn undefined(ids: &NodeIdGenerator) -> NodeRef {
        Node::constant(NodeValue::Undefined, None, ids)
    }

    pub fn operation(
        operator: Operator,
        left: NodeRef,
        right: NodeRef,
        ids: &NodeIdGenerator,
    ) -> NodeRef {
        Node::new(
            NodeKind::Operation(Operation {
                operator,
                left,
                right,
            }),
            ids,
        )
    }

    pub fn reference(name: &str, context: &str, ids: &NodeIdGenerator) -> NodeRef {
        Node::new(
            NodeKind::Reference(Reference {
                name: name.to_string(),
                dotted_name: None,
                context: context.to_string(),
            }),
            ids,
        )
    }

    /// Reference already bound to a fully-qualified rule name
    pub fn resolved_reference(dotted_name: &str, context: &str, ids: &NodeIdGenerator) -> NodeRef {
        Node::new(
            NodeKind::Reference(Reference {
                name: dotted_name.to_string(),
                dotted_name: Some(dotted_name.to_string()),
                context: context.to_string(),
            }),
            ids,
        )
    }

    pub fn as_rule(&self) -> Option<&RuleNode> {
        match &self.kind {
            NodeKind::Rule(rule) => Some(rule),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match &self.kind {
            NodeKind::Reference(reference) => Some(reference),
            _ => None,
        }
    }
}

/// Every kind of node the parser can produce
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Rule(RuleNode),
    Reference(Reference),
    Constant(Constant),
    Operation(Operation),
    Condition(Condition),
    Variations(Vec<VariationBranch>),
    Bareme(Schedule),
    Grille(Schedule),
    TauxProgressif(Schedule),
    Unite(UnitConversion),
    Arrondi(Arrondi),
    Inversion(Inversion),
    Contexte(Contexte),
    UnePossibilite(UnePossibilite),
    ApplicableSi(Guard),
    NonApplicableSi(Guard),
    ParDefaut(ParDefaut),
    Plancher(Bound),
    Plafond(Bound),
    Abattement(Abattement),
    EstNonDefini(NodeRef),
    EstNonApplicable(NodeRef),
    ResoudreReferenceCirculaire(CircularResolution),
    Duree(Duree),
    Texte(Vec<TextPart>),
    SimplifierUnite(NodeRef),
}

impl NodeKind {
    /// Name of the node kind, as written in rule definitions
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Rule(_) => "rule",
            NodeKind::Reference(_) => "reference",
            NodeKind::Constant(_) => "constant",
            NodeKind::Operation(_) => "operation",
            NodeKind::Condition(_) => "condition",
            NodeKind::Variations(_) => "variations",
            NodeKind::Bareme(_) => "barème",
            NodeKind::Grille(_) => "grille",
            NodeKind::TauxProgressif(_) => "taux progressif",
            NodeKind::Unite(_) => "unité",
            NodeKind::Arrondi(_) => "arrondi",
            NodeKind::Inversion(_) => "inversion",
            NodeKind::Contexte(_) => "contexte",
            NodeKind::UnePossibilite(_) => "une possibilité",
            NodeKind::ApplicableSi(_) => "applicable si",
            NodeKind::NonApplicableSi(_) => "non applicable si",
            NodeKind::ParDefaut(_) => "par défaut",
            NodeKind::Plancher(_) => "plancher",
            NodeKind::Plafond(_) => "plafond",
            NodeKind::Abattement(_) => "abattement",
            NodeKind::EstNonDefini(_) => "est non défini",
            NodeKind::EstNonApplicable(_) => "est non applicable",
            NodeKind::ResoudreReferenceCirculaire(_) => "résoudre la référence circulaire",
            NodeKind::Duree(_) => "durée",
            NodeKind::Texte(_) => "texte",
            NodeKind::SimplifierUnite(_) => "simplifier l'unité",
        }
    }
}

/// A concrete value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Number(f64),
    Text(String),
    Boolean(bool),
    Date(NaiveDate),
}

impl LiteralValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            LiteralValue::Number(_) => ValueType::Number,
            LiteralValue::Text(_) => ValueType::Text,
            LiteralValue::Boolean(_) => ValueType::Boolean,
            LiteralValue::Date(_) => ValueType::Date,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            LiteralValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            LiteralValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Number(n) => write!(f, "{}", n),
            LiteralValue::Text(s) => write!(f, "'{}'", s),
            LiteralValue::Boolean(true) => write!(f, "oui"),
            LiteralValue::Boolean(false) => write!(f, "non"),
            LiteralValue::Date(d) => write!(f, "{}", d.format("%d/%m/%Y")),
        }
    }
}

/// Scalar type of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Number,
    Text,
    Boolean,
    Date,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Number => "number",
            ValueType::Text => "string",
            ValueType::Boolean => "boolean",
            ValueType::Date => "date",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub value: NodeValue,
    pub unit: Option<Unit>,
}

/// A reference to a rule, as written (`name`) and once resolved (`dotted_name`)
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub name: String,
    pub dotted_name: Option<String>,
    /// Rule in which the reference was written
    pub context: String,
}

/// A rule name written outside an expression (contexte keys, inversion
/// candidates, replacement targets), resolved during disambiguation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceName {
    pub name: String,
    pub dotted_name: Option<String>,
}

impl ReferenceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dotted_name: None,
        }
    }

    /// The resolved name, or the written one before resolution
    pub fn resolved(&self) -> &str {
        self.dotted_name.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Display for ReferenceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resolved())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    IntegerDivide,
    Power,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Equal,
    NotEqual,
    And,
    Or,
    Min,
    Max,
}

impl Operator {
    pub fn from_symbol(symbol: &str) -> Option<Operator> {
        let operator = match symbol {
            "+" => Operator::Add,
            "-" => Operator::Subtract,
            "*" => Operator::Multiply,
            "/" => Operator::Divide,
            "//" => Operator::IntegerDivide,
            "**" => Operator::Power,
            "<" => Operator::LessThan,
            "<=" => Operator::LessThanOrEqual,
            ">" => Operator::GreaterThan,
            ">=" => Operator::GreaterThanOrEqual,
            "=" => Operator::Equal,
            "!=" => Operator::NotEqual,
            "et" => Operator::And,
            "ou" => Operator::Or,
            "min" => Operator::Min,
            "max" => Operator::Max,
            _ => return None,
        };
        Some(operator)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::IntegerDivide => "//",
            Operator::Power => "**",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
            Operator::And => "et",
            Operator::Or => "ou",
            Operator::Min => "min",
            Operator::Max => "max",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::LessThan
                | Operator::LessThanOrEqual
                | Operator::GreaterThan
                | Operator::GreaterThanOrEqual
                | Operator::Equal
                | Operator::NotEqual
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, Operator::And | Operator::Or)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub operator: Operator,
    pub left: NodeRef,
    pub right: NodeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub si: NodeRef,
    pub alors: NodeRef,
    pub sinon: NodeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariationBranch {
    pub condition: NodeRef,
    pub consequence: NodeRef,
}

/// Shared shape of `barème`, `grille` and `taux progressif`
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub assiette: NodeRef,
    pub multiplicateur: NodeRef,
    pub tranches: Vec<Tranche>,
}

/// One bracket; the last bracket usually has no upper threshold
#[derive(Debug, Clone, PartialEq)]
pub struct Tranche {
    pub plafond: Option<NodeRef>,
    /// `taux` for barème and taux progressif, `montant` for grille
    pub value: NodeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitConversion {
    pub valeur: NodeRef,
    pub unit: Option<Unit>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arrondi {
    pub valeur: NodeRef,
    /// Number of decimals to keep
    pub precision: NodeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inversion {
    /// Rule whose value is solved for
    pub rule: String,
    pub candidates: Vec<ReferenceName>,
    pub unit: Option<Unit>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contexte {
    pub valeur: NodeRef,
    pub amendments: Vec<ContextAmendment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextAmendment {
    pub target: ReferenceName,
    pub value: NodeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnePossibilite {
    pub possibilities: Vec<NodeRef>,
    pub mandatory: bool,
}

impl UnePossibilite {
    /// Text of each possibility that is a plain string or a rule name
    pub fn names(&self) -> Vec<String> {
        self.possibilities
            .iter()
            .filter_map(|p| match &p.kind {
                NodeKind::Constant(Constant {
                    value: NodeValue::Value(LiteralValue::Text(text)),
                    ..
                }) => Some(text.clone()),
                NodeKind::Reference(reference) => Some(leaf_name(&reference.name).to_string()),
                _ => None,
            })
            .collect()
    }
}

/// `applicable si` / `non applicable si`
#[derive(Debug, Clone, PartialEq)]
pub struct Guard {
    pub condition: NodeRef,
    pub valeur: NodeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParDefaut {
    pub valeur: NodeRef,
    pub default: NodeRef,
}

/// `plancher` / `plafond`
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub valeur: NodeRef,
    pub bound: NodeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Abattement {
    pub valeur: NodeRef,
    pub abattement: NodeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircularResolution {
    pub valeur: NodeRef,
    pub rule: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Duree {
    pub depuis: NodeRef,
    /// Defaults to today
    pub jusqua: Option<NodeRef>,
    pub unit: Unit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TextPart {
    Literal(String),
    Node(NodeRef),
}

/// A named rule
#[derive(Debug, Clone, PartialEq)]
pub struct RuleNode {
    pub dotted_name: String,
    pub title: Option<String>,
    pub question: Option<String>,
    pub description: Option<String>,
    pub private: bool,
    pub valeur: NodeRef,
    /// Ancestor namespaces that exist as rules, nearest first
    pub parents: Vec<NodeRef>,
    pub possibilities: Option<NodeRef>,
    /// Rule-level `par défaut`, applied when the value is undefined
    pub default_value: Option<NodeRef>,
    /// Declared unit (`unité` key)
    pub unit: Option<Unit>,
    pub replacements: Vec<Arc<ReplacementRule>>,
    /// True for the implicit `$SITUATION` child
    pub situation_seam: bool,
}

/// Identifier of a replacement declaration: declaring rule plus position
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReplacementId {
    pub definition_rule: String,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplacementKind {
    /// `remplace`: the declaring rule's value is used instead
    Value,
    /// `rend non applicable`: the target becomes not applicable
    NotApplicable,
}

/// An override declared by `definition_rule` on `replaced`
#[derive(Debug, Clone, PartialEq)]
pub struct ReplacementRule {
    pub id: ReplacementId,
    pub definition_rule: String,
    pub replaced: ReferenceName,
    /// Only applies to references written in these namespaces (`dans`)
    pub whitelist: Vec<String>,
    /// Never applies to references written in these namespaces (`sauf dans`)
    pub blacklist: Vec<String>,
    pub priority: i64,
    pub kind: ReplacementKind,
}

/// Normalize a written rule name: `a.b` and `a .  b` both become `a . b`
pub fn normalize_name(raw: &str) -> String {
    raw.split('.')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

pub fn split_name(dotted_name: &str) -> Vec<&str> {
    dotted_name.split(SEPARATOR).collect()
}

pub fn join_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else if name.is_empty() {
        namespace.to_string()
    } else {
        format!("{}{}{}", namespace, SEPARATOR, name)
    }
}

pub fn parent_name(dotted_name: &str) -> Option<&str> {
    dotted_name.rfind(SEPARATOR).map(|index| &dotted_name[..index])
}

pub fn leaf_name(dotted_name: &str) -> &str {
    match dotted_name.rfind(SEPARATOR) {
        Some(index) => &dotted_name[index + SEPARATOR.len()..],
        None => dotted_name,
    }
}

/// Ancestor namespaces, nearest first (the root is not included)
pub fn ancestors(dotted_name: &str) -> Vec<&str> {
    let mut ancestors = Vec::new();
    let mut current = dotted_name;
    while let Some(parent) = parent_name(current) {
        ancestors.push(parent);
        current = parent;
    }
    ancestors
}

/// Whether `name` is `namespace` itself or lives below it
pub fn is_within(name: &str, namespace: &str) -> bool {
    namespace.is_empty()
        || name == namespace
        || (name.starts_with(namespace) && name[namespace.len()..].starts_with(SEPARATOR))
}

pub fn situation_name(dotted_name: &str) -> String {
    join_name(dotted_name, SITUATION_SEGMENT)
}
