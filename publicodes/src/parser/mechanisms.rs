//! Mechanism registry
//!
//! A mechanism object holds exactly one mechanism key (or `valeur`), plus any
//! number of chainable keys. Chainable keys are peeled off first, in
//! `CHAINABLE` order, each one wrapping the node parsed from the remaining
//! keys: `{valeur: x, arrondi: oui, unité: €}` is `arrondi(unité(x))`.
//!
//! Inline mechanisms (`somme`, `produit`, `le maximum de`, ...) are expanded
//! into base operators at parse time.

use crate::error::EngineError;
use crate::evaluated::NodeValue;
use crate::parser::expressions::parse_inline;
use crate::parser::literals::{expression_text, scalar_value};
use crate::parser::ParseContext;
use crate::semantic::{
    normalize_name, Abattement, Arrondi, Bound, CircularResolution, Condition, Contexte,
    ContextAmendment, Duree, Guard, Inversion, LiteralValue, Node, NodeKind, NodeRef, Operator,
    ParDefaut, ReferenceName, Schedule, TextPart, Tranche, UnePossibilite, UnitConversion,
    VariationBranch,
};
use crate::units::Unit;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

type ParseFn = fn(&Value, &ParseContext) -> Result<NodeRef, EngineError>;
type ChainFn = fn(NodeRef, &Value, &ParseContext) -> Result<NodeRef, EngineError>;

/// Chainable mechanisms, outermost first
pub const CHAINABLE: &[(&str, ChainFn)] = &[
    ("contexte", chain_contexte),
    ("applicable si", chain_applicable_si),
    ("non applicable si", chain_non_applicable_si),
    ("arrondi", chain_arrondi),
    ("unité", chain_unite),
    ("simplifier l'unité", chain_simplifier_unite),
    ("plancher", chain_plancher),
    ("plafond", chain_plafond),
    ("par défaut", chain_par_defaut),
    ("abattement", chain_abattement),
    ("résoudre la référence circulaire", chain_circular_resolution),
];

/// Mechanisms taking the whole object level
pub const MECHANISMS: &[(&str, ParseFn)] = &[
    ("somme", parse_somme),
    ("produit", parse_produit),
    ("moyenne", parse_moyenne),
    ("le maximum de", parse_maximum),
    ("le minimum de", parse_minimum),
    ("toutes ces conditions", parse_toutes_ces_conditions),
    ("une de ces conditions", parse_une_de_ces_conditions),
    ("condition", parse_condition),
    ("variations", parse_variations),
    ("barème", parse_bareme),
    ("grille", parse_grille),
    ("taux progressif", parse_taux_progressif),
    ("inversion", parse_inversion),
    ("inversion numérique", parse_inversion),
    ("une possibilité", parse_une_possibilite),
    ("est non défini", parse_est_non_defini),
    ("est non applicable", parse_est_non_applicable),
    ("est défini", parse_est_defini),
    ("est applicable", parse_est_applicable),
    ("durée", parse_duree),
    ("texte", parse_texte),
];

pub fn is_chainable(key: &str) -> bool {
    CHAINABLE.iter().any(|(name, _)| *name == key)
}

pub fn is_mechanism(key: &str) -> bool {
    key == "valeur" || MECHANISMS.iter().any(|(name, _)| *name == key) || is_chainable(key)
}

/// Every mechanism name the registry knows, chainable ones included
pub fn mechanism_names() -> impl Iterator<Item = &'static str> {
    CHAINABLE
        .iter()
        .map(|(name, _)| *name)
        .chain(MECHANISMS.iter().map(|(name, _)| *name))
}

/// Parse any value found in a mechanism position
pub fn parse_value(value: &Value, context: &ParseContext) -> Result<NodeRef, EngineError> {
    match value {
        Value::String(text) => parse_inline(text, context),
        Value::Object(map) => parse_object(map, context),
        Value::Array(_) => Err(EngineError::syntax(
            context.dotted_name,
            "a list is only allowed as the argument of a mechanism",
        )),
        scalar => scalar_value(scalar)
            .map(|value| Node::constant(value, None, context.ids))
            .ok_or_else(|| {
                EngineError::syntax(context.dotted_name, format!("invalid value {}", scalar))
            }),
    }
}

pub fn parse_object(
    map: &Map<String, Value>,
    context: &ParseContext,
) -> Result<NodeRef, EngineError> {
    parse_object_or(map, context, None)
}

/// Parse a mechanism object, using `fallback` when only chainable keys remain
pub fn parse_object_or(
    map: &Map<String, Value>,
    context: &ParseContext,
    fallback: Option<&NodeRef>,
) -> Result<NodeRef, EngineError> {
    if let Some((key, wrap)) = CHAINABLE.iter().find(|(key, _)| map.contains_key(*key)) {
        let mut rest = map.clone();
        let arguments = rest.remove(*key).unwrap_or(Value::Null);
        let inner = match (rest.is_empty(), fallback) {
            (true, Some(fallback)) => fallback.clone(),
            (true, None) => {
                return Err(EngineError::syntax(
                    context.dotted_name,
                    format!("mechanism \"{}\" needs a \"valeur\"", key),
                ))
            }
            (false, _) => parse_object_or(&rest, context, fallback)?,
        };
        return wrap(inner, &arguments, context);
    }

    let mut entries = map.iter();
    match (entries.next(), entries.next()) {
        (Some((key, arguments)), None) => dispatch(key, arguments, context),
        (None, _) => fallback.cloned().ok_or_else(|| {
            EngineError::syntax(context.dotted_name, "empty mechanism definition")
        }),
        (Some((first, _)), Some((second, _))) => Err(EngineError::syntax(
            context.dotted_name,
            format!(
                "only one mechanism is allowed per level, found \"{}\" and \"{}\"",
                first, second
            ),
        )),
    }
}

fn dispatch(key: &str, arguments: &Value, context: &ParseContext) -> Result<NodeRef, EngineError> {
    if key == "valeur" {
        return parse_value(arguments, context);
    }
    match MECHANISMS.iter().find(|(name, _)| *name == key) {
        Some((_, parse)) => parse(arguments, context),
        None => Err(EngineError::syntax(
            context.dotted_name,
            format!("unknown mechanism \"{}\"", key),
        )),
    }
}

/// Apply one chainable mechanism by name around `inner`
pub fn wrap_chainable(
    key: &str,
    inner: NodeRef,
    arguments: &Value,
    context: &ParseContext,
) -> Result<NodeRef, EngineError> {
    match CHAINABLE.iter().find(|(name, _)| *name == key) {
        Some((_, wrap)) => wrap(inner, arguments, context),
        None => Err(EngineError::Internal(format!(
            "\"{}\" is not a chainable mechanism",
            key
        ))),
    }
}

fn expect_list<'v>(
    name: &str,
    value: &'v Value,
    context: &ParseContext,
) -> Result<&'v Vec<Value>, EngineError> {
    value.as_array().ok_or_else(|| {
        EngineError::syntax(
            context.dotted_name,
            format!("mechanism \"{}\" expects a list", name),
        )
    })
}

fn expect_object<'v>(
    name: &str,
    value: &'v Value,
    context: &ParseContext,
) -> Result<&'v Map<String, Value>, EngineError> {
    value.as_object().ok_or_else(|| {
        EngineError::syntax(
            context.dotted_name,
            format!("mechanism \"{}\" expects an object", name),
        )
    })
}

fn required<'v>(
    mechanism: &str,
    map: &'v Map<String, Value>,
    key: &str,
    context: &ParseContext,
) -> Result<&'v Value, EngineError> {
    map.get(key).ok_or_else(|| {
        EngineError::syntax(
            context.dotted_name,
            format!("mechanism \"{}\" is missing \"{}\"", mechanism, key),
        )
    })
}

fn is_enabled(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim() == "oui",
        _ => false,
    }
}

/// Right fold of `items` with `operator`; `empty` is used for an empty list
fn fold(
    name: &str,
    value: &Value,
    operator: Operator,
    empty: NodeValue,
    context: &ParseContext,
) -> Result<NodeRef, EngineError> {
    let items = expect_list(name, value, context)?;
    let mut nodes = items
        .iter()
        .map(|item| parse_value(item, context))
        .collect::<Result<Vec<_>, _>>()?;
    let Some(mut result) = nodes.pop() else {
        return Ok(Node::constant(empty, None, context.ids));
    };
    while let Some(left) = nodes.pop() {
        result = Node::operation(operator, left, result, context.ids);
    }
    Ok(result)
}

fn parse_somme(value: &Value, context: &ParseContext) -> Result<NodeRef, EngineError> {
    fold("somme", value, Operator::Add, NodeValue::number(0.0), context)
}

fn parse_produit(value: &Value, context: &ParseContext) -> Result<NodeRef, EngineError> {
    fold("produit", value, Operator::Multiply, NodeValue::number(1.0), context)
}

fn parse_moyenne(value: &Value, context: &ParseContext) -> Result<NodeRef, EngineError> {
    let count = expect_list("moyenne", value, context)?.len();
    if count == 0 {
        return Err(EngineError::syntax(
            context.dotted_name,
            "mechanism \"moyenne\" needs at least one value",
        ));
    }
    let sum = fold("moyenne", value, Operator::Add, NodeValue::number(0.0), context)?;
    Ok(Node::operation(
        Operator::Divide,
        sum,
        Node::number(count as f64, None, context.ids),
        context.ids,
    ))
}

fn parse_maximum(value: &Value, context: &ParseContext) -> Result<NodeRef, EngineError> {
    fold("le maximum de", value, Operator::Max, NodeValue::NotApplicable, context)
}

fn parse_minimum(value: &Value, context: &ParseContext) -> Result<NodeRef, EngineError> {
    fold("le minimum de", value, Operator::Min, NodeValue::NotApplicable, context)
}

fn parse_toutes_ces_conditions(
    value: &Value,
    context: &ParseContext,
) -> Result<NodeRef, EngineError> {
    fold(
        "toutes ces conditions",
        value,
        Operator::And,
        NodeValue::boolean(true),
        context,
    )
}

fn parse_une_de_ces_conditions(
    value: &Value,
    context: &ParseContext,
) -> Result<NodeRef, EngineError> {
    fold(
        "une de ces conditions",
        value,
        Operator::Or,
        NodeValue::boolean(false),
        context,
    )
}

fn parse_condition(value: &Value, context: &ParseContext) -> Result<NodeRef, EngineError> {
    let map = expect_object("condition", value, context)?;
    let si = parse_value(required("condition", map, "si", context)?, context)?;
    let alors = parse_value(required("condition", map, "alors", context)?, context)?;
    let sinon = match map.get("sinon") {
        Some(sinon) => parse_value(sinon, context)?,
        None => Node::not_applicable(context.ids),
    };
    Ok(Node::new(
        NodeKind::Condition(Condition { si, alors, sinon }),
        context.ids,
    ))
}

fn parse_variations(value: &Value, context: &ParseContext) -> Result<NodeRef, EngineError> {
    let items = expect_list("variations", value, context)?;
    let mut branches = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let map = expect_object("variations", item, context)?;
        if let Some(sinon) = map.get("sinon") {
            if index + 1 != items.len() {
                return Err(EngineError::syntax(
                    context.dotted_name,
                    "\"sinon\" must be the last branch of \"variations\"",
                ));
            }
            branches.push(VariationBranch {
                condition: Node::boolean(true, context.ids),
                consequence: parse_value(sinon, context)?,
            });
        } else {
            branches.push(VariationBranch {
                condition: parse_value(required("variations", map, "si", context)?, context)?,
                consequence: parse_value(required("variations", map, "alors", context)?, context)?,
            });
        }
    }
    Ok(Node::new(NodeKind::Variations(branches), context.ids))
}

fn parse_schedule(
    name: &str,
    value_key: &str,
    value: &Value,
    context: &ParseContext,
) -> Result<Schedule, EngineError> {
    let map = expect_object(name, value, context)?;
    let assiette = parse_value(required(name, map, "assiette", context)?, context)?;
    let multiplicateur = match map.get("multiplicateur") {
        Some(multiplicateur) => parse_value(multiplicateur, context)?,
        None => Node::number(1.0, None, context.ids),
    };
    let items = expect_list(name, required(name, map, "tranches", context)?, context)?;
    let mut tranches = Vec::with_capacity(items.len());
    for item in items {
        let tranche = expect_object(name, item, context)?;
        let plafond = tranche
            .get("plafond")
            .map(|plafond| parse_value(plafond, context))
            .transpose()?;
        let value = parse_value(required(name, tranche, value_key, context)?, context)?;
        tranches.push(Tranche { plafond, value });
    }
    Ok(Schedule {
        assiette,
        multiplicateur,
        tranches,
    })
}

fn parse_bareme(value: &Value, context: &ParseContext) -> Result<NodeRef, EngineError> {
    let schedule = parse_schedule("barème", "taux", value, context)?;
    Ok(Node::new(NodeKind::Bareme(schedule), context.ids))
}

fn parse_grille(value: &Value, context: &ParseContext) -> Result<NodeRef, EngineError> {
    let schedule = parse_schedule("grille", "montant", value, context)?;
    Ok(Node::new(NodeKind::Grille(schedule), context.ids))
}

fn parse_taux_progressif(value: &Value, context: &ParseContext) -> Result<NodeRef, EngineError> {
    let schedule = parse_schedule("taux progressif", "taux", value, context)?;
    Ok(Node::new(NodeKind::TauxProgressif(schedule), context.ids))
}

fn parse_unit_argument(value: &Value, context: &ParseContext) -> Result<Option<Unit>, EngineError> {
    let text = value.as_str().ok_or_else(|| {
        EngineError::syntax(context.dotted_name, format!("invalid unit {}", value))
    })?;
    Unit::parse(text, context.unit_normalizer)
        .map(Unit::non_empty)
        .map_err(|error| EngineError::syntax(context.dotted_name, error.to_string()))
}

fn parse_inversion(value: &Value, context: &ParseContext) -> Result<NodeRef, EngineError> {
    let map = expect_object("inversion", value, context)?;
    let candidates = expect_list("inversion", required("inversion", map, "avec", context)?, context)?
        .iter()
        .map(|candidate| {
            candidate
                .as_str()
                .map(|name| ReferenceName::new(normalize_name(name)))
                .ok_or_else(|| {
                    EngineError::syntax(
                        context.dotted_name,
                        format!("inversion candidate {} is not a rule name", candidate),
                    )
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let unit = match map.get("unité") {
        Some(unit) => parse_unit_argument(unit, context)?,
        None => None,
    };
    Ok(Node::new(
        NodeKind::Inversion(Inversion {
            rule: context.dotted_name.to_string(),
            candidates,
            unit,
        }),
        context.ids,
    ))
}

/// Possibility list: bare names are child rules, quoted names are text
pub fn parse_une_possibilite(
    value: &Value,
    context: &ParseContext,
) -> Result<NodeRef, EngineError> {
    let (items, mandatory) = match value {
        Value::Array(items) => (items, true),
        Value::Object(map) => (
            expect_list(
                "une possibilité",
                required("une possibilité", map, "possibilités", context)?,
                context,
            )?,
            map.get("choix obligatoire").map_or(true, is_enabled),
        ),
        _ => {
            return Err(EngineError::syntax(
                context.dotted_name,
                "mechanism \"une possibilité\" expects a list of possibilities",
            ))
        }
    };
    let possibilities = items
        .iter()
        .map(|item| parse_value(item, context))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Node::new(
        NodeKind::UnePossibilite(UnePossibilite {
            possibilities,
            mandatory,
        }),
        context.ids,
    ))
}

fn parse_est_non_defini(value: &Value, context: &ParseContext) -> Result<NodeRef, EngineError> {
    let inner = parse_value(value, context)?;
    Ok(Node::new(NodeKind::EstNonDefini(inner), context.ids))
}

fn parse_est_non_applicable(value: &Value, context: &ParseContext) -> Result<NodeRef, EngineError> {
    let inner = parse_value(value, context)?;
    Ok(Node::new(NodeKind::EstNonApplicable(inner), context.ids))
}

fn negate(test: NodeRef, context: &ParseContext) -> NodeRef {
    Node::new(
        NodeKind::Condition(Condition {
            si: test,
            alors: Node::boolean(false, context.ids),
            sinon: Node::boolean(true, context.ids),
        }),
        context.ids,
    )
}

fn parse_est_defini(value: &Value, context: &ParseContext) -> Result<NodeRef, EngineError> {
    Ok(negate(parse_est_non_defini(value, context)?, context))
}

fn parse_est_applicable(value: &Value, context: &ParseContext) -> Result<NodeRef, EngineError> {
    Ok(negate(parse_est_non_applicable(value, context)?, context))
}

fn parse_duree(value: &Value, context: &ParseContext) -> Result<NodeRef, EngineError> {
    let map = expect_object("durée", value, context)?;
    let depuis = parse_value(required("durée", map, "depuis", context)?, context)?;
    let jusqua = map
        .get("jusqu'à")
        .map(|jusqua| parse_value(jusqua, context))
        .transpose()?;
    let unit = match map.get("unité") {
        Some(unit) => parse_unit_argument(unit, context)?.unwrap_or_else(|| Unit::symbol("jour")),
        None => Unit::symbol("jour"),
    };
    Ok(Node::new(
        NodeKind::Duree(Duree {
            depuis,
            jusqua,
            unit,
        }),
        context.ids,
    ))
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{\{\s*(.+?)\s*\}\}").expect("static regex"))
}

fn parse_texte(value: &Value, context: &ParseContext) -> Result<NodeRef, EngineError> {
    let template = value.as_str().ok_or_else(|| {
        EngineError::syntax(context.dotted_name, "mechanism \"texte\" expects a string")
    })?;
    let mut parts = Vec::new();
    let mut last = 0;
    for captures in placeholder_regex().captures_iter(template) {
        let (Some(whole), Some(expression)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        if whole.start() > last {
            parts.push(TextPart::Literal(template[last..whole.start()].to_string()));
        }
        parts.push(TextPart::Node(parse_inline(expression.as_str(), context)?));
        last = whole.end();
    }
    if last < template.len() {
        parts.push(TextPart::Literal(template[last..].to_string()));
    }
    Ok(Node::new(NodeKind::Texte(parts), context.ids))
}

fn chain_contexte(
    valeur: NodeRef,
    arguments: &Value,
    context: &ParseContext,
) -> Result<NodeRef, EngineError> {
    let map = expect_object("contexte", arguments, context)?;
    let amendments = map
        .iter()
        .map(|(name, value)| {
            Ok(ContextAmendment {
                target: ReferenceName::new(normalize_name(name)),
                value: parse_value(value, context)?,
            })
        })
        .collect::<Result<Vec<_>, EngineError>>()?;
    Ok(Node::new(
        NodeKind::Contexte(Contexte {
            valeur,
            amendments,
        }),
        context.ids,
    ))
}

fn chain_applicable_si(
    valeur: NodeRef,
    arguments: &Value,
    context: &ParseContext,
) -> Result<NodeRef, EngineError> {
    let condition = parse_value(arguments, context)?;
    Ok(Node::new(
        NodeKind::ApplicableSi(Guard { condition, valeur }),
        context.ids,
    ))
}

fn chain_non_applicable_si(
    valeur: NodeRef,
    arguments: &Value,
    context: &ParseContext,
) -> Result<NodeRef, EngineError> {
    let condition = parse_value(arguments, context)?;
    Ok(Node::new(
        NodeKind::NonApplicableSi(Guard { condition, valeur }),
        context.ids,
    ))
}

fn chain_arrondi(
    valeur: NodeRef,
    arguments: &Value,
    context: &ParseContext,
) -> Result<NodeRef, EngineError> {
    let precision = match arguments {
        Value::Bool(false) => return Ok(valeur),
        Value::Bool(true) => Node::number(0.0, None, context.ids),
        // `2 décimales` parses as a quantity whose unit is ignored
        other => match expression_text(other) {
            Some(text) if text.trim() == "non" => return Ok(valeur),
            Some(text) if text.trim() == "oui" => Node::number(0.0, None, context.ids),
            _ => parse_value(other, context)?,
        },
    };
    Ok(Node::new(
        NodeKind::Arrondi(Arrondi { valeur, precision }),
        context.ids,
    ))
}

fn chain_unite(
    valeur: NodeRef,
    arguments: &Value,
    context: &ParseContext,
) -> Result<NodeRef, EngineError> {
    let unit = parse_unit_argument(arguments, context)?;
    Ok(Node::new(
        NodeKind::Unite(UnitConversion { valeur, unit }),
        context.ids,
    ))
}

fn chain_simplifier_unite(
    valeur: NodeRef,
    arguments: &Value,
    context: &ParseContext,
) -> Result<NodeRef, EngineError> {
    if !is_enabled(arguments) {
        return Ok(valeur);
    }
    Ok(Node::new(NodeKind::SimplifierUnite(valeur), context.ids))
}

fn chain_plancher(
    valeur: NodeRef,
    arguments: &Value,
    context: &ParseContext,
) -> Result<NodeRef, EngineError> {
    let bound = parse_value(arguments, context)?;
    Ok(Node::new(NodeKind::Plancher(Bound { valeur, bound }), context.ids))
}

fn chain_plafond(
    valeur: NodeRef,
    arguments: &Value,
    context: &ParseContext,
) -> Result<NodeRef, EngineError> {
    let bound = parse_value(arguments, context)?;
    Ok(Node::new(NodeKind::Plafond(Bound { valeur, bound }), context.ids))
}

fn chain_par_defaut(
    valeur: NodeRef,
    arguments: &Value,
    context: &ParseContext,
) -> Result<NodeRef, EngineError> {
    let default = parse_value(arguments, context)?;
    Ok(Node::new(
        NodeKind::ParDefaut(ParDefaut { valeur, default }),
        context.ids,
    ))
}

fn chain_abattement(
    valeur: NodeRef,
    arguments: &Value,
    context: &ParseContext,
) -> Result<NodeRef, EngineError> {
    let abattement = parse_value(arguments, context)?;
    Ok(Node::new(
        NodeKind::Abattement(Abattement { valeur, abattement }),
        context.ids,
    ))
}

fn chain_circular_resolution(
    valeur: NodeRef,
    arguments: &Value,
    context: &ParseContext,
) -> Result<NodeRef, EngineError> {
    if !is_enabled(arguments) {
        return Ok(valeur);
    }
    Ok(Node::new(
        NodeKind::ResoudreReferenceCirculaire(CircularResolution {
            valeur,
            rule: context.dotted_name.to_string(),
        }),
        context.ids,
    ))
}

/// Text value of a constant node, if it is one
pub fn constant_text(node: &NodeRef) -> Option<&str> {
    match &node.kind {
        NodeKind::Constant(constant) => match &constant.value {
            NodeValue::Value(LiteralValue::Text(text)) => Some(text),
            _ => None,
        },
        _ => None,
    }
}
