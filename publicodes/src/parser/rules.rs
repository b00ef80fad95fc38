use crate::error::EngineError;
use crate::evaluated::NodeValue;
use crate::parser::mechanisms::{parse_object_or, parse_une_possibilite, parse_value, wrap_chainable};
use crate::parser::ParseContext;
use crate::semantic::{
    join_name, normalize_name, situation_name, Condition, LiteralValue, Node, NodeKind, NodeRef,
    ReferenceName, ReplacementId, ReplacementKind, ReplacementRule, RuleNode,
};
use crate::units::Unit;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Parsed rules by dotted name
pub type ParsedRules = BTreeMap<String, NodeRef>;

/// Keys documenting a rule, with no effect on its value
const DOCUMENTATION_KEYS: &[&str] = &[
    "titre",
    "question",
    "description",
    "note",
    "références",
    "meta",
    "icônes",
    "résumé",
    "exemples",
    "suggestions",
    "identifiant court",
    "acronyme",
    "type",
    "experimental",
];

/// Keys handled by the rule itself rather than the mechanism chain
const RULE_KEYS: &[&str] = &[
    "privé",
    "avec",
    "une possibilité",
    "par défaut",
    "remplace",
    "rend non applicable",
    "applicable si",
    "non applicable si",
    "contexte",
];

/// Guards wrapped around the situation seam, innermost first
const RULE_GUARDS: &[&str] = &["non applicable si", "applicable si", "contexte"];

/// Parse a rule map into rule nodes
///
/// `existing` holds the rules already known to the engine: declaring one of
/// them again is an error. `settings` carries the parse settings; its rule
/// name is ignored.
pub fn parse_rules(
    raw: &Value,
    existing: &ParsedRules,
    settings: &ParseContext,
) -> Result<ParsedRules, EngineError> {
    let map = raw
        .as_object()
        .ok_or_else(|| EngineError::syntax("", "the rule map must be an object"))?;
    let mut parsed = ParsedRules::new();
    for (name, definition) in map {
        parse_rule(&normalize_name(name), definition, existing, settings, &mut parsed)?;
    }
    if existing.len() + parsed.len() > settings.limits.max_rules {
        return Err(EngineError::syntax(
            "",
            format!("rule set exceeds {} rules", settings.limits.max_rules),
        ));
    }
    Ok(parsed)
}

fn parse_rule(
    dotted_name: &str,
    definition: &Value,
    existing: &ParsedRules,
    settings: &ParseContext,
    parsed: &mut ParsedRules,
) -> Result<(), EngineError> {
    if dotted_name.is_empty() || dotted_name.split(" . ").any(str::is_empty) {
        return Err(EngineError::syntax(dotted_name, "invalid rule name"));
    }
    if existing.contains_key(dotted_name) || parsed.contains_key(dotted_name) {
        return Err(EngineError::syntax(
            dotted_name,
            "rule is already defined",
        ));
    }
    let context = settings.with_rule(dotted_name);
    let definition = rule_definition(definition, &context)?;

    if let Some(children) = definition.get("avec") {
        let children = children.as_object().ok_or_else(|| {
            EngineError::syntax(dotted_name, "\"avec\" expects an object of rules")
        })?;
        for (child, child_definition) in children {
            let child_name = join_name(dotted_name, &normalize_name(child));
            parse_rule(&child_name, child_definition, existing, settings, parsed)?;
        }
    }

    let private = definition.get("privé").is_some_and(is_yes);
    let text = |key: &str| definition.get(key).and_then(Value::as_str).map(str::to_string);

    let unit = match definition.get("unité") {
        Some(Value::String(unit)) => Unit::parse(unit, context.unit_normalizer)
            .map(Unit::non_empty)
            .map_err(|error| EngineError::syntax(dotted_name, error.to_string()))?,
        Some(other) => {
            return Err(EngineError::syntax(
                dotted_name,
                format!("invalid unit {}", other),
            ))
        }
        None => None,
    };

    let possibilities = definition
        .get("une possibilité")
        .map(|value| parse_une_possibilite(value, &context))
        .transpose()?;
    if let Some(possibilities) = &possibilities {
        check_possibility_units(possibilities, &context)?;
    }

    let default_value = definition
        .get("par défaut")
        .map(|value| parse_value(value, &context))
        .transpose()?;

    let mut replacements = Vec::new();
    for (key, kind) in [
        ("remplace", ReplacementKind::Value),
        ("rend non applicable", ReplacementKind::NotApplicable),
    ] {
        if let Some(value) = definition.get(key) {
            parse_replacements(value, kind, &context, &mut replacements)?;
        }
    }

    let body_keys: Map<String, Value> = definition
        .iter()
        .filter(|(key, _)| {
            !DOCUMENTATION_KEYS.contains(&key.as_str()) && !RULE_KEYS.contains(&key.as_str())
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    let undefined = Node::undefined(context.ids);
    let mut valeur = parse_object_or(&body_keys, &context, Some(&undefined))?;

    if !private {
        let seam_name = situation_name(dotted_name);
        let seam = RuleNode {
            dotted_name: seam_name.clone(),
            title: None,
            question: None,
            description: None,
            private: false,
            valeur: Node::undefined(context.ids),
            parents: Vec::new(),
            possibilities: None,
            default_value: None,
            unit: unit.clone(),
            replacements: Vec::new(),
            situation_seam: true,
        };
        parsed.insert(seam_name.clone(), Node::new(NodeKind::Rule(seam), context.ids));
        valeur = situation_seam(&seam_name, valeur, &context);
    }

    for guard in RULE_GUARDS {
        if let Some(arguments) = definition.get(*guard) {
            valeur = wrap_chainable(guard, valeur, arguments, &context)?;
        }
    }

    let rule = RuleNode {
        dotted_name: dotted_name.to_string(),
        title: text("titre"),
        question: text("question"),
        description: text("description"),
        private,
        valeur,
        parents: Vec::new(),
        possibilities,
        default_value,
        unit,
        replacements,
        situation_seam: false,
    };
    parsed.insert(
        dotted_name.to_string(),
        Node::new(NodeKind::Rule(rule), context.ids),
    );
    Ok(())
}

/// Normalize the shorthand forms of a rule definition into a key map
fn rule_definition(
    definition: &Value,
    context: &ParseContext,
) -> Result<Map<String, Value>, EngineError> {
    match definition {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map.clone()),
        Value::String(_) | Value::Number(_) | Value::Bool(_) => {
            let mut map = Map::new();
            map.insert("valeur".to_string(), definition.clone());
            Ok(map)
        }
        Value::Array(_) => Err(EngineError::syntax(
            context.dotted_name,
            "a rule definition cannot be a list",
        )),
    }
}

fn is_yes(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim() == "oui",
        _ => false,
    }
}

/// `valeur` unless the situation provides a value for the rule
fn situation_seam(seam_name: &str, valeur: NodeRef, context: &ParseContext) -> NodeRef {
    let ids = context.ids;
    let seam = Node::resolved_reference(seam_name, context.dotted_name, ids);
    let unset = Node::new(NodeKind::EstNonDefini(seam.clone()), ids);
    Node::new(
        NodeKind::Condition(Condition {
            si: unset,
            alors: valeur,
            sinon: seam,
        }),
        ids,
    )
}

fn check_possibility_units(
    possibilities: &NodeRef,
    context: &ParseContext,
) -> Result<(), EngineError> {
    let NodeKind::UnePossibilite(une_possibilite) = &possibilities.kind else {
        return Ok(());
    };
    let mut first: Option<Option<&Unit>> = None;
    for possibility in &une_possibilite.possibilities {
        let NodeKind::Constant(constant) = &possibility.kind else {
            continue;
        };
        if !matches!(constant.value, NodeValue::Value(LiteralValue::Number(_))) {
            continue;
        }
        let unit = constant.unit.as_ref();
        match first {
            None => first = Some(unit),
            Some(reference) if !context.unit_table.are_compatible(reference, unit) => {
                return Err(EngineError::type_error(
                    context.dotted_name,
                    format!(
                        "possibilities mix incompatible units \"{}\" and \"{}\"",
                        crate::units::serialize_unit(reference),
                        crate::units::serialize_unit(unit)
                    ),
                ));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn namespaces(value: Option<&Value>, context: &ParseContext) -> Result<Vec<String>, EngineError> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::String(name)) => Ok(vec![normalize_name(name)]),
        Some(Value::Array(names)) => names
            .iter()
            .map(|name| {
                name.as_str().map(normalize_name).ok_or_else(|| {
                    EngineError::syntax(context.dotted_name, format!("invalid namespace {}", name))
                })
            })
            .collect(),
        Some(other) => Err(EngineError::syntax(
            context.dotted_name,
            format!("invalid namespace {}", other),
        )),
    }
}

fn parse_replacements(
    value: &Value,
    kind: ReplacementKind,
    context: &ParseContext,
    replacements: &mut Vec<Arc<ReplacementRule>>,
) -> Result<(), EngineError> {
    let declarations: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    for declaration in declarations {
        let (target, whitelist, blacklist, priority) = match declaration {
            Value::String(target) => (target.as_str(), Vec::new(), Vec::new(), 0),
            Value::Object(map) => {
                let target = map
                    .get("références à")
                    .or_else(|| map.get("règle"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        EngineError::syntax(
                            context.dotted_name,
                            "a replacement needs a \"références à\" rule name",
                        )
                    })?;
                let priority = match map.get("priorité") {
                    None => 0,
                    Some(priority) => priority.as_i64().ok_or_else(|| {
                        EngineError::syntax(
                            context.dotted_name,
                            format!("invalid replacement priority {}", priority),
                        )
                    })?,
                };
                (
                    target,
                    namespaces(map.get("dans"), context)?,
                    namespaces(map.get("sauf dans"), context)?,
                    priority,
                )
            }
            other => {
                return Err(EngineError::syntax(
                    context.dotted_name,
                    format!("invalid replacement {}", other),
                ))
            }
        };
        let id = ReplacementId {
            definition_rule: context.dotted_name.to_string(),
            index: replacements.len(),
        };
        replacements.push(Arc::new(ReplacementRule {
            id,
            definition_rule: context.dotted_name.to_string(),
            replaced: ReferenceName::new(normalize_name(target)),
            whitelist,
            blacklist,
            priority,
            kind,
        }));
    }
    Ok(())
}
