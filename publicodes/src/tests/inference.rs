use super::Fixture;
use crate::inference::{InferredType, TypeTable};
use crate::parser::ParsedRules;
use crate::semantic::ValueType;
use serde_json::json;

fn infer(rules: &ParsedRules, name: &str) -> InferredType {
    TypeTable::new().infer(&rules[name], rules)
}

#[test]
fn test_scalar_types() {
    let rules = Fixture::new().resolve(json!({
        "n": 5,
        "b": "oui",
        "t": "'CDI'",
        "d": "01/01/2024",
        "comparaison": "n > 3",
    }));
    assert_eq!(infer(&rules, "n").value_type, Some(ValueType::Number));
    assert_eq!(infer(&rules, "b").value_type, Some(ValueType::Boolean));
    assert_eq!(infer(&rules, "t").value_type, Some(ValueType::Text));
    assert_eq!(infer(&rules, "d").value_type, Some(ValueType::Date));
    assert_eq!(infer(&rules, "comparaison").value_type, Some(ValueType::Boolean));
}

#[test]
fn test_disabling_capability() {
    let rules = Fixture::new().resolve(json!({
        "n": 5,
        "b": "oui",
        "gardé": { "applicable si": "b", "valeur": 1 },
        "parent": { "non applicable si": "b", "valeur": 2 },
        "parent . enfant": 3,
    }));
    assert!(!infer(&rules, "n").can_disable());
    assert!(infer(&rules, "b").can_disable());
    assert!(infer(&rules, "gardé").nullable);
    // A rule below a nullable parent is nullable as well
    assert!(infer(&rules, "parent . enfant").nullable);
}

#[test]
fn test_references_follow_the_rule() {
    let rules = Fixture::new().resolve(json!({
        "taux": "10%",
        "montant": "taux * 100",
        "choix": { "une possibilité": ["'a'", "'b'"] },
    }));
    assert_eq!(infer(&rules, "montant").value_type, Some(ValueType::Number));
    assert_eq!(infer(&rules, "choix").value_type, Some(ValueType::Text));
}

#[test]
fn test_reference_cycles_terminate() {
    let rules = Fixture::new().resolve(json!({
        "a": "b + 1",
        "b": "a + 1",
    }));
    let mut table = TypeTable::new();
    let inferred = table.infer(&rules["a"], &rules);
    assert_eq!(inferred.value_type, Some(ValueType::Number));
    assert!(!table.is_empty());
}

#[test]
fn test_invalidate_forgets_a_subtree() {
    let rules = Fixture::new().resolve(json!({ "a": 1 }));
    let mut table = TypeTable::new();
    table.infer(&rules["a"], &rules);
    assert!(table.get(rules["a"].id).is_some());
    table.invalidate([&rules["a"]]);
    assert!(table.get(rules["a"].id).is_none());
}
