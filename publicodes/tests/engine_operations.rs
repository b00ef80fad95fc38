use publicodes::{Engine, EngineError, SituationOptions, ValueType};
use serde_json::json;

#[test]
fn test_add_rules_incrementally() {
    let mut engine = Engine::new(json!({ "a": 1, "b": "a * 2" })).unwrap();
    assert_eq!(engine.evaluate("b").unwrap().as_number(), Some(2.0));

    engine.add_rules(json!({ "c": "b + 1" })).unwrap();
    assert_eq!(engine.evaluate("c").unwrap().as_number(), Some(3.0));
    assert_eq!(engine.rules_that_use("b"), vec!["c".to_string()]);
}

#[test]
fn test_added_rule_shadows_an_outer_one() {
    let mut engine = Engine::new(json!({
        "a": 1,
        "x": {},
        "x . y": "a + 1",
    }))
    .unwrap();
    assert_eq!(engine.evaluate("x . y").unwrap().as_number(), Some(2.0));

    engine.add_rules(json!({ "x . a": 10 })).unwrap();
    assert_eq!(engine.evaluate("x . y").unwrap().as_number(), Some(11.0));
    assert_eq!(engine.references_in("x . y"), vec!["x . a".to_string()]);
}

#[test]
fn test_added_replacement_applies_to_existing_rules() {
    let mut engine = Engine::new(json!({ "a": 1, "b": "a + 1" })).unwrap();
    engine
        .add_rules(json!({ "c": { "remplace": "a", "valeur": 5 } }))
        .unwrap();

    assert_eq!(engine.evaluate("b").unwrap().as_number(), Some(6.0));
}

#[test]
fn test_failed_add_rules_changes_nothing() {
    let mut engine = Engine::new(json!({ "a": 1, "b": "a + 1" })).unwrap();

    let error = engine
        .add_rules(json!({ "a": 2, "z": "inconnue + 1" }))
        .unwrap_err();
    assert_eq!(error.rule(), Some("a"));
    assert!(engine.get_rule("z").is_err());
    assert_eq!(engine.evaluate("b").unwrap().as_number(), Some(2.0));

    let error = engine.add_rules(json!({ "z": "inconnue + 1" })).unwrap_err();
    assert!(matches!(error, EngineError::Syntax { ref rule, .. } if rule == "z"), "{error}");
    assert!(engine.get_rule("z").is_err());
}

#[test]
fn test_add_rules_keeps_the_situation() {
    let mut engine = Engine::new(json!({ "a": {}, "b": "a * 2" })).unwrap();
    engine
        .set_situation([("a", 4.0)], SituationOptions::default())
        .unwrap();

    engine.add_rules(json!({ "c": "b + a" })).unwrap();
    assert_eq!(engine.evaluate("c").unwrap().as_number(), Some(12.0));
}

#[test]
fn test_expression_errors_name_the_rule() {
    let Err(error) = Engine::new(json!({ "total": "2 +* 3" })) else {
        panic!("a malformed expression must be rejected");
    };
    assert_eq!(error.rule(), Some("total"));
    assert!(error.to_string().contains("total"), "{error}");

    let Err(error) = Engine::new(json!({ "total": { "somme": ["1"], "produit": ["2"] } })) else {
        panic!("two mechanisms in one object must be rejected");
    };
    assert!(error.to_string().contains("only one mechanism"), "{error}");
}

#[test]
fn test_evaluation_errors_name_the_rule() {
    let mut engine = Engine::new(json!({
        "drapeau": 3,
        "résultat": { "condition": { "si": "drapeau", "alors": 1, "sinon": 2 } },
    }))
    .unwrap();

    let error = engine.evaluate("résultat").unwrap_err();
    assert!(matches!(error, EngineError::Evaluation { .. }), "{error}");
    assert!(error.to_string().contains("résultat"), "{error}");
}

#[test]
fn test_introspection() {
    let engine = Engine::new(json!({
        "prix": "12 €",
        "remise": { "applicable si": "fidèle", "valeur": "10%" },
        "fidèle": "oui",
        "total": "prix - prix * remise",
    }))
    .unwrap();

    let rule = engine.get_rule("total").unwrap();
    assert_eq!(rule.dotted_name, "total");
    assert!(engine.rules().contains_key("remise"));

    let prix = engine.inferred_type("prix").unwrap();
    assert_eq!(prix.value_type, Some(ValueType::Number));
    assert!(engine.inferred_type("remise").unwrap().nullable);
    assert_eq!(
        engine.inferred_type("fidèle").unwrap().value_type,
        Some(ValueType::Boolean)
    );

    assert_eq!(engine.references_in("total"), vec!["prix", "remise"]);
    assert_eq!(engine.rules_that_use("fidèle"), vec!["remise"]);
    assert!(engine.find_cycles().is_empty());
}

#[test]
fn test_evaluate_accepts_mechanism_objects() {
    let mut engine = Engine::new(json!({ "a": 2, "b": 3 })).unwrap();

    let sum = engine.evaluate(json!({ "somme": ["a", "b", 5] })).unwrap();
    assert_eq!(sum.as_number(), Some(10.0));

    let product = engine.evaluate(json!({ "produit": ["a", "b"] })).unwrap();
    assert_eq!(product.as_number(), Some(6.0));
}

#[test]
fn test_evaluated_node_serializes() {
    let mut engine = Engine::new(json!({ "a": {}, "b": "a + 1" })).unwrap();
    let result = engine.evaluate("b").unwrap();

    let serialized = serde_json::to_value(&result).unwrap();
    assert_eq!(serialized["nodeValue"], json!(null));
    assert_eq!(serialized["missingVariables"], json!({ "a": 1 }));
}
