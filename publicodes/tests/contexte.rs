use publicodes::{Engine, EngineOptions, MemoryLogger, SituationOptions};
use serde_json::json;
use std::sync::Arc;

fn engine_with_logger(rules: serde_json::Value) -> (Engine, Arc<MemoryLogger>) {
    let logger = Arc::new(MemoryLogger::new());
    let options = EngineOptions::new().with_logger(logger.clone());
    (Engine::with_options(rules, options).unwrap(), logger)
}

#[test]
fn test_nested_contexte_scopes_each_amendment() {
    let (mut engine, logger) = engine_with_logger(json!({
        "a": 1,
        "b": "a * 2",
        "c": { "valeur": "b", "contexte": { "a": 10 } },
        "d": { "valeur": "c", "contexte": { "a": 100 } },
    }));

    assert_eq!(engine.evaluate("d").unwrap().as_number(), Some(20.0));
    assert_eq!(engine.evaluate("b").unwrap().as_number(), Some(2.0));
    assert!(logger.warnings().is_empty(), "{:?}", logger.warnings());
}

#[test]
fn test_contexte_leaves_the_situation_untouched() {
    let (mut engine, _) = engine_with_logger(json!({
        "revenu": {},
        "impôt": "revenu * 50%",
        "impôt sur un smic": { "valeur": "impôt", "contexte": { "revenu": 1500 } },
    }));
    engine
        .set_situation([("revenu", 3000.0)], SituationOptions::default())
        .unwrap();

    assert_eq!(engine.evaluate("impôt sur un smic").unwrap().as_number(), Some(750.0));
    assert_eq!(engine.evaluate("impôt").unwrap().as_number(), Some(1500.0));
    assert!(engine.situation().contains_key("revenu"));
}

#[test]
fn test_contexte_amendment_can_reference_rules() {
    let (mut engine, _) = engine_with_logger(json!({
        "taux": "25%",
        "base": 200,
        "cotisation": "base * taux",
        "cotisation doublée": {
            "valeur": "cotisation",
            "contexte": { "base": "base * 2" },
        },
    }));

    assert_eq!(engine.evaluate("cotisation doublée").unwrap().as_number(), Some(100.0));
}

#[test]
fn test_contexte_missing_inputs_are_reported() {
    let (mut engine, _) = engine_with_logger(json!({
        "x": {},
        "y": {},
        "z": "x + y",
        "z avec x": { "valeur": "z", "contexte": { "x": 1 } },
    }));

    let result = engine.evaluate("z avec x").unwrap();
    assert!(result.is_undefined());
    assert!(result.missing_variables.contains("y"));
    assert!(!result.missing_variables.contains("x"));
}
