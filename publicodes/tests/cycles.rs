use publicodes::{Engine, EngineError, EngineOptions, MemoryLogger, SituationOptions};
use serde_json::json;
use std::sync::Arc;

fn reset(engine: &mut Engine) {
    engine
        .set_situation(std::iter::empty::<(&str, f64)>(), SituationOptions::default())
        .unwrap();
}

#[test]
fn test_runtime_cycle_is_a_warning() {
    let logger = Arc::new(MemoryLogger::new());
    let mut engine = Engine::with_options(
        json!({ "a": "b + 1", "b": "a" }),
        EngineOptions::new().with_logger(logger.clone()),
    )
    .unwrap();

    let result = engine.evaluate("a").unwrap();
    assert!(result.is_undefined());
    let warnings = logger.warnings();
    assert!(
        warnings.iter().any(|warning| warning.contains("a -> b -> a")),
        "{warnings:?}"
    );
}

#[test]
fn test_runtime_cycle_is_an_error_when_strict() {
    let mut engine = Engine::with_options(
        json!({ "a": "b + 1", "b": "a" }),
        EngineOptions::new().with_strict_cycles(true),
    )
    .unwrap();

    match engine.evaluate("a") {
        Err(EngineError::Cycle { cycle }) => assert_eq!(cycle, vec!["a", "b", "a"]),
        other => panic!("expected a cycle error, got {other:?}"),
    }
}

#[test]
fn test_cycle_evaluation_is_idempotent() {
    let mut engine = Engine::new(json!({ "a": "b + 1", "b": "a" })).unwrap();

    let first = engine.evaluate("a").unwrap();
    reset(&mut engine);
    let second = engine.evaluate("a").unwrap();
    assert_eq!(first.value, second.value);
    assert_eq!(first.missing_variables, second.missing_variables);
}

#[test]
fn test_fixed_point_is_idempotent() {
    let mut engine = Engine::new(json!({
        "brut": 1100,
        "cotisations": "salaire * 10%",
        "salaire": {
            "valeur": "brut - cotisations",
            "résoudre la référence circulaire": "oui",
        },
    }))
    .unwrap();

    let first = engine.evaluate("salaire").unwrap().as_number().unwrap();
    reset(&mut engine);
    let second = engine.evaluate("salaire").unwrap().as_number().unwrap();
    assert!((first - 1000.0).abs() < 1e-4, "got {first}");
    assert!((first - second).abs() < 1e-9, "{first} != {second}");
}

#[test]
fn test_situation_breaks_a_cycle() {
    let mut engine = Engine::new(json!({ "a": "b + 1", "b": "a" })).unwrap();
    engine
        .set_situation([("b", 4.0)], SituationOptions::default())
        .unwrap();

    assert_eq!(engine.evaluate("a").unwrap().as_number(), Some(5.0));
}

#[test]
fn test_find_cycles() {
    let engine = Engine::new(json!({
        "a": "b + 1",
        "b": "a",
        "c": "d",
        "d": 1,
    }))
    .unwrap();

    let cycles = engine.find_cycles();
    assert_eq!(cycles.len(), 1, "{cycles:?}");
    let cycle = &cycles[0];
    assert_eq!(cycle.len(), 3);
    assert_eq!(cycle.first(), cycle.last());
    assert!(cycle.contains(&"a".to_string()) && cycle.contains(&"b".to_string()));
}
