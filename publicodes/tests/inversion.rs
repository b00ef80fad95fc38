use publicodes::{Engine, EngineOptions, SituationOptions};
use serde_json::json;

#[test]
fn test_inversion_reaches_the_goal() {
    let mut engine = Engine::new(json!({
        "net": "brut * 77%",
        "brut": { "inversion": { "unité": "€", "avec": ["net"] } },
    }))
    .unwrap();
    engine
        .set_situation([("net", "2000 €")], SituationOptions::default())
        .unwrap();

    let brut = engine.evaluate("brut").unwrap();
    let value = brut.as_number().unwrap();
    assert!((value - 2000.0 / 0.77).abs() < 1e-4, "got {value}");
    assert_eq!(brut.unit.map(|unit| unit.to_string()).as_deref(), Some("€"));
    assert!(!engine.inversion_failed());
}

#[test]
fn test_inversion_through_a_non_linear_rule() {
    let mut engine = Engine::new(json!({
        "brut": { "inversion numérique": { "avec": ["net"] } },
        "cotisations": {
            "barème": {
                "assiette": "brut",
                "tranches": [
                    { "plafond": 1000, "taux": "10%" },
                    { "taux": "30%" },
                ],
            },
        },
        "net": "brut - cotisations",
    }))
    .unwrap();
    engine
        .set_situation([("net", 1600.0)], SituationOptions::default())
        .unwrap();

    // 2000 - (100 + 300) = 1600
    let brut = engine.evaluate("brut").unwrap().as_number().unwrap();
    assert!((brut - 2000.0).abs() < 1e-3, "got {brut}");
}

#[test]
fn test_inversion_without_goal_reports_candidates() {
    let mut engine = Engine::new(json!({
        "net": "brut * 77%",
        "coût": "brut * 142%",
        "brut": { "inversion": { "avec": ["net", "coût"] } },
    }))
    .unwrap();

    let brut = engine.evaluate("brut").unwrap();
    assert!(brut.is_undefined());
    assert_eq!(brut.missing_variables.get("net"), Some(1));
    assert_eq!(brut.missing_variables.get("coût"), Some(1));
}

#[test]
fn test_inversion_uses_the_first_candidate_set() {
    let mut engine = Engine::new(json!({
        "net": "brut * 50%",
        "coût": "brut * 200%",
        "brut": { "inversion": { "avec": ["net", "coût"] } },
    }))
    .unwrap();
    engine
        .set_situation([("coût", 500.0)], SituationOptions::default())
        .unwrap();

    let brut = engine.evaluate("brut").unwrap().as_number().unwrap();
    assert!((brut - 250.0).abs() < 1e-4, "got {brut}");
    let net = engine.evaluate("net").unwrap().as_number().unwrap();
    assert!((net - 125.0).abs() < 1e-4, "got {net}");
}

#[test]
fn test_inversion_without_solution_fails() {
    let options = EngineOptions::new().with_max_iterations(5);
    let mut engine = Engine::with_options(
        json!({
            "net": "brut * 0 + 10",
            "brut": { "inversion": { "avec": ["net"] } },
        }),
        options,
    )
    .unwrap();
    engine
        .set_situation([("net", 20.0)], SituationOptions::default())
        .unwrap();

    assert!(engine.evaluate("brut").unwrap().is_undefined());
    assert!(engine.inversion_failed());
}

#[test]
fn test_circular_reference_resolution() {
    let mut engine = Engine::new(json!({
        "brut": 1100,
        "cotisations": "salaire * 10%",
        "salaire": {
            "valeur": "brut - cotisations",
            "résoudre la référence circulaire": "oui",
        },
    }))
    .unwrap();

    let salaire = engine.evaluate("salaire").unwrap().as_number().unwrap();
    assert!((salaire - 1000.0).abs() < 1e-4, "got {salaire}");

    engine
        .set_situation([("brut", 2200.0)], SituationOptions::default())
        .unwrap();
    let salaire = engine.evaluate("salaire").unwrap().as_number().unwrap();
    assert!((salaire - 2000.0).abs() < 1e-4, "got {salaire}");
}
