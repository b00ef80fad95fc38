use publicodes::{Engine, EngineError, LiteralValue, NodeValue, SituationOptions};
use serde_json::json;

fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.unwrap_or_else(|| panic!("expected {expected}, got no number"));
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn test_rule_without_formula_is_its_own_missing_variable() {
    let mut engine = Engine::new(json!({ "a": {} })).unwrap();
    let result = engine.evaluate("a").unwrap();

    assert!(result.is_undefined());
    assert_eq!(result.missing_variables.len(), 1);
    assert_eq!(result.missing_variables.get("a"), Some(1));
}

#[test]
fn test_sibling_missing_variables_do_not_leak() {
    let mut engine = Engine::new(json!({
        "a": { "somme": ["b", "c"] },
        "a . b": {},
        "a . c": {},
    }))
    .unwrap();

    let child = engine.evaluate("a . b").unwrap();
    assert_eq!(child.missing_variables.names().collect::<Vec<_>>(), vec!["a . b"]);

    let parent = engine.evaluate("a").unwrap();
    assert!(parent.is_undefined());
    assert_eq!(
        parent.missing_variables.names().collect::<Vec<_>>(),
        vec!["a . b", "a . c"]
    );
}

#[test]
fn test_missing_variables_disappear_once_set() {
    let mut engine = Engine::new(json!({
        "salaire brut": { "unité": "€/mois" },
        "salaire net": "salaire brut * 77%",
    }))
    .unwrap();

    let net = engine.evaluate("salaire net").unwrap();
    assert!(net.is_undefined());
    assert!(net.missing_variables.contains("salaire brut"));

    engine
        .set_situation([("salaire brut", 3000.0)], SituationOptions::default())
        .unwrap();
    let net = engine.evaluate("salaire net").unwrap();
    assert_close(net.as_number(), 2310.0);
    assert!(net.missing_variables.is_empty());
    assert_eq!(net.unit.map(|unit| unit.to_string()).as_deref(), Some("€/mois"));
}

#[test]
fn test_disabling_parent() {
    let mut engine = Engine::new(json!({
        "statut": { "une possibilité": ["'cadre'", "'employé'"] },
        "cadre": "statut = 'cadre'",
        "cadre . prime": 100,
    }))
    .unwrap();

    // An unknown parent does not disable, its inputs weigh one more
    let prime = engine.evaluate("cadre . prime").unwrap();
    assert_close(prime.as_number(), 100.0);
    assert_eq!(prime.missing_variables.get("statut"), Some(2));

    engine
        .set_situation([("statut", "'employé'")], SituationOptions::default())
        .unwrap();
    let prime = engine.evaluate("cadre . prime").unwrap();
    assert!(prime.is_not_applicable());
    assert!(prime.missing_variables.is_empty());

    engine
        .set_situation([("statut", "cadre")], SituationOptions::default())
        .unwrap();
    let prime = engine.evaluate("cadre . prime").unwrap();
    assert_close(prime.as_number(), 100.0);
}

#[test]
fn test_disabling_parent_does_not_depend_on_evaluation_order() {
    let rules = json!({
        "c": {},
        "a": { "applicable si": "c", "valeur": "a . b + 1" },
        "a . b": 5,
    });
    let expected = Engine::new(rules.clone()).unwrap().evaluate("a . b").unwrap();
    assert_close(expected.as_number(), 5.0);
    assert_eq!(expected.missing_variables.get("c"), Some(2));

    let mut engine = Engine::new(rules).unwrap();
    engine.evaluate("a + a . b").unwrap();
    let child = engine.evaluate("a . b").unwrap();
    assert_eq!(child.value, expected.value);
    assert_eq!(child.missing_variables, expected.missing_variables);
}

#[test]
fn test_bareme_with_abattement() {
    let mut engine = Engine::new(json!({
        "impôt": {
            "barème": {
                "assiette": { "valeur": "48000 €", "abattement": "10%" },
                "tranches": [
                    { "plafond": "9807 €", "taux": "0%" },
                    { "plafond": "27086 €", "taux": "14%" },
                    { "taux": "30%" },
                ],
            },
        },
    }))
    .unwrap();

    let impot = engine.evaluate("impôt").unwrap();
    assert_close(impot.as_number(), 17279.0 * 0.14 + 16114.0 * 0.30);
    assert_eq!(impot.unit.map(|unit| unit.to_string()).as_deref(), Some("€"));
}

#[test]
fn test_bareme_thresholds_must_increase() {
    let mut engine = Engine::new(json!({
        "impôt": {
            "barème": {
                "assiette": 1000,
                "tranches": [
                    { "plafond": 500, "taux": "10%" },
                    { "plafond": 200, "taux": "20%" },
                    { "taux": "30%" },
                ],
            },
        },
    }))
    .unwrap();

    let error = engine.evaluate("impôt").unwrap_err();
    assert!(error.to_string().contains("impôt"), "{error}");
}

#[test]
fn test_grille_and_taux_progressif() {
    let mut engine = Engine::new(json!({
        "assiette": 150,
        "forfait": {
            "grille": {
                "assiette": "assiette",
                "tranches": [
                    { "plafond": 100, "montant": 10 },
                    { "plafond": 200, "montant": 20 },
                    { "montant": 30 },
                ],
            },
        },
        "taux": {
            "taux progressif": {
                "assiette": "assiette",
                "tranches": [
                    { "plafond": 100, "taux": "10%" },
                    { "plafond": 200, "taux": "20%" },
                ],
            },
        },
    }))
    .unwrap();

    assert_close(engine.evaluate("forfait").unwrap().as_number(), 20.0);
    assert_close(engine.evaluate("taux").unwrap().as_number(), 15.0);
}

#[test]
fn test_variations_and_conditions() {
    let mut engine = Engine::new(json!({
        "âge": {},
        "tarif": {
            "variations": [
                { "si": "âge < 18", "alors": 5 },
                { "si": "âge >= 65", "alors": 7 },
                { "sinon": 10 },
            ],
        },
        "majeur": { "condition": { "si": "âge >= 18", "alors": "oui", "sinon": "non" } },
    }))
    .unwrap();

    let tarif = engine.evaluate("tarif").unwrap();
    assert!(tarif.is_undefined());
    assert!(tarif.missing_variables.contains("âge"));

    engine
        .set_situation([("âge", 70.0)], SituationOptions::default())
        .unwrap();
    assert_close(engine.evaluate("tarif").unwrap().as_number(), 7.0);
    assert_eq!(engine.evaluate("majeur").unwrap().as_boolean(), Some(true));

    engine
        .set_situation([("âge", 12.0)], SituationOptions::default())
        .unwrap();
    assert_close(engine.evaluate("tarif").unwrap().as_number(), 5.0);
    assert_eq!(engine.evaluate("majeur").unwrap().as_boolean(), Some(false));
}

#[test]
fn test_applicable_si_guard() {
    let mut engine = Engine::new(json!({
        "éligible": "non",
        "aide": { "applicable si": "éligible", "valeur": 200 },
        "total": "aide + 50",
    }))
    .unwrap();

    assert!(engine.evaluate("aide").unwrap().is_not_applicable());
    assert_close(engine.evaluate("total").unwrap().as_number(), 50.0);

    engine
        .set_situation([("éligible", "oui")], SituationOptions::default())
        .unwrap();
    assert_close(engine.evaluate("total").unwrap().as_number(), 250.0);
}

#[test]
fn test_chained_mechanisms() {
    let mut engine = Engine::new(json!({
        "montant": {
            "valeur": "1234.5678 €",
            "plafond": "1000 €",
            "arrondi": "oui",
        },
        "préavis": { "valeur": "3 mois", "unité": "jour" },
    }))
    .unwrap();

    assert_close(engine.evaluate("montant").unwrap().as_number(), 1000.0);
    let preavis = engine.evaluate("préavis").unwrap();
    assert_close(preavis.as_number().map(f64::round), 91.0);
    assert_eq!(preavis.unit.map(|unit| unit.to_string()).as_deref(), Some("jour"));
}

#[test]
fn test_arrondi_precision_must_be_whole() {
    let mut engine = Engine::new(json!({
        "montant": { "valeur": 1.2345, "arrondi": 2 },
        "montant approché": { "valeur": 1.2345, "arrondi": 1.5 },
    }))
    .unwrap();

    assert_close(engine.evaluate("montant").unwrap().as_number(), 1.23);
    let error = engine.evaluate("montant approché").unwrap_err();
    assert!(matches!(error, EngineError::Evaluation { .. }), "{error}");
    assert!(error.to_string().contains("montant approché"), "{error}");
}

#[test]
fn test_text_and_inline_expressions() {
    let mut engine = Engine::new(json!({
        "nom": "'Dupont'",
        "prix": "12 €",
        "quantité": 3,
    }))
    .unwrap();

    assert_eq!(
        engine.evaluate("nom").unwrap().value,
        NodeValue::Value(LiteralValue::Text("Dupont".to_string()))
    );
    assert_close(engine.evaluate("prix * quantité").unwrap().as_number(), 36.0);
    assert_close(
        engine.evaluate(json!({ "le maximum de": ["prix", "20 €"] })).unwrap().as_number(),
        20.0,
    );
}

#[test]
fn test_traversed_variables() {
    let mut engine = Engine::new(json!({
        "a": 1,
        "b": "a + 1",
        "c": "b * 2",
    }))
    .unwrap();

    let result = engine.evaluate("c").unwrap();
    let traversed = result.traversed_variables.unwrap_or_default();
    for name in ["a", "b", "c"] {
        assert!(traversed.contains(name), "{name} not in {traversed:?}");
    }
}
