use publicodes::{Engine, SituationOptions};
use serde_json::json;

fn rules() -> serde_json::Value {
    json!({
        "a": 1,
        "b": "a + 1",
        "actif": "oui",
        "c": { "remplace": "a", "valeur": 2 },
        "d": {
            "applicable si": "actif",
            "remplace": { "références à": "a", "priorité": 2 },
            "valeur": 3,
        },
    })
}

#[test]
fn test_highest_priority_replacement_wins() {
    let mut engine = Engine::new(rules()).unwrap();
    assert_eq!(engine.evaluate("b").unwrap().as_number(), Some(4.0));
}

#[test]
fn test_replacement_falls_back_when_not_applicable() {
    let mut engine = Engine::new(rules()).unwrap();
    engine
        .set_situation([("actif", "non")], SituationOptions::default())
        .unwrap();
    assert_eq!(engine.evaluate("b").unwrap().as_number(), Some(3.0));
}

#[test]
fn test_replaced_rule_keeps_its_own_value() {
    let mut engine = Engine::new(rules()).unwrap();
    assert_eq!(engine.evaluate("a").unwrap().as_number(), Some(1.0));

    let mut single = Engine::new(json!({ "a": 1, "c": { "remplace": "a", "valeur": 2 } })).unwrap();
    assert_eq!(single.evaluate("a").unwrap().as_number(), Some(1.0));
    assert_eq!(single.evaluate("c").unwrap().as_number(), Some(2.0));
}

#[test]
fn test_references_in_root_expressions_are_replaced() {
    let mut engine = Engine::new(rules()).unwrap();
    assert_eq!(engine.evaluate("a * 1").unwrap().as_number(), Some(3.0));
}

#[test]
fn test_scoped_replacement() {
    let mut engine = Engine::new(json!({
        "taux": "10%",
        "réduit": {
            "remplace": { "références à": "taux", "dans": "calcul réduit" },
            "valeur": "5%",
        },
        "calcul": "1000 * taux",
        "calcul réduit": "1000 * taux",
    }))
    .unwrap();

    assert_eq!(engine.evaluate("calcul").unwrap().as_number(), Some(100.0));
    assert_eq!(engine.evaluate("calcul réduit").unwrap().as_number(), Some(50.0));
}

#[test]
fn test_rend_non_applicable() {
    let mut engine = Engine::new(json!({
        "exonéré": {},
        "exonération": {
            "applicable si": "exonéré",
            "rend non applicable": "cotisation",
            "valeur": "oui",
        },
        "cotisation": 300,
        "total": "cotisation + 50",
    }))
    .unwrap();

    engine
        .set_situation([("exonéré", "non")], SituationOptions::default())
        .unwrap();
    assert_eq!(engine.evaluate("total").unwrap().as_number(), Some(350.0));

    engine
        .set_situation([("exonéré", "oui")], SituationOptions::default())
        .unwrap();
    assert_eq!(engine.evaluate("total").unwrap().as_number(), Some(50.0));
}
