use super::Fixture;
use crate::evaluated::{EvaluatedNode, NodeValue};
use crate::evaluator::mechanisms::round;
use crate::evaluator::operations::{multiply, normalize, short_circuit};
use crate::semantic::{LiteralValue, Node, Operator};
use crate::units::{Unit, UnitTable};
use crate::{Engine, SituationOptions};
use serde_json::json;

fn evaluated(fixture: &Fixture, value: NodeValue, unit: Option<Unit>) -> EvaluatedNode {
    EvaluatedNode::new(Node::undefined(&fixture.ids), value).with_unit(unit)
}

#[test]
fn test_short_circuits() {
    let fixture = Fixture::new();
    let no = evaluated(&fixture, NodeValue::boolean(false), None);
    let yes = evaluated(&fixture, NodeValue::boolean(true), None);
    let zero = evaluated(&fixture, NodeValue::number(0.0), Some(Unit::symbol("€")));
    let na = evaluated(&fixture, NodeValue::NotApplicable, None);
    let undefined = evaluated(&fixture, NodeValue::Undefined, None);

    assert_eq!(short_circuit(Operator::And, &no), Some((NodeValue::boolean(false), None)));
    assert_eq!(short_circuit(Operator::And, &na), Some((NodeValue::boolean(false), None)));
    assert_eq!(short_circuit(Operator::Or, &yes), Some((NodeValue::boolean(true), None)));
    assert_eq!(short_circuit(Operator::Or, &no), None);
    assert_eq!(
        short_circuit(Operator::Multiply, &zero),
        Some((NodeValue::number(0.0), Some(Unit::symbol("€"))))
    );
    for operator in [Operator::Multiply, Operator::Divide, Operator::LessThan] {
        assert_eq!(
            short_circuit(operator, &na),
            Some((NodeValue::NotApplicable, None))
        );
    }
    // Undefined never decides on its own, and neither does not-applicable on + or =
    assert_eq!(short_circuit(Operator::And, &undefined), None);
    assert_eq!(short_circuit(Operator::Add, &na), None);
    assert_eq!(short_circuit(Operator::Equal, &na), None);
}

#[test]
fn test_round_half_away_from_zero() {
    assert_eq!(round(2.5, 0), 3.0);
    assert_eq!(round(-2.5, 0), -3.0);
    assert_eq!(round(1234.5678, 2), 1234.57);
    assert_eq!(round(7.0, 3), 7.0);
}

#[test]
fn test_normalize() {
    let table = UnitTable::default();
    let (value, unit) = normalize(3000.0, Some(Unit::new(vec!["€".into(), "%".into()], vec![])), &table);
    assert_eq!(value, 30.0);
    assert_eq!(unit, Some(Unit::symbol("€")));

    let (value, unit) = normalize(5.0, Some(Unit::new(vec!["€".into()], vec!["€".into()])), &table);
    assert_eq!(value, 5.0);
    assert_eq!(unit, None);

    assert_eq!(normalize(2.0, None, &table), (2.0, None));
}

#[test]
fn test_node_value_accessors() {
    let value = NodeValue::Value(LiteralValue::Number(4.0));
    assert_eq!(value.as_number(), Some(4.0));
    assert_eq!(value.as_boolean(), None);
    assert!(NodeValue::NotApplicable.is_not_applicable());
    assert!(NodeValue::Undefined.is_undefined());
}

#[test]
fn test_multiply_by_percentage() {
    let table = UnitTable::default();
    let percent = Unit::percent();
    let monthly = Unit::parse("€/mois", None).unwrap();

    assert_eq!(multiply(1500.0, None, 50.0, Some(&percent), &table), (750.0, None));
    assert_eq!(multiply(50.0, Some(&percent), 1500.0, None, &table), (750.0, None));
    assert_eq!(
        multiply(3000.0, Some(&monthly), 77.0, Some(&percent), &table),
        (2310.0, Some(monthly.clone()))
    );
    assert_eq!(
        multiply(50.0, Some(&percent), 50.0, Some(&percent), &table),
        (25.0, Some(percent.clone()))
    );
    assert_eq!(
        multiply(2.0, Some(&monthly), 3.0, None, &table),
        (6.0, Some(monthly))
    );
}

#[test]
fn test_percentage_products_in_rules() {
    let mut engine = Engine::new(json!({
        "x": "1500 * 50%",
        "y": "200 * 25%",
        "brut": { "unité": "€/mois" },
        "double": "brut * 200%",
    }))
    .unwrap();

    let x = engine.evaluate("x").unwrap();
    assert_eq!(x.as_number(), Some(750.0));
    assert_eq!(x.unit, None);
    assert_eq!(engine.evaluate("y").unwrap().as_number(), Some(50.0));

    engine
        .set_situation([("brut", 1200.0)], SituationOptions::default())
        .unwrap();
    let double = engine.evaluate("double").unwrap();
    assert_eq!(double.as_number(), Some(2400.0));
    assert_eq!(double.unit.map(|unit| unit.to_string()).as_deref(), Some("€/mois"));
}
