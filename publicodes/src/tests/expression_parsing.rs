use crate::error::ExpressionError;
use crate::parser::{parse_expression, ExprAst};
use crate::semantic::{LiteralValue, Operator};

const DEPTH: usize = 100;

fn number(value: f64) -> ExprAst {
    ExprAst::Constant {
        value: LiteralValue::Number(value),
        unit: None,
    }
}

fn variable(name: &str) -> ExprAst {
    ExprAst::Variable(name.to_string())
}

fn binary(operator: Operator, left: ExprAst, right: ExprAst) -> ExprAst {
    ExprAst::Operation {
        operator,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[test]
fn test_reference_with_spaces() {
    let ast = parse_expression("salaire brut * 12", DEPTH).unwrap();
    assert_eq!(
        ast,
        binary(Operator::Multiply, variable("salaire brut"), number(12.0))
    );
}

#[test]
fn test_precedence() {
    let ast = parse_expression("1 + 2 * 3", DEPTH).unwrap();
    assert_eq!(
        ast,
        binary(
            Operator::Add,
            number(1.0),
            binary(Operator::Multiply, number(2.0), number(3.0))
        )
    );

    let ast = parse_expression("(1 + 2) * 3", DEPTH).unwrap();
    assert_eq!(
        ast,
        binary(
            Operator::Multiply,
            binary(Operator::Add, number(1.0), number(2.0)),
            number(3.0)
        )
    );
}

#[test]
fn test_additive_operators_associate_left() {
    let ast = parse_expression("10 - 4 - 3", DEPTH).unwrap();
    assert_eq!(
        ast,
        binary(
            Operator::Subtract,
            binary(Operator::Subtract, number(10.0), number(4.0)),
            number(3.0)
        )
    );
}

#[test]
fn test_power_associates_right() {
    let ast = parse_expression("2 ** 3 ** 2", DEPTH).unwrap();
    assert_eq!(
        ast,
        binary(
            Operator::Power,
            number(2.0),
            binary(Operator::Power, number(3.0), number(2.0))
        )
    );
}

#[test]
fn test_integer_division() {
    let ast = parse_expression("7 // 2", DEPTH).unwrap();
    assert_eq!(ast, binary(Operator::IntegerDivide, number(7.0), number(2.0)));
}

#[test]
fn test_comparison_with_unit() {
    let ast = parse_expression("contrat . salaire >= 1500 €/mois", DEPTH).unwrap();
    assert_eq!(
        ast,
        binary(
            Operator::GreaterThanOrEqual,
            variable("contrat . salaire"),
            ExprAst::Constant {
                value: LiteralValue::Number(1500.0),
                unit: Some("€/mois".to_string()),
            }
        )
    );
}

#[test]
fn test_percentage_literal() {
    let ast = parse_expression("77%", DEPTH).unwrap();
    assert_eq!(
        ast,
        ExprAst::Constant {
            value: LiteralValue::Number(77.0),
            unit: Some("%".to_string()),
        }
    );
}

#[test]
fn test_literals() {
    assert!(matches!(
        parse_expression("01/03/2024", DEPTH).unwrap(),
        ExprAst::Constant {
            value: LiteralValue::Date(_),
            ..
        }
    ));
    assert_eq!(
        parse_expression("oui", DEPTH).unwrap(),
        ExprAst::Constant {
            value: LiteralValue::Boolean(true),
            unit: None,
        }
    );
    assert_eq!(
        parse_expression("'CDI'", DEPTH).unwrap(),
        ExprAst::Constant {
            value: LiteralValue::Text("CDI".to_string()),
            unit: None,
        }
    );
}

#[test]
fn test_boolean_prefix_is_a_name() {
    // "non cadre" is a rule name, not the boolean followed by garbage
    assert_eq!(
        parse_expression("non cadre", DEPTH).unwrap(),
        variable("non cadre")
    );
}

#[test]
fn test_parent_escape() {
    let ast = parse_expression("^ . taux", DEPTH).unwrap();
    assert_eq!(ast, variable("^ . taux"));
}

#[test]
fn test_negation() {
    assert_eq!(
        parse_expression("-x", DEPTH).unwrap(),
        ExprAst::Negation(Box::new(variable("x")))
    );
}

#[test]
fn test_operator_without_spaces_is_diagnosed() {
    for source in ["2+3", "a *b", "a* b"] {
        let error = parse_expression(source, DEPTH).unwrap_err();
        assert!(
            matches!(error, ExpressionError::OperatorSpacing { .. }),
            "{}: {:?}",
            source,
            error
        );
    }

    let error = parse_expression("2+3", DEPTH).unwrap_err();
    let diagnostic = error.diagnostic().unwrap();
    assert_eq!(diagnostic.span.start, 1);
    assert_eq!(diagnostic.found.as_deref(), Some("+3"));
}

#[test]
fn test_invalid_expression_reports_position() {
    let error = parse_expression("(1 + 2", DEPTH).unwrap_err();
    assert!(matches!(error, ExpressionError::Invalid { .. }), "{:?}", error);
    let diagnostic = error.diagnostic().unwrap();
    assert_eq!(diagnostic.span.start, 6);
    assert_eq!(diagnostic.found, None);
}

#[test]
fn test_nesting_limit() {
    let error = parse_expression("((((1))))", 3).unwrap_err();
    assert!(matches!(error, ExpressionError::TooDeep { limit: 3, .. }));
    assert!(parse_expression("((((1))))", 10).is_ok());
}
