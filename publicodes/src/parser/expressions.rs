use crate::ast::Span;
use crate::error::{EngineError, ExpressionDiagnostic, ExpressionError};
use crate::evaluated::NodeValue;
use crate::parser::literals::parse_date;
use crate::parser::{ExpressionParser, ParseContext, Rule};
use crate::semantic::{normalize_name, LiteralValue, Node, NodeRef, Operator};
use crate::units::Unit;
use pest::error::{ErrorVariant, InputLocation};
use pest::iterators::Pair;
use pest::Parser;

/// Minimal expression tree produced by the grammar, before lowering
#[derive(Debug, Clone, PartialEq)]
pub enum ExprAst {
    Operation {
        operator: Operator,
        left: Box<ExprAst>,
        right: Box<ExprAst>,
    },
    /// A rule name as written, `^` segments included
    Variable(String),
    Constant {
        value: LiteralValue,
        unit: Option<String>,
    },
    Negation(Box<ExprAst>),
}

impl ExprAst {
    fn binary(operator: Operator, left: ExprAst, right: ExprAst) -> Self {
        ExprAst::Operation {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

const OPERATOR_CHARS: &[char] = &['+', '-', '*', '/', '<', '>', '=', '!'];

/// Parse an inline expression into its minimal tree
pub fn parse_expression(source: &str, max_depth: usize) -> Result<ExprAst, ExpressionError> {
    // Checked up front so pathological nesting never reaches the recursive grammar
    if parenthesis_depth(source) > max_depth {
        return Err(ExpressionError::TooDeep {
            expression: source.to_string(),
            limit: max_depth,
        });
    }

    let mut pairs = ExpressionParser::parse(Rule::expression, source)
        .map_err(|error| diagnose(source, error))?;
    let expression = pairs
        .next()
        .ok_or_else(|| invalid(source, Span::new(0, source.len()), "expression"))?;
    let comparison = expression
        .into_inner()
        .find(|pair| pair.as_rule() == Rule::comparison)
        .ok_or_else(|| invalid(source, Span::new(0, source.len()), "expression"))?;

    let mut builder = Builder {
        source,
        max_depth,
        depth: 0,
    };
    builder.comparison(comparison)
}

/// Parse an inline expression and lower it into a node of the current rule
pub fn parse_inline(source: &str, context: &ParseContext) -> Result<NodeRef, EngineError> {
    let ast = parse_expression(source, context.limits.max_expression_depth)
        .map_err(|error| EngineError::expression(context.dotted_name, error))?;
    lower(&ast, context)
}

/// Lower a minimal expression tree into nodes
pub fn lower(ast: &ExprAst, context: &ParseContext) -> Result<NodeRef, EngineError> {
    let ids = context.ids;
    match ast {
        ExprAst::Variable(name) => Ok(Node::reference(
            &normalize_name(name),
            context.dotted_name,
            ids,
        )),
        ExprAst::Constant { value, unit } => {
            let unit = parse_unit(unit.as_deref(), context)?;
            Ok(Node::constant(NodeValue::Value(value.clone()), unit, ids))
        }
        ExprAst::Negation(inner) => match inner.as_ref() {
            ExprAst::Constant {
                value: LiteralValue::Number(number),
                unit,
            } => {
                let unit = parse_unit(unit.as_deref(), context)?;
                Ok(Node::number(-number, unit, ids))
            }
            other => {
                let operand = lower(other, context)?;
                Ok(Node::operation(
                    Operator::Multiply,
                    Node::number(-1.0, None, ids),
                    operand,
                    ids,
                ))
            }
        },
        ExprAst::Operation {
            operator,
            left,
            right,
        } => {
            let left = lower(left, context)?;
            let right = lower(right, context)?;
            Ok(Node::operation(*operator, left, right, ids))
        }
    }
}

fn parse_unit(text: Option<&str>, context: &ParseContext) -> Result<Option<Unit>, EngineError> {
    match text {
        None => Ok(None),
        Some(text) => Unit::parse(text, context.unit_normalizer)
            .map(Unit::non_empty)
            .map_err(|error| EngineError::syntax(context.dotted_name, error.to_string())),
    }
}

struct Builder<'s> {
    source: &'s str,
    max_depth: usize,
    depth: usize,
}

impl<'s> Builder<'s> {
    fn enter(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ExpressionError::TooDeep {
                expression: self.source.to_string(),
                limit: self.max_depth,
            });
        }
        Ok(())
    }

    fn comparison(&mut self, pair: Pair<'s, Rule>) -> Result<ExprAst, ExpressionError> {
        self.enter()?;
        let span = Span::from_pest_span(pair.as_span());
        let mut inner = pair.into_inner();
        let first = inner
            .next()
            .ok_or_else(|| invalid(self.source, span, "operand"))?;
        let mut result = self.additive(first)?;
        if let (Some(operator), Some(right)) = (inner.next(), inner.next()) {
            let operator = self.operator(&operator)?;
            result = ExprAst::binary(operator, result, self.additive(right)?);
        }
        self.depth -= 1;
        Ok(result)
    }

    fn additive(&mut self, pair: Pair<'s, Rule>) -> Result<ExprAst, ExpressionError> {
        self.left_fold(pair, Self::multiplicative)
    }

    fn multiplicative(&mut self, pair: Pair<'s, Rule>) -> Result<ExprAst, ExpressionError> {
        self.left_fold(pair, Self::exponentiation)
    }

    /// `operand (operator operand)*`, associating to the left
    fn left_fold(
        &mut self,
        pair: Pair<'s, Rule>,
        operand: fn(&mut Self, Pair<'s, Rule>) -> Result<ExprAst, ExpressionError>,
    ) -> Result<ExprAst, ExpressionError> {
        let span = Span::from_pest_span(pair.as_span());
        let mut inner = pair.into_inner();
        let first = inner
            .next()
            .ok_or_else(|| invalid(self.source, span, "operand"))?;
        let mut result = operand(self, first)?;
        while let Some(operator) = inner.next() {
            let operator = self.operator(&operator)?;
            let right = inner
                .next()
                .ok_or_else(|| invalid(self.source, span, "operand"))?;
            result = ExprAst::binary(operator, result, operand(self, right)?);
        }
        Ok(result)
    }

    fn exponentiation(&mut self, pair: Pair<'s, Rule>) -> Result<ExprAst, ExpressionError> {
        let span = Span::from_pest_span(pair.as_span());
        let mut inner = pair.into_inner();
        let base = inner
            .next()
            .ok_or_else(|| invalid(self.source, span, "operand"))?;
        let base = self.unary(base)?;
        match (inner.next(), inner.next()) {
            (Some(_), Some(exponent)) => {
                self.enter()?;
                let exponent = self.exponentiation(exponent)?;
                self.depth -= 1;
                Ok(ExprAst::binary(Operator::Power, base, exponent))
            }
            _ => Ok(base),
        }
    }

    fn unary(&mut self, pair: Pair<'s, Rule>) -> Result<ExprAst, ExpressionError> {
        let span = Span::from_pest_span(pair.as_span());
        let inner = pair
            .into_inner()
            .next()
            .ok_or_else(|| invalid(self.source, span, "operand"))?;
        match inner.as_rule() {
            Rule::negation => {
                let primary = inner
                    .into_inner()
                    .next()
                    .ok_or_else(|| invalid(self.source, span, "operand"))?;
                Ok(ExprAst::Negation(Box::new(self.primary(primary)?)))
            }
            _ => self.primary(inner),
        }
    }

    fn primary(&mut self, pair: Pair<'s, Rule>) -> Result<ExprAst, ExpressionError> {
        let span = Span::from_pest_span(pair.as_span());
        let inner = pair
            .into_inner()
            .next()
            .ok_or_else(|| invalid(self.source, span, "operand"))?;
        let span = Span::from_pest_span(inner.as_span());
        match inner.as_rule() {
            Rule::group => {
                let comparison = inner
                    .into_inner()
                    .next()
                    .ok_or_else(|| invalid(self.source, span, "expression"))?;
                self.comparison(comparison)
            }
            Rule::date => {
                let date = parse_date(inner.as_str())
                    .ok_or_else(|| invalid(self.source, span, "valid date"))?;
                Ok(ExprAst::Constant {
                    value: LiteralValue::Date(date),
                    unit: None,
                })
            }
            Rule::quantity => {
                let mut number = None;
                let mut unit = None;
                for part in inner.into_inner() {
                    match part.as_rule() {
                        Rule::number => number = part.as_str().parse::<f64>().ok(),
                        Rule::unit => unit = Some(part.as_str().to_string()),
                        _ => {}
                    }
                }
                let number = number.ok_or_else(|| invalid(self.source, span, "number"))?;
                Ok(ExprAst::Constant {
                    value: LiteralValue::Number(number),
                    unit,
                })
            }
            Rule::boolean => Ok(ExprAst::Constant {
                value: LiteralValue::Boolean(inner.as_str() == "oui"),
                unit: None,
            }),
            Rule::string => {
                let text = inner
                    .into_inner()
                    .next()
                    .map(|content| content.as_str().to_string())
                    .unwrap_or_default();
                Ok(ExprAst::Constant {
                    value: LiteralValue::Text(text),
                    unit: None,
                })
            }
            Rule::reference => Ok(ExprAst::Variable(inner.as_str().to_string())),
            _ => Err(invalid(self.source, span, "operand")),
        }
    }

    fn operator(&self, pair: &Pair<'s, Rule>) -> Result<Operator, ExpressionError> {
        Operator::from_symbol(pair.as_str()).ok_or_else(|| {
            invalid(
                self.source,
                Span::from_pest_span(pair.as_span()),
                "operator",
            )
        })
    }
}

fn invalid(source: &str, span: Span, expected: &str) -> ExpressionError {
    let found = span.excerpt(source);
    ExpressionError::Invalid {
        expression: source.to_string(),
        diagnostic: ExpressionDiagnostic {
            span,
            expected: vec![expected.to_string()],
            found: (!found.is_empty()).then(|| found.to_string()),
        },
    }
}

/// Turn a pest failure into a diagnostic pointing at the offending token
fn diagnose(source: &str, error: pest::error::Error<Rule>) -> ExpressionError {
    let position = match error.location {
        InputLocation::Pos(position) => position,
        InputLocation::Span((start, _)) => start,
    };
    let position = position.min(source.len());

    let mut expected: Vec<String> = match &error.variant {
        ErrorVariant::ParsingError { positives, .. } => {
            positives.iter().map(|rule| describe(*rule).to_string()).collect()
        }
        ErrorVariant::CustomError { message } => vec![message.clone()],
    };
    expected.sort();
    expected.dedup();

    let found = source
        .get(position..)
        .and_then(|rest| rest.split_whitespace().next())
        .map(str::to_string);
    let end = position + found.as_ref().map_or(0, String::len);
    let diagnostic = ExpressionDiagnostic {
        span: Span::new(position, end),
        expected,
        found,
    };

    if misplaced_operator(source, position) {
        ExpressionError::OperatorSpacing {
            expression: source.to_string(),
            diagnostic,
        }
    } else {
        ExpressionError::Invalid {
            expression: source.to_string(),
            diagnostic,
        }
    }
}

/// Whether the parse failed on an operator glued to one of its operands
fn misplaced_operator(source: &str, position: usize) -> bool {
    let (Some(head), Some(tail)) = (source.get(..position), source.get(position..)) else {
        return false;
    };
    let before = head.chars().next_back();
    let mut after = tail.chars();
    let current = after.next();
    let next = after.next();

    let is_operator = |c: char| OPERATOR_CHARS.contains(&c);
    match current {
        Some(c) if is_operator(c) => {
            before.is_some_and(|b| !b.is_whitespace() && !is_operator(b))
                || next.is_some_and(|n| !n.is_whitespace() && !is_operator(n))
        }
        Some(c) if !c.is_whitespace() => before.is_some_and(is_operator),
        _ => false,
    }
}

fn describe(rule: Rule) -> &'static str {
    match rule {
        Rule::comparison_operator
        | Rule::additive_operator
        | Rule::multiplicative_operator
        | Rule::exponentiation_operator => "operator",
        Rule::comparison
        | Rule::additive
        | Rule::multiplicative
        | Rule::exponentiation
        | Rule::unary
        | Rule::negation
        | Rule::primary
        | Rule::group => "expression",
        Rule::quantity | Rule::number => "number",
        Rule::unit => "unit",
        Rule::date => "date",
        Rule::boolean => "boolean",
        Rule::string | Rule::single_quoted | Rule::double_quoted => "text",
        Rule::reference | Rule::segment => "rule name",
        Rule::EOI => "end of input",
        _ => "token",
    }
}

/// Deepest parenthesis nesting
fn parenthesis_depth(source: &str) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0usize;
    for c in source.chars() {
        match c {
            '(' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}
