//! Operators with three-valued semantics and unit propagation
//!
//! Not-applicable operands follow fixed rules per operator:
//!
//! ```text
//! *  /  //  **  <  <=  >  >=    not applicable if either side is
//! +  -                          a not-applicable side counts as 0
//! et  ou                        a not-applicable side counts as false
//! =  !=                         not applicable is compared as a value
//! min  max                      not-applicable sides are ignored
//! ```
//!
//! Undefined operands make the result undefined, except where the left
//! operand alone decides it (`non et x`, `oui ou x`, `0 * x`).

use super::merge_missing;
use crate::engine::Engine;
use crate::evaluated::{EvaluatedNode, NodeValue};
use crate::semantic::{LiteralValue, NodeRef, Operation, Operator};
use crate::units::{convert, fold_percentages, serialize_unit, simplify_with_value, Unit, UnitTable};
use crate::EngineResult;
use std::cmp::Ordering;

/// Result of an operation: value and unit
type Outcome = (NodeValue, Option<Unit>);

/// Result decided by the left operand alone, if any
///
/// # Examples
/// ```text
/// non et x   = non
/// oui ou x   = oui
/// 0 * x      = 0
/// <na> / x   = <na>
/// ```
pub fn short_circuit(operator: Operator, left: &EvaluatedNode) -> Option<Outcome> {
    match (operator, &left.value) {
        (Operator::And, NodeValue::Value(LiteralValue::Boolean(false)) | NodeValue::NotApplicable) => {
            Some((NodeValue::boolean(false), None))
        }
        (Operator::Or, NodeValue::Value(LiteralValue::Boolean(true))) => {
            Some((NodeValue::boolean(true), None))
        }
        (Operator::Multiply, NodeValue::Value(LiteralValue::Number(n))) if *n == 0.0 => {
            Some((NodeValue::number(0.0), left.unit.clone()))
        }
        (
            Operator::Multiply
            | Operator::Divide
            | Operator::IntegerDivide
            | Operator::Power
            | Operator::LessThan
            | Operator::LessThanOrEqual
            | Operator::GreaterThan
            | Operator::GreaterThanOrEqual,
            NodeValue::NotApplicable,
        ) => Some((NodeValue::NotApplicable, None)),
        _ => None,
    }
}

impl Engine {
    pub(super) fn evaluate_operation(
        &mut self,
        node: &NodeRef,
        operation: &Operation,
    ) -> EngineResult<EvaluatedNode> {
        let left = self.evaluate_node(&operation.left)?;
        if let Some((value, unit)) = short_circuit(operation.operator, &left) {
            return Ok(EvaluatedNode::new(node.clone(), value)
                .with_unit(unit)
                .with_missing(left.missing_variables.clone()));
        }
        let right = self.evaluate_node(&operation.right)?;
        let (value, unit) = self.combine(operation.operator, &left, &right)?;
        Ok(EvaluatedNode::new(node.clone(), value)
            .with_unit(unit)
            .with_missing(merge_missing([&left, &right])))
    }

    fn combine(
        &self,
        operator: Operator,
        left: &EvaluatedNode,
        right: &EvaluatedNode,
    ) -> EngineResult<Outcome> {
        match operator {
            Operator::And | Operator::Or => self.logical(operator, left, right),
            Operator::Equal | Operator::NotEqual => {
                if left.is_undefined() || right.is_undefined() {
                    return Ok((NodeValue::Undefined, None));
                }
                let equal = self.equal(left, right);
                Ok((NodeValue::boolean(equal == (operator == Operator::Equal)), None))
            }
            Operator::LessThan
            | Operator::LessThanOrEqual
            | Operator::GreaterThan
            | Operator::GreaterThanOrEqual => {
                if right.is_not_applicable() {
                    return Ok((NodeValue::NotApplicable, None));
                }
                if left.is_undefined() || right.is_undefined() {
                    return Ok((NodeValue::Undefined, None));
                }
                let ordering = self.compare(operator, left, right)?;
                let result = match operator {
                    Operator::LessThan => ordering == Ordering::Less,
                    Operator::LessThanOrEqual => ordering != Ordering::Greater,
                    Operator::GreaterThan => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                };
                Ok((NodeValue::boolean(result), None))
            }
            Operator::Add | Operator::Subtract => self.additive(operator, left, right),
            Operator::Min | Operator::Max => self.extremum(operator, left, right),
            Operator::Multiply | Operator::Divide | Operator::IntegerDivide | Operator::Power => {
                if right.is_not_applicable() {
                    return Ok((NodeValue::NotApplicable, None));
                }
                if operator == Operator::Multiply && right.as_number() == Some(0.0) {
                    return Ok((NodeValue::number(0.0), right.unit.clone()));
                }
                if left.is_undefined() || right.is_undefined() {
                    return Ok((NodeValue::Undefined, None));
                }
                self.multiplicative(operator, left, right)
            }
        }
    }

    fn logical(
        &self,
        operator: Operator,
        left: &EvaluatedNode,
        right: &EvaluatedNode,
    ) -> EngineResult<Outcome> {
        let left = self.condition_value(left)?;
        let right = self.condition_value(right)?;
        let value = match (operator, left, right) {
            (Operator::And, _, Some(false)) => NodeValue::boolean(false),
            (Operator::Or, _, Some(true)) => NodeValue::boolean(true),
            (_, None, _) | (_, _, None) => NodeValue::Undefined,
            (Operator::And, Some(l), Some(r)) => NodeValue::boolean(l && r),
            (_, Some(l), Some(r)) => NodeValue::boolean(l || r),
        };
        Ok((value, None))
    }

    /// Structural equality, numbers compared in the left operand's unit
    fn equal(&self, left: &EvaluatedNode, right: &EvaluatedNode) -> bool {
        match (&left.value, &right.value) {
            (
                NodeValue::Value(LiteralValue::Number(l)),
                NodeValue::Value(LiteralValue::Number(r)),
            ) => *l == self.align(*r, right.unit.as_ref(), left.unit.as_ref(), "compare"),
            (l, r) => l == r,
        }
    }

    fn compare(
        &self,
        operator: Operator,
        left: &EvaluatedNode,
        right: &EvaluatedNode,
    ) -> EngineResult<Ordering> {
        match (&left.value, &right.value) {
            (
                NodeValue::Value(LiteralValue::Number(l)),
                NodeValue::Value(LiteralValue::Number(r)),
            ) => {
                let r = self.align(*r, right.unit.as_ref(), left.unit.as_ref(), "compare");
                Ok(l.partial_cmp(&r).unwrap_or(Ordering::Equal))
            }
            (NodeValue::Value(LiteralValue::Date(l)), NodeValue::Value(LiteralValue::Date(r))) => {
                Ok(l.cmp(r))
            }
            (l, r) => Err(self.evaluation_error(format!(
                "cannot apply \"{}\" to {} and {}",
                operator.symbol(),
                describe(l),
                describe(r)
            ))),
        }
    }

    fn additive(
        &self,
        operator: Operator,
        left: &EvaluatedNode,
        right: &EvaluatedNode,
    ) -> EngineResult<Outcome> {
        let sign = if operator == Operator::Add { 1.0 } else { -1.0 };
        match (&left.value, &right.value) {
            (NodeValue::NotApplicable, NodeValue::NotApplicable) => Ok((NodeValue::NotApplicable, None)),
            (NodeValue::Undefined, _) | (_, NodeValue::Undefined) => Ok((NodeValue::Undefined, None)),
            (NodeValue::NotApplicable, _) => {
                let r = self.operand(operator, right)?;
                Ok((NodeValue::number(sign * r), right.unit.clone()))
            }
            (_, NodeValue::NotApplicable) => {
                let l = self.operand(operator, left)?;
                Ok((NodeValue::number(l), left.unit.clone()))
            }
            _ => {
                let l = self.operand(operator, left)?;
                let r = self.operand(operator, right)?;
                let (value, unit) = self.add_numbers(
                    sign,
                    (l, left.unit.as_ref()),
                    (r, right.unit.as_ref()),
                );
                Ok((NodeValue::number(value), unit))
            }
        }
    }

    /// `l ± r` with the left unit winning
    ///
    /// # Examples
    /// ```text
    /// 10 € + 5 €        = 15 €
    /// 1 k€ + 500 €      = 1.5 k€
    /// 100 € + 20 %      = 120 €
    /// 100 € - 20 %      = 80 €
    /// 10 € + 3 kg       = 13 €    (warning)
    /// ```
    fn add_numbers(
        &self,
        sign: f64,
        (l, left_unit): (f64, Option<&Unit>),
        (r, right_unit): (f64, Option<&Unit>),
    ) -> (f64, Option<Unit>) {
        let left_is_percentage = left_unit.is_some_and(Unit::is_percentage);
        if right_unit.is_some_and(Unit::is_percentage) && !left_is_percentage {
            return (l * (1.0 + sign * r / 100.0), left_unit.cloned());
        }
        match (left_unit, right_unit) {
            (Some(_), Some(_)) => {
                let r = self.align(r, right_unit, left_unit, "add");
                (l + sign * r, left_unit.cloned())
            }
            (None, Some(unit)) => (l + sign * r, Some(unit.clone())),
            (unit, None) => (l + sign * r, unit.cloned()),
        }
    }

    fn extremum(
        &self,
        operator: Operator,
        left: &EvaluatedNode,
        right: &EvaluatedNode,
    ) -> EngineResult<Outcome> {
        match (&left.value, &right.value) {
            (NodeValue::NotApplicable, NodeValue::NotApplicable) => Ok((NodeValue::NotApplicable, None)),
            (NodeValue::Undefined, _) | (_, NodeValue::Undefined) => Ok((NodeValue::Undefined, None)),
            (NodeValue::NotApplicable, value) => Ok((value.clone(), right.unit.clone())),
            (value, NodeValue::NotApplicable) => Ok((value.clone(), left.unit.clone())),
            _ => {
                let l = self.operand(operator, left)?;
                let r = self.operand(operator, right)?;
                let r = match (&left.unit, &right.unit) {
                    (Some(_), Some(_)) => self.align(r, right.unit.as_ref(), left.unit.as_ref(), "compare"),
                    _ => r,
                };
                let value = if operator == Operator::Max { l.max(r) } else { l.min(r) };
                Ok((NodeValue::number(value), left.unit.clone().or_else(|| right.unit.clone())))
            }
        }
    }

    fn multiplicative(
        &self,
        operator: Operator,
        left: &EvaluatedNode,
        right: &EvaluatedNode,
    ) -> EngineResult<Outcome> {
        let l = self.operand(operator, left)?;
        let r = self.operand(operator, right)?;
        let table = &self.context.options.unit_table;
        let (value, unit) = match operator {
            Operator::Multiply => multiply(l, left.unit.as_ref(), r, right.unit.as_ref(), table),
            Operator::Divide | Operator::IntegerDivide => {
                if r == 0.0 {
                    return Err(self.evaluation_error("division by zero"));
                }
                let unit = product_unit(left.unit.as_ref(), right.unit.as_ref(), true);
                let (value, unit) = normalize(l / r, unit, table);
                if operator == Operator::IntegerDivide {
                    (value.floor(), unit)
                } else {
                    (value, unit)
                }
            }
            _ => (l.powf(r), self.power_unit(left.unit.as_ref(), r)),
        };
        if !value.is_finite() {
            return Err(self.evaluation_error(format!(
                "\"{}\" produced a non-finite number",
                operator.symbol()
            )));
        }
        Ok((NodeValue::number(value), unit))
    }

    /// Unit of `x ** exponent`: the unit repeated for small integer exponents
    fn power_unit(&self, unit: Option<&Unit>, exponent: f64) -> Option<Unit> {
        let unit = unit?;
        if exponent == 0.0 {
            return None;
        }
        if exponent.fract() == 0.0 && (1.0..=9.0).contains(&exponent) {
            let mut power = unit.clone();
            for _ in 1..exponent as usize {
                power = power.multiply(unit);
            }
            return Some(power);
        }
        self.warn(format!(
            "unit \"{}\" dropped by a non-integer exponent",
            unit
        ));
        None
    }

    fn operand(&self, operator: Operator, evaluated: &EvaluatedNode) -> EngineResult<f64> {
        match &evaluated.value {
            NodeValue::Value(LiteralValue::Number(n)) => Ok(*n),
            other => Err(self.evaluation_error(format!(
                "\"{}\" expects numbers, got {}",
                operator.symbol(),
                describe(other)
            ))),
        }
    }

    /// Convert `value` from `from` into `to`, keeping it unchanged (with a
    /// warning) when the units are incompatible
    pub(crate) fn align(&self, value: f64, from: Option<&Unit>, to: Option<&Unit>, action: &str) -> f64 {
        if from.is_none() || to.is_none() {
            return value;
        }
        match convert(value, from, to, &self.context.options.unit_table) {
            Ok(converted) => converted,
            Err(error) => {
                self.warn(format!(
                    "cannot {} \"{}\" and \"{}\" ({}), the left unit is kept",
                    action,
                    serialize_unit(to),
                    serialize_unit(from),
                    error
                ));
                value
            }
        }
    }
}

/// Product (or quotient) of two optional units
fn product_unit(left: Option<&Unit>, right: Option<&Unit>, divide: bool) -> Option<Unit> {
    if left.is_none() && right.is_none() {
        return None;
    }
    let left = left.cloned().unwrap_or_default();
    let right = right.cloned().unwrap_or_default();
    Some(if divide {
        left.divide(&right)
    } else {
        left.multiply(&right)
    })
}

/// `l * r` with unit inference
///
/// A percentage applied to a non-percentage operand is divided by 100 and its
/// `%` dropped; the product of two percentages stays a percentage.
///
/// # Examples
/// ```text
/// 1500 * 50%        = 750
/// 3000 €/mois * 77% = 2310 €/mois
/// 50% * 50%         = 25%
/// ```
pub fn multiply(
    l: f64,
    left_unit: Option<&Unit>,
    r: f64,
    right_unit: Option<&Unit>,
    table: &UnitTable,
) -> (f64, Option<Unit>) {
    let left_is_percentage = left_unit.is_some_and(Unit::is_percentage);
    let right_is_percentage = right_unit.is_some_and(Unit::is_percentage);
    match (left_is_percentage, right_is_percentage) {
        (true, false) => normalize(l / 100.0 * r, right_unit.cloned(), table),
        (false, true) => normalize(l * r / 100.0, left_unit.cloned(), table),
        _ => normalize(l * r, product_unit(left_unit, right_unit, false), table),
    }
}

/// Fold percentages and cancel convertible symbols
///
/// # Examples
/// ```text
/// 3000 €.%        -> 30 €
/// 1000 €/mois.an  -> 12000 €
/// ```
pub fn normalize(value: f64, unit: Option<Unit>, table: &UnitTable) -> (f64, Option<Unit>) {
    let Some(unit) = unit else {
        return (value, None);
    };
    let (unit, value) = fold_percentages(&unit, value);
    let (unit, value) = simplify_with_value(&unit, value, table);
    (value, unit.non_empty())
}

fn describe(value: &NodeValue) -> String {
    match value {
        NodeValue::Value(value) => format!("{} ({})", value, value.value_type()),
        NodeValue::NotApplicable => "a not applicable value".to_string(),
        NodeValue::Undefined => "an undefined value".to_string(),
    }
}
