//! Evaluation of conditions, schedules and chainable mechanisms

use super::merge_missing;
use super::operations::normalize;
use crate::engine::Engine;
use crate::evaluated::{EvaluatedNode, MissingVariables, NodeValue};
use crate::semantic::{
    Abattement, Arrondi, Bound, Condition, Duree, Guard, LiteralValue, NodeRef, ParDefaut,
    Schedule, TextPart, UnitConversion, VariationBranch,
};
use crate::units::{convert, format_unit, Language, Unit};
use crate::EngineResult;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

/// A schedule with every child evaluated and thresholds in the assiette's unit
struct EvaluatedSchedule {
    assiette: f64,
    unit: Option<Unit>,
    /// Upper threshold and value of each bracket
    tranches: Vec<(Option<f64>, EvaluatedNode)>,
    missing: MissingVariables,
}

/// Outcome of evaluating a schedule's inputs
enum ScheduleInputs {
    Ready(EvaluatedSchedule),
    /// The schedule's result is this value (not applicable or undefined)
    Empty(NodeValue, MissingVariables),
}

/// Ratio represented by a rate: `14 %` is `0.14`, a bare number is itself
fn ratio(rate: &EvaluatedNode) -> Option<f64> {
    let value = rate.as_number()?;
    Some(match &rate.unit {
        Some(unit) if unit.is_percentage() => value / 100.0,
        _ => value,
    })
}

impl Engine {
    pub(super) fn evaluate_condition(
        &mut self,
        node: &NodeRef,
        condition: &Condition,
    ) -> EngineResult<EvaluatedNode> {
        let si = self.evaluate_node(&condition.si)?;
        let Some(test) = self.condition_value(&si)? else {
            return Ok(EvaluatedNode::new(node.clone(), NodeValue::Undefined)
                .with_missing(si.missing_variables.clone()));
        };
        let branch = if test { &condition.alors } else { &condition.sinon };
        let result = self.evaluate_node(branch)?;
        Ok(EvaluatedNode::new(node.clone(), result.value.clone())
            .with_unit(result.unit.clone())
            .with_missing(merge_missing([&si, &result])))
    }

    pub(super) fn evaluate_variations(
        &mut self,
        node: &NodeRef,
        branches: &[VariationBranch],
    ) -> EngineResult<EvaluatedNode> {
        let mut missing = MissingVariables::new();
        for branch in branches {
            let condition = self.evaluate_node(&branch.condition)?;
            missing.merge(&condition.missing_variables);
            match self.condition_value(&condition)? {
                Some(false) => continue,
                Some(true) => {
                    let consequence = self.evaluate_node(&branch.consequence)?;
                    missing.merge(&consequence.missing_variables);
                    return Ok(EvaluatedNode::new(node.clone(), consequence.value.clone())
                        .with_unit(consequence.unit.clone())
                        .with_missing(missing));
                }
                None => {
                    return Ok(EvaluatedNode::new(node.clone(), NodeValue::Undefined)
                        .with_missing(missing))
                }
            }
        }
        Ok(EvaluatedNode::new(node.clone(), NodeValue::NotApplicable).with_missing(missing))
    }

    fn evaluate_schedule(&mut self, schedule: &Schedule, name: &str) -> EngineResult<ScheduleInputs> {
        let assiette = self.evaluate_node(&schedule.assiette)?;
        let multiplicateur = self.evaluate_node(&schedule.multiplicateur)?;
        let mut evaluated = vec![assiette.clone(), multiplicateur.clone()];
        let mut raw_tranches = Vec::with_capacity(schedule.tranches.len());
        for tranche in &schedule.tranches {
            let plafond = match &tranche.plafond {
                Some(plafond) => Some(self.evaluate_node(plafond)?),
                None => None,
            };
            let value = self.evaluate_node(&tranche.value)?;
            evaluated.extend(plafond.iter().cloned());
            evaluated.push(value.clone());
            raw_tranches.push((plafond, value));
        }
        let missing = merge_missing(&evaluated);

        if assiette.is_not_applicable() {
            return Ok(ScheduleInputs::Empty(NodeValue::NotApplicable, missing));
        }
        let undefined = evaluated.iter().any(EvaluatedNode::is_undefined);
        let (Some(base), Some(factor)) = (
            self.number_value(&assiette, "assiette")?,
            self.number_value(&multiplicateur, "multiplicateur")?,
        ) else {
            return Ok(ScheduleInputs::Empty(NodeValue::Undefined, missing));
        };
        if undefined {
            return Ok(ScheduleInputs::Empty(NodeValue::Undefined, missing));
        }

        let mut tranches = Vec::with_capacity(raw_tranches.len());
        let mut previous: Option<f64> = None;
        for (plafond, value) in raw_tranches {
            let threshold = match plafond {
                None => None,
                Some(plafond) => {
                    let Some(amount) = self.number_value(&plafond, "plafond")? else {
                        return Ok(ScheduleInputs::Empty(NodeValue::Undefined, missing));
                    };
                    let unit = match (&plafond.unit, &multiplicateur.unit) {
                        (None, None) => None,
                        (a, b) => Some(
                            a.clone()
                                .unwrap_or_default()
                                .multiply(&b.clone().unwrap_or_default()),
                        ),
                    };
                    let (amount, unit) =
                        normalize(amount * factor, unit, &self.context.options.unit_table);
                    let amount = match &assiette.unit {
                        Some(_) => self.align(amount, unit.as_ref(), assiette.unit.as_ref(), "compare"),
                        None => amount,
                    };
                    if previous.is_some_and(|previous| amount <= previous) {
                        return Err(self.evaluation_error(format!(
                            "the thresholds of \"{}\" must be increasing",
                            name
                        )));
                    }
                    previous = Some(amount);
                    Some(amount)
                }
            };
            tranches.push((threshold, value));
        }
        Ok(ScheduleInputs::Ready(EvaluatedSchedule {
            assiette: base,
            unit: assiette.unit.clone(),
            tranches,
            missing,
        }))
    }

    /// Marginal brackets: each rate applies to the slice of the assiette
    /// between the previous threshold and its own
    ///
    /// # Examples
    /// ```text
    /// assiette 43200, [9807: 0 %, 27086: 14 %, 30 %]
    ///   = 17279 × 14 % + 16114 × 30 % = 7253.26
    /// ```
    pub(super) fn evaluate_bareme(
        &mut self,
        node: &NodeRef,
        schedule: &Schedule,
    ) -> EngineResult<EvaluatedNode> {
        let inputs = match self.evaluate_schedule(schedule, "barème")? {
            ScheduleInputs::Ready(inputs) => inputs,
            ScheduleInputs::Empty(value, missing) => {
                return Ok(EvaluatedNode::new(node.clone(), value).with_missing(missing))
            }
        };
        let mut total = 0.0;
        let mut lower = 0.0;
        for (upper, rate) in &inputs.tranches {
            let upper_bound = upper.unwrap_or(f64::INFINITY);
            let slice = (inputs.assiette.min(upper_bound) - lower).max(0.0);
            if slice > 0.0 {
                let ratio = ratio(rate).ok_or_else(|| {
                    self.evaluation_error("the rates of \"barème\" must be numbers")
                })?;
                total += slice * ratio;
            }
            lower = upper_bound;
        }
        Ok(EvaluatedNode::new(node.clone(), NodeValue::number(total))
            .with_unit(inputs.unit)
            .with_missing(inputs.missing))
    }

    /// The amount of the first bracket whose threshold exceeds the assiette
    pub(super) fn evaluate_grille(
        &mut self,
        node: &NodeRef,
        schedule: &Schedule,
    ) -> EngineResult<EvaluatedNode> {
        let inputs = match self.evaluate_schedule(schedule, "grille")? {
            ScheduleInputs::Ready(inputs) => inputs,
            ScheduleInputs::Empty(value, missing) => {
                return Ok(EvaluatedNode::new(node.clone(), value).with_missing(missing))
            }
        };
        let matching = inputs
            .tranches
            .iter()
            .find(|(upper, _)| upper.map_or(true, |upper| inputs.assiette < upper));
        let (value, unit) = match matching {
            Some((_, montant)) => (montant.value.clone(), montant.unit.clone()),
            None => (NodeValue::NotApplicable, None),
        };
        Ok(EvaluatedNode::new(node.clone(), value)
            .with_unit(unit)
            .with_missing(inputs.missing))
    }

    /// Rate interpolated linearly between the rates of the surrounding
    /// thresholds
    ///
    /// # Examples
    /// ```text
    /// assiette 150, [100: 10 %, 200: 20 %]   = 15 %
    /// assiette 50,  [100: 10 %, 200: 20 %]   = 10 %
    /// assiette 300, [100: 10 %, 200: 20 %]   = 20 %
    /// ```
    pub(super) fn evaluate_taux_progressif(
        &mut self,
        node: &NodeRef,
        schedule: &Schedule,
    ) -> EngineResult<EvaluatedNode> {
        let inputs = match self.evaluate_schedule(schedule, "taux progressif")? {
            ScheduleInputs::Ready(inputs) => inputs,
            ScheduleInputs::Empty(value, missing) => {
                return Ok(EvaluatedNode::new(node.clone(), value).with_missing(missing))
            }
        };
        let rate_of = |rate: &EvaluatedNode| {
            rate.as_number().ok_or_else(|| {
                self.evaluation_error("the rates of \"taux progressif\" must be numbers")
            })
        };

        let mut result: Option<(f64, Option<Unit>)> = None;
        let mut lower: Option<(f64, f64)> = None;
        for (upper, rate) in &inputs.tranches {
            let value = rate_of(rate)?;
            match upper {
                None => {
                    result = Some((value, rate.unit.clone()));
                    break;
                }
                Some(upper) if inputs.assiette < *upper => {
                    let interpolated = match lower {
                        None => value,
                        Some((lower_bound, lower_rate)) => {
                            lower_rate
                                + (value - lower_rate) * (inputs.assiette - lower_bound)
                                    / (upper - lower_bound)
                        }
                    };
                    result = Some((interpolated, rate.unit.clone()));
                    break;
                }
                Some(upper) => lower = Some((*upper, value)),
            }
        }
        let (value, unit) = match (result, inputs.tranches.last()) {
            (Some(result), _) => result,
            (None, Some((_, last))) => (rate_of(last)?, last.unit.clone()),
            (None, None) => {
                return Ok(EvaluatedNode::new(node.clone(), NodeValue::NotApplicable)
                    .with_missing(inputs.missing))
            }
        };
        Ok(EvaluatedNode::new(node.clone(), NodeValue::number(value))
            .with_unit(unit)
            .with_missing(inputs.missing))
    }

    /// Convert to the declared unit; a failed conversion is a warning and
    /// the number is kept as is
    pub(super) fn evaluate_unite(
        &mut self,
        node: &NodeRef,
        conversion: &UnitConversion,
    ) -> EngineResult<EvaluatedNode> {
        let valeur = self.evaluate_node(&conversion.valeur)?;
        let result = EvaluatedNode::new(node.clone(), valeur.value.clone())
            .with_missing(valeur.missing_variables.clone());
        let NodeValue::Value(LiteralValue::Number(number)) = valeur.value else {
            let unit = if valeur.value.value().is_some() {
                valeur.unit.clone()
            } else {
                conversion.unit.clone()
            };
            return Ok(result.with_unit(unit));
        };
        let value = match (&valeur.unit, &conversion.unit) {
            (Some(_), Some(_)) => match convert(
                number,
                valeur.unit.as_ref(),
                conversion.unit.as_ref(),
                &self.context.options.unit_table,
            ) {
                Ok(converted) => converted,
                Err(error) => {
                    self.warn(format!("{}, the value is kept unconverted", error));
                    number
                }
            },
            _ => number,
        };
        Ok(EvaluatedNode::new(node.clone(), NodeValue::number(value))
            .with_unit(conversion.unit.clone())
            .with_missing(valeur.missing_variables.clone()))
    }

    /// Round half away from zero to the requested number of decimals
    pub(super) fn evaluate_arrondi(
        &mut self,
        node: &NodeRef,
        arrondi: &Arrondi,
    ) -> EngineResult<EvaluatedNode> {
        let valeur = self.evaluate_node(&arrondi.valeur)?;
        let precision = self.evaluate_node(&arrondi.precision)?;
        let missing = merge_missing([&valeur, &precision]);
        let decimals = match &precision.value {
            NodeValue::Value(LiteralValue::Number(n)) if *n >= 0.0 && n.fract() == 0.0 => {
                Some(n.min(f64::from(u32::MAX)) as u32)
            }
            NodeValue::Value(LiteralValue::Boolean(true)) => Some(0),
            NodeValue::Value(LiteralValue::Boolean(false)) | NodeValue::NotApplicable => None,
            NodeValue::Undefined => {
                return Ok(EvaluatedNode::new(node.clone(), NodeValue::Undefined).with_missing(missing))
            }
            NodeValue::Value(other) => {
                return Err(self.evaluation_error(format!(
                    "\"arrondi\" expects a whole number of decimals, got {}",
                    other
                )))
            }
        };
        let value = match (&valeur.value, decimals) {
            (NodeValue::Value(LiteralValue::Number(n)), Some(decimals)) => {
                NodeValue::number(round(*n, decimals))
            }
            (other, _) => other.clone(),
        };
        Ok(EvaluatedNode::new(node.clone(), value)
            .with_unit(valeur.unit.clone())
            .with_missing(missing))
    }

    /// `applicable si` (`applicable` is true) and `non applicable si`
    pub(super) fn evaluate_guard(
        &mut self,
        node: &NodeRef,
        guard: &Guard,
        applicable: bool,
    ) -> EngineResult<EvaluatedNode> {
        let condition = self.evaluate_node(&guard.condition)?;
        let test = self.condition_value(&condition)?;
        if test == Some(!applicable) {
            return Ok(EvaluatedNode::new(node.clone(), NodeValue::NotApplicable)
                .with_missing(condition.missing_variables.clone()));
        }
        let valeur = self.evaluate_node(&guard.valeur)?;
        let missing = merge_missing([&condition, &valeur]);
        let value = match test {
            None => NodeValue::Undefined,
            Some(_) => valeur.value.clone(),
        };
        Ok(EvaluatedNode::new(node.clone(), value)
            .with_unit(valeur.unit.clone())
            .with_missing(missing))
    }

    pub(super) fn evaluate_par_defaut(
        &mut self,
        node: &NodeRef,
        par_defaut: &ParDefaut,
    ) -> EngineResult<EvaluatedNode> {
        let valeur = self.evaluate_node(&par_defaut.valeur)?;
        if !valeur.is_undefined() {
            return Ok(EvaluatedNode::new(node.clone(), valeur.value.clone())
                .with_unit(valeur.unit.clone())
                .with_missing(valeur.missing_variables.clone()));
        }
        let default = self.evaluate_node(&par_defaut.default)?;
        let missing = valeur
            .missing_variables
            .clone()
            .merged(&default.missing_variables.bonus());
        Ok(EvaluatedNode::new(node.clone(), default.value.clone())
            .with_unit(default.unit.clone().or_else(|| valeur.unit.clone()))
            .with_missing(missing))
    }

    /// `plancher` (`floor` is true) and `plafond`
    pub(super) fn evaluate_bound(
        &mut self,
        node: &NodeRef,
        bound: &Bound,
        floor: bool,
    ) -> EngineResult<EvaluatedNode> {
        let valeur = self.evaluate_node(&bound.valeur)?;
        let limit = self.evaluate_node(&bound.bound)?;
        let missing = merge_missing([&valeur, &limit]);
        let name = if floor { "plancher" } else { "plafond" };
        let value = match (self.number_value(&valeur, "valeur")?, &limit.value) {
            (Some(value), NodeValue::Value(_)) => {
                let limit_value = self
                    .number_value(&limit, name)?
                    .map(|n| self.align(n, limit.unit.as_ref(), valeur.unit.as_ref(), "compare"))
                    .unwrap_or(value);
                let bounded = if floor {
                    value.max(limit_value)
                } else {
                    value.min(limit_value)
                };
                NodeValue::number(bounded)
            }
            (_, NodeValue::Undefined) if !valeur.is_not_applicable() => NodeValue::Undefined,
            _ => valeur.value.clone(),
        };
        Ok(EvaluatedNode::new(node.clone(), value)
            .with_unit(valeur.unit.clone())
            .with_missing(missing))
    }

    /// Subtract an amount or a percentage, never below zero
    ///
    /// # Examples
    /// ```text
    /// 48000 €, abattement 10 %    = 43200 €
    /// 1000 €,  abattement 1500 €  = 0 €
    /// ```
    pub(super) fn evaluate_abattement(
        &mut self,
        node: &NodeRef,
        abattement: &Abattement,
    ) -> EngineResult<EvaluatedNode> {
        let valeur = self.evaluate_node(&abattement.valeur)?;
        let amount = self.evaluate_node(&abattement.abattement)?;
        let missing = merge_missing([&valeur, &amount]);
        let value = match (self.number_value(&valeur, "valeur")?, &amount.value) {
            (Some(value), NodeValue::Value(_)) => {
                let reduction = self.number_value(&amount, "abattement")?.unwrap_or(0.0);
                let reduced = match &amount.unit {
                    Some(unit) if unit.is_percentage() => value * (1.0 - reduction / 100.0),
                    _ => {
                        value
                            - self.align(
                                reduction,
                                amount.unit.as_ref(),
                                valeur.unit.as_ref(),
                                "subtract",
                            )
                    }
                };
                NodeValue::number(reduced.max(0.0))
            }
            (Some(_), NodeValue::Undefined) => NodeValue::Undefined,
            _ => valeur.value.clone(),
        };
        Ok(EvaluatedNode::new(node.clone(), value)
            .with_unit(valeur.unit.clone())
            .with_missing(missing))
    }

    /// `est non défini` / `est non applicable`: `test` returns `None` when
    /// the answer is not known yet
    pub(super) fn evaluate_predicate(
        &mut self,
        node: &NodeRef,
        inner: &NodeRef,
        test: fn(&NodeValue) -> Option<bool>,
    ) -> EngineResult<EvaluatedNode> {
        let evaluated = self.evaluate_node(inner)?;
        let value = test(&evaluated.value).map_or(NodeValue::Undefined, NodeValue::boolean);
        Ok(EvaluatedNode::new(node.clone(), value).with_missing(evaluated.missing_variables.clone()))
    }

    /// Days between two dates (today by default), in the requested unit
    pub(super) fn evaluate_duree(&mut self, node: &NodeRef, duree: &Duree) -> EngineResult<EvaluatedNode> {
        let depuis = self.evaluate_node(&duree.depuis)?;
        let jusqua = match &duree.jusqua {
            Some(jusqua) => Some(self.evaluate_node(jusqua)?),
            None => None,
        };
        let mut missing = depuis.missing_variables.clone();
        if let Some(jusqua) = &jusqua {
            missing.merge(&jusqua.missing_variables);
        }
        let end = match &jusqua {
            None => NodeValue::Value(LiteralValue::Date(chrono::Local::now().date_naive())),
            Some(jusqua) => jusqua.value.clone(),
        };
        let value = match (&depuis.value, &end) {
            (NodeValue::Value(LiteralValue::Date(start)), NodeValue::Value(LiteralValue::Date(end))) => {
                let days = (*end - *start).num_days() as f64;
                let day = Unit::symbol("jour");
                let value = self.align(days, Some(&day), Some(&duree.unit), "convert");
                NodeValue::number(value)
            }
            (NodeValue::NotApplicable, _) | (_, NodeValue::NotApplicable) => NodeValue::NotApplicable,
            (NodeValue::Undefined, _) | (_, NodeValue::Undefined) => NodeValue::Undefined,
            (start, end) => {
                return Err(self.evaluation_error(format!(
                    "\"durée\" expects dates, got {:?} and {:?}",
                    start.value(),
                    end.value()
                )))
            }
        };
        let unit = value.value().map(|_| duree.unit.clone());
        Ok(EvaluatedNode::new(node.clone(), value)
            .with_unit(unit)
            .with_missing(missing))
    }

    /// Render the interpolated parts; any undefined part makes the text undefined
    pub(super) fn evaluate_texte(
        &mut self,
        node: &NodeRef,
        parts: &[TextPart],
    ) -> EngineResult<EvaluatedNode> {
        let mut text = String::new();
        let mut missing = MissingVariables::new();
        let mut undefined = false;
        for part in parts {
            match part {
                TextPart::Literal(literal) => text.push_str(literal),
                TextPart::Node(inner) => {
                    let evaluated = self.evaluate_node(inner)?;
                    missing.merge(&evaluated.missing_variables);
                    match &evaluated.value {
                        NodeValue::Undefined => undefined = true,
                        NodeValue::NotApplicable => {}
                        NodeValue::Value(value) => text.push_str(&render(value, evaluated.unit.as_ref())),
                    }
                }
            }
        }
        let value = if undefined {
            NodeValue::Undefined
        } else {
            NodeValue::Value(LiteralValue::Text(text))
        };
        Ok(EvaluatedNode::new(node.clone(), value).with_missing(missing))
    }

    pub(super) fn evaluate_simplifier_unite(
        &mut self,
        node: &NodeRef,
        inner: &NodeRef,
    ) -> EngineResult<EvaluatedNode> {
        let evaluated = self.evaluate_node(inner)?;
        let (value, unit) = match (&evaluated.value, &evaluated.unit) {
            (NodeValue::Value(LiteralValue::Number(n)), unit) => {
                let (n, unit) = normalize(*n, unit.clone(), &self.context.options.unit_table);
                (NodeValue::number(n), unit)
            }
            (value, unit) => (value.clone(), unit.clone()),
        };
        Ok(EvaluatedNode::new(node.clone(), value)
            .with_unit(unit)
            .with_missing(evaluated.missing_variables.clone()))
    }
}

/// Round half away from zero; values `Decimal` cannot hold are returned as is
pub fn round(value: f64, decimals: u32) -> f64 {
    Decimal::from_f64(value)
        .map(|decimal| decimal.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|decimal| decimal.to_f64())
        .unwrap_or(value)
}

fn render(value: &LiteralValue, unit: Option<&Unit>) -> String {
    match value {
        LiteralValue::Text(text) => text.clone(),
        LiteralValue::Number(n) => {
            let number = format_number(*n);
            match unit {
                Some(unit) => format!("{} {}", number, format_unit(unit, *n, Language::Fr)),
                None => number,
            }
        }
        other => other.to_string(),
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", round(value, 2))
    }
}
