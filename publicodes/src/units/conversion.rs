//! Unit conversion
//!
//! Two units are convertible when, for every dimension class, the net
//! exponent (numerators minus denominators) is the same. Symbols missing from
//! the table form their own class. Percentages are exempt: `%` attaches and
//! detaches freely with a factor of 100.

use super::{Unit, PERCENT};
use crate::error::UnitError;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq)]
struct UnitFactor {
    class: String,
    factor: f64,
}

/// Conversion factors and simplification equivalence classes
#[derive(Debug, Clone, PartialEq)]
pub struct UnitTable {
    factors: HashMap<String, UnitFactor>,
    simplification_classes: Vec<Vec<String>>,
}

const DAYS_PER_YEAR: f64 = 365.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

impl Default for UnitTable {
    fn default() -> Self {
        let mut table = UnitTable {
            factors: HashMap::new(),
            simplification_classes: Vec::new(),
        };
        let year = DAYS_PER_YEAR * SECONDS_PER_DAY;
        table
            .with_factor("s", "time", 1.0)
            .with_factor("min", "time", 60.0)
            .with_factor("h", "time", 3600.0)
            .with_factor("jour", "time", SECONDS_PER_DAY)
            .with_factor("semaine", "time", 7.0 * SECONDS_PER_DAY)
            .with_factor("mois", "time", year / 12.0)
            .with_factor("trimestre", "time", year / 4.0)
            .with_factor("an", "time", year)
            .with_factor("€", "money", 1.0)
            .with_factor("k€", "money", 1000.0)
            .with_factor("mg", "mass", 0.001)
            .with_factor("g", "mass", 1.0)
            .with_factor("kg", "mass", 1000.0)
            .with_factor("t", "mass", 1_000_000.0)
            .with_factor("mm", "length", 0.001)
            .with_factor("cm", "length", 0.01)
            .with_factor("m", "length", 1.0)
            .with_factor("km", "length", 1000.0)
            .with_factor("kWh", "energy", 1.0)
            .with_factor("MWh", "energy", 1000.0);

        // Day-based and calendar-based durations never cancel each other out
        for class in [
            &["mm", "cm", "m", "km"][..],
            &["mg", "g", "kg", "t"],
            &["€", "k€"],
            &["mois", "trimestre", "an"],
            &["s", "min", "h"],
            &["kWh", "MWh"],
        ] {
            table
                .simplification_classes
                .push(class.iter().map(|s| s.to_string()).collect());
        }
        table
    }
}

impl UnitTable {
    /// A table without any conversion: only identical symbols are compatible
    pub fn empty() -> Self {
        Self {
            factors: HashMap::new(),
            simplification_classes: Vec::new(),
        }
    }

    /// Register `symbol` as `factor` base units of dimension `class`
    pub fn with_factor(&mut self, symbol: &str, class: &str, factor: f64) -> &mut Self {
        self.factors.insert(
            symbol.to_string(),
            UnitFactor {
                class: class.to_string(),
                factor,
            },
        );
        self
    }

    /// Replace the equivalence classes used when simplifying units
    pub fn with_simplification_classes(mut self, classes: Vec<Vec<String>>) -> Self {
        self.simplification_classes = classes;
        self
    }

    fn class_of<'a>(&'a self, symbol: &'a str) -> &'a str {
        self.factors
            .get(symbol)
            .map(|f| f.class.as_str())
            .unwrap_or(symbol)
    }

    fn factor_of(&self, symbol: &str) -> f64 {
        self.factors.get(symbol).map(|f| f.factor).unwrap_or(1.0)
    }

    fn same_simplification_class(&self, a: &str, b: &str) -> bool {
        a == b
            || self
                .simplification_classes
                .iter()
                .any(|class| class.iter().any(|s| s == a) && class.iter().any(|s| s == b))
    }

    /// Net exponent per dimension class, ignoring percentages
    fn dimensions(&self, unit: Option<&Unit>) -> BTreeMap<String, i32> {
        let mut dimensions = BTreeMap::new();
        if let Some(unit) = unit {
            for symbol in unit.numerators.iter().filter(|s| *s != PERCENT) {
                *dimensions.entry(self.class_of(symbol).to_string()).or_insert(0) += 1;
            }
            for symbol in unit.denominators.iter().filter(|s| *s != PERCENT) {
                *dimensions.entry(self.class_of(symbol).to_string()).or_insert(0) -= 1;
            }
        }
        dimensions.retain(|_, exponent| *exponent != 0);
        dimensions
    }

    /// Multiplier from `unit` to the base units of its classes
    fn base_factor(&self, unit: Option<&Unit>) -> f64 {
        let Some(unit) = unit else { return 1.0 };
        let mut factor = 1.0;
        for symbol in &unit.numerators {
            factor *= if symbol == PERCENT { 0.01 } else { self.factor_of(symbol) };
        }
        for symbol in &unit.denominators {
            factor /= if symbol == PERCENT { 0.01 } else { self.factor_of(symbol) };
        }
        factor
    }

    pub fn are_compatible(&self, from: Option<&Unit>, to: Option<&Unit>) -> bool {
        self.dimensions(from) == self.dimensions(to)
    }
}

/// Convert `value` expressed in `from` into `to`
pub fn convert(
    value: f64,
    from: Option<&Unit>,
    to: Option<&Unit>,
    table: &UnitTable,
) -> Result<f64, UnitError> {
    if from == to || (from.is_none_or_empty() && to.is_none_or_empty()) {
        return Ok(value);
    }
    if !table.are_compatible(from, to) {
        return Err(UnitError::Incompatible {
            from: super::serialize_unit(from),
            to: super::serialize_unit(to),
        });
    }
    Ok(value * table.base_factor(from) / table.base_factor(to))
}

trait OptionalUnit {
    fn is_none_or_empty(&self) -> bool;
}

impl OptionalUnit for Option<&Unit> {
    fn is_none_or_empty(&self) -> bool {
        self.map_or(true, Unit::is_empty)
    }
}

/// Cancel convertible symbols across numerators and denominators, folding
/// the conversion factor into the value (`€/mois × an` is `12 × €`)
pub fn simplify_with_value(unit: &Unit, value: f64, table: &UnitTable) -> (Unit, f64) {
    let mut numerators = Vec::with_capacity(unit.numerators.len());
    let mut denominators = unit.denominators.clone();
    let mut value = value;
    for symbol in &unit.numerators {
        let matching = denominators
            .iter()
            .position(|d| d == symbol)
            .or_else(|| {
                denominators
                    .iter()
                    .position(|d| table.same_simplification_class(symbol, d))
            });
        match matching {
            Some(index) => {
                let denominator = denominators.remove(index);
                value *= table.factor_of(symbol) / table.factor_of(&denominator);
            }
            None => numerators.push(symbol.clone()),
        }
    }
    (
        Unit {
            numerators,
            denominators,
        },
        value,
    )
}

/// Fold `%` symbols that accompany other symbols into the value
///
/// `€.%` becomes `€` with the value divided by 100; a lone `%` is kept.
pub fn fold_percentages(unit: &Unit, value: f64) -> (Unit, f64) {
    let mut unit = unit.simplify();
    let mut value = value;
    while unit.denominators.iter().any(|s| s == PERCENT) {
        if let Some(index) = unit.denominators.iter().position(|s| s == PERCENT) {
            unit.denominators.remove(index);
            value *= 100.0;
        }
    }
    while unit.numerators.iter().any(|s| s == PERCENT)
        && (unit.numerators.len() > 1 || !unit.denominators.is_empty())
    {
        if let Some(index) = unit.numerators.iter().position(|s| s == PERCENT) {
            unit.numerators.remove(index);
            value /= 100.0;
        }
    }
    (unit, value)
}
