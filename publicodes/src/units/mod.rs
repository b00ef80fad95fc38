//! Unit algebra
//!
//! A unit is a pair of multisets of base-unit symbols: `€/mois` is
//! `{numerators: [€], denominators: [mois]}`. Equality and arithmetic are
//! multiset operations, never string comparisons.
//!
//! - `conversion` holds the conversion table, dimensional compatibility checks
//!   and value-aware simplification
//! - `format` renders units for display with language-specific plurals

pub mod conversion;
pub mod format;

pub use conversion::{convert, fold_percentages, simplify_with_value, UnitTable};
pub use format::{format_unit, Language};

use crate::error::UnitError;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// Symbol used for percentages
pub const PERCENT: &str = "%";

/// Maps a written unit symbol to its canonical key (e.g. `jours` to `jour`)
pub type UnitNormalizer = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Unit {
    pub numerators: Vec<String>,
    pub denominators: Vec<String>,
}

fn exponent_regex() -> &'static Regex {
    static EXPONENT: OnceLock<Regex> = OnceLock::new();
    EXPONENT.get_or_init(|| Regex::new(r"^(\D+?)([2-9])$").expect("static regex"))
}

impl Unit {
    pub fn new(numerators: Vec<String>, denominators: Vec<String>) -> Self {
        Self {
            numerators,
            denominators,
        }
    }

    /// A unit made of a single symbol
    pub fn symbol(symbol: impl Into<String>) -> Self {
        Self {
            numerators: vec![symbol.into()],
            denominators: Vec::new(),
        }
    }

    pub fn percent() -> Self {
        Self::symbol(PERCENT)
    }

    /// Parse `a.b/c.d` (or `a/c/d`), with optional single-digit exponents (`m2`)
    pub fn parse(text: &str, normalizer: Option<&UnitNormalizer>) -> Result<Unit, UnitError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Unit::default());
        }
        let mut parts = text.split('/');
        let head = parts.next().unwrap_or_default();
        let numerators = parse_symbols(head, text, normalizer)?;
        let mut denominators = Vec::new();
        for part in parts {
            if part.trim().is_empty() {
                return Err(UnitError::Invalid(text.to_string()));
            }
            denominators.extend(parse_symbols(part, text, normalizer)?);
        }
        Ok(Unit {
            numerators,
            denominators,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.numerators.is_empty() && self.denominators.is_empty()
    }

    pub fn is_percentage(&self) -> bool {
        self.numerators.len() == 1 && self.numerators[0] == PERCENT && self.denominators.is_empty()
    }

    pub fn contains_percent(&self) -> bool {
        self.numerators.iter().any(|s| s == PERCENT) || self.denominators.iter().any(|s| s == PERCENT)
    }

    pub fn inverse(&self) -> Unit {
        Unit {
            numerators: self.denominators.clone(),
            denominators: self.numerators.clone(),
        }
    }

    /// Product of two units, with identical symbols cancelled
    pub fn multiply(&self, other: &Unit) -> Unit {
        let mut numerators = self.numerators.clone();
        numerators.extend(other.numerators.iter().cloned());
        let mut denominators = self.denominators.clone();
        denominators.extend(other.denominators.iter().cloned());
        Unit {
            numerators,
            denominators,
        }
        .simplify()
    }

    pub fn divide(&self, other: &Unit) -> Unit {
        self.multiply(&other.inverse())
    }

    /// Cancel symbols appearing in both numerators and denominators
    pub fn simplify(&self) -> Unit {
        let mut denominators = self.denominators.clone();
        let mut numerators = Vec::with_capacity(self.numerators.len());
        for symbol in &self.numerators {
            if let Some(index) = denominators.iter().position(|d| d == symbol) {
                denominators.remove(index);
            } else {
                numerators.push(symbol.clone());
            }
        }
        Unit {
            numerators,
            denominators,
        }
    }

    /// `Some(unit)` unless the unit is empty
    pub fn non_empty(self) -> Option<Unit> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }

    fn counts(symbols: &[String]) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for symbol in symbols {
            *counts.entry(symbol.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

fn parse_symbols(
    part: &str,
    whole: &str,
    normalizer: Option<&UnitNormalizer>,
) -> Result<Vec<String>, UnitError> {
    let mut symbols = Vec::new();
    let part = part.trim();
    if part.is_empty() {
        return Ok(symbols);
    }
    for raw in part.split('.') {
        let raw = raw.trim();
        if raw.is_empty() || raw.chars().any(char::is_whitespace) {
            return Err(UnitError::Invalid(whole.to_string()));
        }
        let (symbol, repeat) = match exponent_regex().captures(raw) {
            Some(captures) => {
                let repeat = captures[2].parse::<usize>().unwrap_or(1);
                (captures[1].to_string(), repeat)
            }
            None => (raw.to_string(), 1),
        };
        let symbol = match normalizer {
            Some(normalize) => normalize(&symbol),
            None => symbol,
        };
        for _ in 0..repeat {
            symbols.push(symbol.clone());
        }
    }
    Ok(symbols)
}

impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        Unit::counts(&self.numerators) == Unit::counts(&other.numerators)
            && Unit::counts(&self.denominators) == Unit::counts(&other.denominators)
    }
}

impl Eq for Unit {}

impl Hash for Unit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Unit::counts(&self.numerators).hash(state);
        Unit::counts(&self.denominators).hash(state);
    }
}

fn write_symbols(f: &mut fmt::Formatter<'_>, symbols: &[String]) -> fmt::Result {
    let mut first = true;
    let mut seen: Vec<&str> = Vec::new();
    for symbol in symbols {
        if seen.contains(&symbol.as_str()) {
            continue;
        }
        seen.push(symbol);
        let count = symbols.iter().filter(|s| *s == symbol).count();
        if !first {
            write!(f, ".")?;
        }
        first = false;
        if count > 1 {
            write!(f, "{}{}", symbol, count)?;
        } else {
            write!(f, "{}", symbol)?;
        }
    }
    Ok(())
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_symbols(f, &self.numerators)?;
        if !self.denominators.is_empty() {
            write!(f, "/")?;
            write_symbols(f, &self.denominators)?;
        }
        Ok(())
    }
}

/// Serialize an optional unit, the empty string standing for "no unit"
pub fn serialize_unit(unit: Option<&Unit>) -> String {
    unit.map(Unit::to_string).unwrap_or_default()
}
