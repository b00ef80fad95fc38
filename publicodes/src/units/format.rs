use super::Unit;

/// Language used for pluralizing unit names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    Fr,
    En,
}

/// Symbols that are abbreviations and never take a plural mark
const INVARIABLE: &[&str] = &[
    "%", "€", "k€", "$", "s", "min", "h", "mg", "g", "kg", "t", "mm", "cm", "m", "km", "kWh",
    "MWh",
];

impl Language {
    fn is_plural(&self, value: f64) -> bool {
        match self {
            // French uses the singular below 2
            Language::Fr => value.abs() >= 2.0,
            Language::En => value.abs() != 1.0,
        }
    }

    fn pluralize(&self, symbol: &str) -> String {
        if INVARIABLE.contains(&symbol) || !symbol.chars().all(char::is_alphabetic) {
            return symbol.to_string();
        }
        match self {
            Language::Fr if symbol.ends_with(['s', 'x', 'z']) => symbol.to_string(),
            Language::Fr if symbol.ends_with("al") => format!("{}aux", &symbol[..symbol.len() - 2]),
            Language::Fr => format!("{}s", symbol),
            Language::En if symbol.ends_with('s') => symbol.to_string(),
            Language::En if ends_with_consonant_y(symbol) => {
                format!("{}ies", &symbol[..symbol.len() - 1])
            }
            Language::En => format!("{}s", symbol),
        }
    }
}

fn ends_with_consonant_y(symbol: &str) -> bool {
    let mut chars = symbol.chars().rev();
    chars.next() == Some('y') && chars.next().is_some_and(|c| !"aeiou".contains(c))
}

/// Render `unit` for a quantity of `value`, pluralizing numerators when needed
///
/// Denominators stay singular: `3 jours/mois`.
pub fn format_unit(unit: &Unit, value: f64, language: Language) -> String {
    let plural = language.is_plural(value);
    let numerators: Vec<String> = unit
        .numerators
        .iter()
        .map(|symbol| {
            if plural {
                language.pluralize(symbol)
            } else {
                symbol.clone()
            }
        })
        .collect();
    let mut rendered = Unit::new(numerators, Vec::new()).to_string();
    if !unit.denominators.is_empty() {
        rendered.push('/');
        rendered.push_str(&Unit::new(unit.denominators.clone(), Vec::new()).to_string());
    }
    rendered
}
