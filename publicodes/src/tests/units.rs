use crate::error::UnitError;
use crate::units::{
    convert, fold_percentages, format_unit, simplify_with_value, Language, Unit, UnitNormalizer,
    UnitTable,
};
use std::sync::Arc;

fn unit(text: &str) -> Unit {
    Unit::parse(text, None).unwrap()
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9 * expected.abs().max(1.0),
        "{} != {}",
        actual,
        expected
    );
}

#[test]
fn test_parse() {
    assert_eq!(unit("€/mois"), Unit::new(vec!["€".into()], vec!["mois".into()]));
    assert_eq!(unit("m2"), Unit::new(vec!["m".into(), "m".into()], vec![]));
    assert_eq!(
        unit("kg.m/s2"),
        Unit::new(vec!["kg".into(), "m".into()], vec!["s".into(), "s".into()])
    );
    assert!(unit("").is_empty());
    assert!(matches!(Unit::parse("€/", None), Err(UnitError::Invalid(_))));
    assert!(matches!(Unit::parse("a b", None), Err(UnitError::Invalid(_))));
}

#[test]
fn test_normalizer() {
    let normalizer: UnitNormalizer = Arc::new(|symbol: &str| {
        symbol.strip_suffix('s').unwrap_or(symbol).to_string()
    });
    assert_eq!(Unit::parse("jours", Some(&normalizer)).unwrap(), Unit::symbol("jour"));
}

#[test]
fn test_equality_is_multiset() {
    assert_eq!(unit("a.b/c"), unit("b.a/c"));
    assert_ne!(unit("a.a"), unit("a"));
}

#[test]
fn test_display() {
    assert_eq!(unit("€/mois").to_string(), "€/mois");
    assert_eq!(unit("m.m").to_string(), "m2");
    assert_eq!(unit("kg.m/s.s").to_string(), "kg.m/s2");
}

#[test]
fn test_multiply_cancels_identical_symbols() {
    let product = unit("€/mois").multiply(&unit("mois"));
    assert_eq!(product, Unit::symbol("€"));
    assert_eq!(unit("€").divide(&unit("€")), Unit::default());
}

#[test]
fn test_convert() {
    let table = UnitTable::default();
    assert_close(
        convert(1.0, Some(&unit("€/mois")), Some(&unit("€/an")), &table).unwrap(),
        12.0,
    );
    assert_close(
        convert(1500.0, Some(&unit("g")), Some(&unit("kg")), &table).unwrap(),
        1.5,
    );
    assert_close(
        convert(50.0, Some(&Unit::percent()), None, &table).unwrap(),
        0.5,
    );
    assert_eq!(convert(3.0, None, None, &table).unwrap(), 3.0);
}

#[test]
fn test_incompatible_units() {
    let table = UnitTable::default();
    let error = convert(1.0, Some(&unit("€")), Some(&unit("kg")), &table).unwrap_err();
    assert_eq!(
        error,
        UnitError::Incompatible {
            from: "€".to_string(),
            to: "kg".to_string(),
        }
    );
    assert!(!table.are_compatible(Some(&unit("€/mois")), Some(&unit("€"))));
    // Percentages attach and detach freely
    assert!(table.are_compatible(Some(&unit("€.%")), Some(&unit("€"))));
}

#[test]
fn test_unknown_symbols_only_match_themselves() {
    let table = UnitTable::default();
    assert!(table.are_compatible(Some(&unit("repas")), Some(&unit("repas"))));
    assert!(!table.are_compatible(Some(&unit("repas")), Some(&unit("nuit"))));
    assert!(!UnitTable::empty().are_compatible(Some(&unit("g")), Some(&unit("kg"))));
}

#[test]
fn test_fold_percentages() {
    let (folded, value) = fold_percentages(&unit("€.%"), 200.0);
    assert_eq!(folded, Unit::symbol("€"));
    assert_close(value, 2.0);

    let (folded, value) = fold_percentages(&Unit::percent(), 20.0);
    assert_eq!(folded, Unit::percent());
    assert_eq!(value, 20.0);

    let (folded, value) = fold_percentages(&unit("€/%"), 2.0);
    assert_eq!(folded, Unit::symbol("€"));
    assert_close(value, 200.0);
}

#[test]
fn test_simplify_with_value() {
    let table = UnitTable::default();
    let (simplified, value) = simplify_with_value(&unit("€.an/mois"), 100.0, &table);
    assert_eq!(simplified, Unit::symbol("€"));
    assert_close(value, 1200.0);

    // Days and months belong to different simplification classes
    let (simplified, value) = simplify_with_value(&unit("jour/mois"), 3.0, &table);
    assert_eq!(simplified, unit("jour/mois"));
    assert_eq!(value, 3.0);
}

#[test]
fn test_format_unit() {
    assert_eq!(format_unit(&unit("jour"), 3.0, Language::Fr), "jours");
    assert_eq!(format_unit(&unit("jour"), 1.5, Language::Fr), "jour");
    assert_eq!(format_unit(&unit("jour/mois"), 3.0, Language::Fr), "jours/mois");
    assert_eq!(format_unit(&unit("€/mois"), 3.0, Language::Fr), "€/mois");
    assert_eq!(format_unit(&unit("day"), 1.5, Language::En), "days");
    assert_eq!(format_unit(&unit("hour"), 1.0, Language::En), "hour");
    assert_eq!(format_unit(&unit("party"), 2.0, Language::En), "parties");
    assert_eq!(format_unit(&unit("journal"), 2.0, Language::Fr), "journaux");
}
