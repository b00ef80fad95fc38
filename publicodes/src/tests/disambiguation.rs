use super::Fixture;
use crate::disambiguation::{candidates, references_of, resolve_name, ResolutionError};
use crate::error::EngineError;
use crate::parser::ParsedRules;
use crate::semantic::situation_name;
use serde_json::json;

fn rules() -> ParsedRules {
    Fixture::new().parse(json!({
        "contrat": null,
        "contrat . salaire": 1000,
        "contrat . salaire . brut": 1200,
        "contrat . cotisations": { "privé": "oui", "valeur": 100 },
        "contrat . cotisations . taux": 0.1,
        "salaire": 10,
        "entreprise": null,
        "entreprise . effectif": { "privé": "oui", "valeur": 12 },
    }))
}

#[test]
fn test_candidates_walk_up_the_namespaces() {
    assert_eq!(
        candidates("salaire", "contrat . cotisations"),
        vec![
            "contrat . cotisations . salaire".to_string(),
            "contrat . salaire".to_string(),
            "salaire".to_string(),
        ]
    );
}

#[test]
fn test_nearest_match_wins() {
    let rules = rules();
    assert_eq!(
        resolve_name("salaire", "contrat . cotisations", &rules).unwrap(),
        "contrat . salaire"
    );
    assert_eq!(resolve_name("salaire", "entreprise", &rules).unwrap(), "salaire");
    assert_eq!(
        resolve_name("contrat . salaire . brut", "", &rules).unwrap(),
        "contrat . salaire . brut"
    );
}

#[test]
fn test_parent_escape() {
    let rules = rules();
    // `^` starts the lookup one namespace up
    assert_eq!(
        resolve_name("^ . cotisations", "contrat . salaire . brut", &rules).unwrap(),
        "contrat . cotisations"
    );
}

#[test]
fn test_self_reference_comes_last() {
    let rules = rules();
    assert_eq!(
        resolve_name("salaire", "contrat . salaire", &rules).unwrap(),
        "salaire"
    );
    assert_eq!(
        resolve_name("brut", "contrat . salaire . brut", &rules).unwrap(),
        "contrat . salaire . brut"
    );
}

#[test]
fn test_private_rules_are_visible_to_siblings_and_children() {
    let rules = rules();
    assert_eq!(
        resolve_name("cotisations", "contrat . salaire", &rules).unwrap(),
        "contrat . cotisations"
    );
    assert_eq!(
        resolve_name("cotisations", "contrat . cotisations . taux", &rules).unwrap(),
        "contrat . cotisations"
    );
}

#[test]
fn test_private_rules_are_hidden_from_cousins() {
    let rules = rules();
    let error = resolve_name("entreprise . effectif", "contrat . salaire", &rules).unwrap_err();
    assert_eq!(
        error,
        ResolutionError::Inaccessible {
            target: "entreprise . effectif".to_string(),
            context: "contrat . salaire".to_string(),
        }
    );
    // Below a private rule, everything is hidden too
    let error = resolve_name("contrat . cotisations . taux", "entreprise", &rules).unwrap_err();
    assert!(matches!(error, ResolutionError::Inaccessible { .. }));
}

#[test]
fn test_unknown_name() {
    let rules = rules();
    let error = resolve_name("prime", "contrat", &rules).unwrap_err();
    assert_eq!(
        error,
        ResolutionError::NotFound {
            name: "prime".to_string()
        }
    );
}

#[test]
fn test_resolved_rules_record_parents_and_references() {
    let fixture = Fixture::new();
    let rules = fixture.resolve(json!({
        "contrat": "oui",
        "contrat . salaire": "brut - cotisations",
        "contrat . salaire . brut": 1200,
        "contrat . salaire . cotisations": "brut * 10%",
    }));

    let salaire = &rules["contrat . salaire"];
    let rule = salaire.as_rule().unwrap();
    assert_eq!(rule.parents.len(), 1);
    assert_eq!(
        rule.parents[0].as_reference().unwrap().dotted_name.as_deref(),
        Some("contrat")
    );

    let references: Vec<String> = references_of(salaire).into_iter().collect();
    assert_eq!(
        references,
        vec![
            "contrat . salaire . brut".to_string(),
            "contrat . salaire . cotisations".to_string(),
        ]
    );
    // The seam of the rule itself is not a dependency
    assert!(!references.contains(&situation_name("contrat . salaire")));
}

#[test]
fn test_unresolvable_reference_is_a_syntax_error() {
    let fixture = Fixture::new();
    let written = fixture.parse(json!({ "a": "b + 1" }));
    let error = crate::disambiguation::disambiguate_rule(&written["a"], &written, &fixture.ids)
        .unwrap_err();
    assert!(matches!(error, EngineError::Syntax { ref rule, .. } if rule == "a"));
    assert!(error.to_string().contains("unknown rule \"b\""), "{}", error);
}
