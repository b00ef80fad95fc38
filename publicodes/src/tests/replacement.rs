use super::Fixture;
use crate::replacement::ReplacementTable;
use crate::semantic::{NodeKind, NodeRef, ReplacementKind};
use crate::traversal::{visit, VisitAction};
use serde_json::json;

fn count_variations(node: &NodeRef) -> usize {
    let mut count = 0;
    visit(node, &mut |node| {
        if matches!(node.kind, NodeKind::Variations(_)) {
            count += 1;
        }
        VisitAction::Descend
    });
    count
}

fn rules() -> serde_json::Value {
    json!({
        "a": 1,
        "b": "a + 1",
        "e": "a * 2",
        "c": { "remplace": "a", "valeur": 10 },
        "d": { "remplace": { "références à": "a", "priorité": 2 }, "valeur": 20 },
        "f": { "rend non applicable": { "références à": "a", "dans": "g" }, "valeur": "oui" },
        "g": "a",
    })
}

#[test]
fn test_priority_then_declaring_rule() {
    let resolved = Fixture::new().resolve(rules());
    let table = ReplacementTable::new(&resolved);
    let order: Vec<&str> = table
        .applicable("a", "b")
        .iter()
        .map(|replacement| replacement.definition_rule.as_str())
        .collect();
    assert_eq!(order, vec!["d", "c"]);
}

#[test]
fn test_scoping() {
    let resolved = Fixture::new().resolve(rules());
    let table = ReplacementTable::new(&resolved);

    // A rule never sees its own replacement
    let in_c: Vec<&str> = table
        .applicable("a", "c")
        .iter()
        .map(|replacement| replacement.definition_rule.as_str())
        .collect();
    assert_eq!(in_c, vec!["d"]);

    // "dans" restricts f to references written in g
    let in_g = table.applicable("a", "g");
    assert_eq!(in_g.len(), 3);
    assert!(in_g
        .iter()
        .any(|replacement| replacement.kind == ReplacementKind::NotApplicable));
}

#[test]
fn test_replaced_references_become_variations() {
    let fixture = Fixture::new();
    let resolved = fixture.resolve(rules());
    let mut table = ReplacementTable::new(&resolved);

    let b = table.apply(&resolved["b"], &fixture.ids);
    assert_eq!(count_variations(&b), 1);
    let NodeKind::Rule(rule) = &b.kind else {
        panic!("expected a rule");
    };
    assert_eq!(rule.dotted_name, "b");

    // The rule declaring nothing replaced is left untouched
    let a = table.apply(&resolved["a"], &fixture.ids);
    assert!(std::sync::Arc::ptr_eq(&a, &resolved["a"]));
}

#[test]
fn test_compiled_variations_are_shared() {
    let fixture = Fixture::new();
    let resolved = fixture.resolve(rules());
    let mut table = ReplacementTable::new(&resolved);
    table.apply(&resolved["b"], &fixture.ids);
    table.apply(&resolved["e"], &fixture.ids);
    assert_eq!(table.compiled_count(), 1);
    table.apply(&resolved["g"], &fixture.ids);
    assert_eq!(table.compiled_count(), 2);
}
