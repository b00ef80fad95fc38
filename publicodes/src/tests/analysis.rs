use crate::analysis::DependencyGraph;
use std::collections::BTreeSet;

fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for (rule, references) in edges {
        graph.set_references(rule, references.iter().map(|r| r.to_string()).collect());
    }
    graph
}

#[test]
fn test_reference_maps_are_bidirectional() {
    let graph = graph(&[("net", &["brut", "taux"]), ("affiché", &["net"])]);
    assert_eq!(graph.references_in("net").collect::<Vec<_>>(), vec!["brut", "taux"]);
    assert_eq!(graph.rules_that_use("brut").collect::<Vec<_>>(), vec!["net"]);
    assert_eq!(graph.rules_that_use("affiché").count(), 0);
}

#[test]
fn test_set_references_replaces_previous_edges() {
    let mut graph = graph(&[("net", &["brut"])]);
    graph.set_references("net", BTreeSet::from(["taux".to_string()]));
    assert_eq!(graph.rules_that_use("brut").count(), 0);
    assert_eq!(graph.rules_that_use("taux").collect::<Vec<_>>(), vec!["net"]);
}

#[test]
fn test_transitive_users() {
    let graph = graph(&[("net", &["brut"]), ("affiché", &["net"]), ("autre", &["taux"])]);
    let users = graph.transitive_users(["brut"]);
    assert_eq!(
        users,
        BTreeSet::from(["brut".to_string(), "net".to_string(), "affiché".to_string()])
    );
}

#[test]
fn test_no_cycles() {
    let graph = graph(&[("a", &["b"]), ("b", &["c"])]);
    assert!(graph.find_cycles().is_empty());
}

#[test]
fn test_minimal_cycle() {
    let graph = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"]), ("d", &["a"])]);
    let cycles = graph.find_cycles();
    assert_eq!(cycles.len(), 1);
    let cycle = &cycles[0];
    assert_eq!(cycle.first(), cycle.last());
    assert_eq!(cycle.len(), 4);
    assert!(!cycle.contains(&"d".to_string()));
}

#[test]
fn test_shortest_cycle_within_a_component() {
    // a -> b -> c -> a and a -> c -> a share a component; the short one is kept
    let graph = graph(&[("a", &["b", "c"]), ("b", &["c"]), ("c", &["a"])]);
    let cycles = graph.find_cycles();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].len(), 3);
}

#[test]
fn test_self_reference_is_a_cycle() {
    let graph = graph(&[("a", &["a"])]);
    assert_eq!(graph.find_cycles(), vec![vec!["a".to_string(), "a".to_string()]]);
}
