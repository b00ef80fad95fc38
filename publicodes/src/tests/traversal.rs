use super::Fixture;
use crate::semantic::{LiteralValue, Node, NodeKind, NodeRef, Operator};
use crate::traversal::{children, reduce, transform, visit, Transform, VisitAction};
use std::ops::ControlFlow;
use std::sync::Arc;

/// (1 + 2) * x
fn expression(fixture: &Fixture) -> NodeRef {
    let ids = &fixture.ids;
    Node::operation(
        Operator::Multiply,
        Node::operation(
            Operator::Add,
            Node::number(1.0, None, ids),
            Node::number(2.0, None, ids),
            ids,
        ),
        Node::reference("x", "", ids),
        ids,
    )
}

#[test]
fn test_children_of_an_operation() {
    let fixture = Fixture::new();
    let node = expression(&fixture);
    assert_eq!(children(&node).len(), 2);
}

#[test]
fn test_visit_skip() {
    let fixture = Fixture::new();
    let node = expression(&fixture);
    let mut visited = 0;
    visit(&node, &mut |node| {
        visited += 1;
        if matches!(node.kind, NodeKind::Operation(ref o) if o.operator == Operator::Add) {
            VisitAction::Skip
        } else {
            VisitAction::Descend
        }
    });
    // root, the skipped addition, x
    assert_eq!(visited, 3);
}

#[test]
fn test_reduce_sums_constants() {
    let fixture = Fixture::new();
    let node = expression(&fixture);
    let total = reduce(
        &node,
        &mut |acc: f64, node: &NodeRef| match &node.kind {
            NodeKind::Constant(constant) => match constant.value.value() {
                Some(LiteralValue::Number(n)) => ControlFlow::Break(acc + n),
                _ => ControlFlow::Break(acc),
            },
            _ => ControlFlow::Continue(acc),
        },
        0.0,
    );
    assert_eq!(total, 3.0);
}

#[test]
fn test_transform_keeps_identity_of_untouched_subtrees() {
    let fixture = Fixture::new();
    let node = expression(&fixture);
    let unchanged = transform(&node, &mut |_| Transform::Descend, &fixture.ids);
    assert!(Arc::ptr_eq(&unchanged, &node));
}

#[test]
fn test_transform_replaces_and_rebuilds_parents() {
    let fixture = Fixture::new();
    let node = expression(&fixture);
    let replaced = transform(
        &node,
        &mut |node| match node.kind {
            NodeKind::Reference(_) => Transform::Replace(Node::number(4.0, None, &fixture.ids)),
            _ => Transform::Descend,
        },
        &fixture.ids,
    );
    assert!(!Arc::ptr_eq(&replaced, &node));
    assert_ne!(replaced.id, node.id);

    let NodeKind::Operation(root) = &replaced.kind else {
        panic!("expected an operation");
    };
    // The addition was not touched
    let NodeKind::Operation(original) = &node.kind else {
        unreachable!()
    };
    assert!(Arc::ptr_eq(&root.left, &original.left));
    assert!(matches!(root.right.kind, NodeKind::Constant(_)));
}

#[test]
fn test_transform_keep_stops_descent() {
    let fixture = Fixture::new();
    let node = expression(&fixture);
    let mut seen = 0;
    let kept = transform(
        &node,
        &mut |_| {
            seen += 1;
            Transform::Keep
        },
        &fixture.ids,
    );
    assert_eq!(seen, 1);
    assert!(Arc::ptr_eq(&kept, &node));
}
