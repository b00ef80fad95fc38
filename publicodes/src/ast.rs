//! AST infrastructure types
//!
//! This module contains metadata types used throughout the parser and evaluator:
//! - `Span` for tracking character ranges inside an inline expression
//! - `NodeId` for uniquely identifying AST nodes (the evaluation cache key)
//! - `NodeIdGenerator` for generating unique IDs during parsing and rewriting

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Character range inside an inline expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn from_pest_span(span: pest::Span) -> Self {
        Self {
            start: span.start(),
            end: span.end(),
        }
    }

    /// Slice of `source` covered by this span, clamped to the source bounds
    pub fn excerpt<'a>(&self, source: &'a str) -> &'a str {
        let end = self.end.min(source.len());
        let start = self.start.min(end);
        source.get(start..end).unwrap_or("")
    }
}

/// Unique identifier for each node in the AST
///
/// Nodes are immutable once published; a rewrite that changes a node's
/// children always produces a node with a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(u64);

impl NodeId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

/// Counter for generating unique node IDs
///
/// Shared by reference between the compiler and every engine derived from
/// the same rule set, so ad hoc expressions parsed at evaluation time never
/// collide with compiled nodes.
#[derive(Debug, Default)]
pub struct NodeIdGenerator {
    next_id: AtomicU64,
}

impl NodeIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> NodeId {
        NodeId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Clone for NodeIdGenerator {
    fn clone(&self) -> Self {
        Self {
            next_id: AtomicU64::new(self.next_id.load(Ordering::Relaxed)),
        }
    }
}
