//! Rule set parsing
//!
//! - `expressions` parses inline expressions with the pest grammar in
//!   `expression.pest` and lowers them into nodes
//! - `literals` converts raw JSON scalars into values
//! - `mechanisms` holds the closed mechanism registry and the chainable
//!   composition order
//! - `rules` parses rule definitions into `RuleNode`s

use crate::ast::NodeIdGenerator;
use crate::resource_limits::ResourceLimits;
use crate::semantic::join_name;
use crate::units::{UnitNormalizer, UnitTable};
use pest_derive::Parser;

pub mod expressions;
pub mod literals;
pub mod mechanisms;
pub mod rules;

pub use expressions::{parse_expression, ExprAst};
pub use rules::{parse_rules, ParsedRules};

#[derive(Parser)]
#[grammar = "src/parser/expression.pest"]
pub struct ExpressionParser;

/// State threaded through the parsing of one rule definition
#[derive(Clone, Copy)]
pub struct ParseContext<'a> {
    /// Rule being parsed; references written in it are resolved from here
    pub dotted_name: &'a str,
    pub ids: &'a NodeIdGenerator,
    pub unit_normalizer: Option<&'a UnitNormalizer>,
    pub unit_table: &'a UnitTable,
    pub limits: &'a ResourceLimits,
}

impl<'a> ParseContext<'a> {
    pub fn new(
        dotted_name: &'a str,
        ids: &'a NodeIdGenerator,
        unit_normalizer: Option<&'a UnitNormalizer>,
        unit_table: &'a UnitTable,
        limits: &'a ResourceLimits,
    ) -> Self {
        Self {
            dotted_name,
            ids,
            unit_normalizer,
            unit_table,
            limits,
        }
    }

    /// Same settings, parsing inside another rule
    pub fn with_rule<'b>(&self, dotted_name: &'b str) -> ParseContext<'b>
    where
        'a: 'b,
    {
        ParseContext {
            dotted_name,
            ids: self.ids,
            unit_normalizer: self.unit_normalizer,
            unit_table: self.unit_table,
            limits: self.limits,
        }
    }

    /// Name of a child rule of the current one
    pub fn child_name(&self, leaf: &str) -> String {
        join_name(self.dotted_name, leaf)
    }
}
