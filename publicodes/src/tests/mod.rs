// Parser tests
mod expression_parsing;

// Compilation passes
mod analysis;
mod disambiguation;
mod inference;
mod replacement;
mod traversal;

// Unit algebra
mod units;

// Evaluator
mod operations;

use crate::ast::NodeIdGenerator;
use crate::disambiguation::disambiguate_rule;
use crate::parser::{parse_rules, ParseContext, ParsedRules};
use crate::resource_limits::ResourceLimits;
use crate::units::UnitTable;
use serde_json::Value;

/// Parse settings owned by a test
pub(crate) struct Fixture {
    pub ids: NodeIdGenerator,
    pub table: UnitTable,
    pub limits: ResourceLimits,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            ids: NodeIdGenerator::new(),
            table: UnitTable::default(),
            limits: ResourceLimits::default(),
        }
    }

    pub fn settings<'a>(&'a self, rule: &'a str) -> ParseContext<'a> {
        ParseContext::new(rule, &self.ids, None, &self.table, &self.limits)
    }

    pub fn parse(&self, raw: Value) -> ParsedRules {
        parse_rules(&raw, &ParsedRules::new(), &self.settings("")).unwrap()
    }

    /// Parse, then bind every reference
    pub fn resolve(&self, raw: Value) -> ParsedRules {
        let written = self.parse(raw);
        written
            .iter()
            .map(|(name, rule)| {
                (
                    name.clone(),
                    disambiguate_rule(rule, &written, &self.ids).unwrap(),
                )
            })
            .collect()
    }
}
