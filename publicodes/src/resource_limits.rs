/// Resource limits keeping parsing and evaluation bounded
///
/// These limits protect against runaway inputs while being generous enough
/// for real rule sets.
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Maximum nesting depth of an inline expression
    /// Real usage: ~5 levels, Limit: 100
    pub max_expression_depth: usize,

    /// Maximum nesting of `contexte` sub-engines during one evaluation
    /// Real usage: 2-3 levels, Limit: 32
    pub max_context_depth: usize,

    /// Maximum number of rules in one engine
    pub max_rules: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_expression_depth: 100,
            max_context_depth: 32,
            max_rules: 100_000,
        }
    }
}

impl ResourceLimits {
    /// Create a new ResourceLimits with default values
    pub fn new() -> Self {
        Self::default()
    }
}
