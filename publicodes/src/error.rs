use crate::ast::Span;
use std::fmt;
use thiserror::Error;

/// Character-level diagnostic for a malformed inline expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionDiagnostic {
    pub span: Span,
    /// Token classes the parser would have accepted at `span`
    pub expected: Vec<String>,
    /// The text actually found at `span` (`None` at end of input)
    pub found: Option<String>,
}

impl fmt::Display for ExpressionDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}..{}", self.span.start, self.span.end)?;
        if !self.expected.is_empty() {
            write!(f, ", expected {}", self.expected.join(" or "))?;
        }
        match &self.found {
            Some(found) => write!(f, ", found \"{}\"", found),
            None => write!(f, ", found end of input"),
        }
    }
}

/// Errors produced by the inline expression parser
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("invalid expression \"{expression}\" {diagnostic}")]
    Invalid {
        expression: String,
        diagnostic: ExpressionDiagnostic,
    },

    #[error(
        "invalid expression \"{expression}\" {diagnostic}: operators must be surrounded by spaces"
    )]
    OperatorSpacing {
        expression: String,
        diagnostic: ExpressionDiagnostic,
    },

    #[error("expression \"{expression}\" is nested deeper than {limit} levels")]
    TooDeep { expression: String, limit: usize },
}

impl ExpressionError {
    pub fn diagnostic(&self) -> Option<&ExpressionDiagnostic> {
        match self {
            ExpressionError::Invalid { diagnostic, .. }
            | ExpressionError::OperatorSpacing { diagnostic, .. } => Some(diagnostic),
            ExpressionError::TooDeep { .. } => None,
        }
    }
}

/// Errors produced by the unit algebra
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("cannot convert unit \"{from}\" to \"{to}\"")]
    Incompatible { from: String, to: String },

    #[error("invalid unit \"{0}\"")]
    Invalid(String),
}

/// Error types for the rule engine
///
/// Every variant that relates to a rule carries the rule's dotted name so
/// the author of a rule set can locate the mistake.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Malformed expression or rule shape, raised while parsing
    #[error("Syntax error in rule \"{rule}\": {message}")]
    Syntax {
        rule: String,
        message: String,
        diagnostic: Option<ExpressionDiagnostic>,
    },

    /// Runtime type violation during evaluation
    #[error("Evaluation error in rule \"{rule}\": {message}")]
    Evaluation { rule: String, message: String },

    /// Invalid or inaccessible rule name in a situation assignment
    #[error("Situation error for \"{rule}\": {message}")]
    Situation { rule: String, message: String },

    /// Values of mismatched classes where one class is required
    #[error("Type error in rule \"{rule}\": {message}")]
    Type { rule: String, message: String },

    /// Runtime cycle, only raised when cycles are configured to be strict
    #[error("Circular reference: {}", cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    /// Broken internal invariant
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Create a syntax error without a character-level diagnostic
    pub fn syntax(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Syntax {
            rule: rule.into(),
            message: message.into(),
            diagnostic: None,
        }
    }

    /// Wrap an expression parser error for the rule that contains it
    pub fn expression(rule: impl Into<String>, error: ExpressionError) -> Self {
        Self::Syntax {
            rule: rule.into(),
            diagnostic: error.diagnostic().cloned(),
            message: error.to_string(),
        }
    }

    pub fn evaluation(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Evaluation {
            rule: rule.into(),
            message: message.into(),
        }
    }

    pub fn situation(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Situation {
            rule: rule.into(),
            message: message.into(),
        }
    }

    pub fn type_error(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Type {
            rule: rule.into(),
            message: message.into(),
        }
    }

    /// Dotted name of the rule the error relates to, if any
    pub fn rule(&self) -> Option<&str> {
        match self {
            EngineError::Syntax { rule, .. }
            | EngineError::Evaluation { rule, .. }
            | EngineError::Situation { rule, .. }
            | EngineError::Type { rule, .. } => Some(rule),
            EngineError::Cycle { cycle } => cycle.first().map(String::as_str),
            EngineError::Internal(_) => None,
        }
    }
}
