//! # Publicodes Engine
//!
//! **Rules for computing public policies, with missing inputs explained**
//!
//! A rule map declares named rules (formulas, conditions, tax schedules,
//! unit-typed quantities). The engine compiles it once, then evaluates
//! expressions against a partial assignment of values, the *situation*.
//! Every result says which inputs are still missing to compute it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use publicodes::{Engine, EngineResult, SituationOptions};
//! use serde_json::json;
//!
//! fn main() -> EngineResult<()> {
//!     let mut engine = Engine::new(json!({
//!         "salaire brut": { "unité": "€/mois" },
//!         "salaire net": "salaire brut * 77%",
//!     }))?;
//!
//!     let net = engine.evaluate("salaire net")?;
//!     assert!(net.is_undefined());
//!     assert!(net.missing_variables.contains("salaire brut"));
//!
//!     engine.set_situation([("salaire brut", 3000.0)], SituationOptions::default())?;
//!     let net = engine.evaluate("salaire net")?;
//!     assert_eq!(net.as_number(), Some(2310.0));
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Rules
//! A rule is a dotted name (`contrat . salaire brut`) bound to a value: an
//! inline expression, a mechanism (`somme`, `barème`, `variations`, ...) or
//! nothing, in which case it is an input.
//!
//! ### Three-valued results
//! A result is a value, *not applicable* (the quantity does not apply, written
//! `null`) or *undefined* (not known yet). Undefined results list the
//! missing inputs with a weight: the lower the weight, the more directly the
//! input matters.
//!
//! ### Units
//! Numbers carry units (`€/mois`, `%`, `jour`). Units propagate through
//! operations and convert when compatible.

pub mod analysis;
pub mod ast;
pub mod disambiguation;
pub mod engine;
pub mod error;
pub mod evaluated;
pub mod evaluator;
pub mod inference;
pub mod inversion;
pub mod logger;
pub mod options;
pub mod parser;
pub mod replacement;
pub mod resource_limits;
pub mod semantic;
pub mod traversal;
pub mod units;

pub use ast::{NodeId, NodeIdGenerator, Span};
pub use engine::{Context, Engine, Expression, SituationValue};
pub use error::{EngineError, ExpressionDiagnostic, ExpressionError, UnitError};
pub use evaluated::{EvaluatedNode, MissingVariables, NodeValue};
pub use inference::InferredType;
pub use logger::{LogLevel, Logger, MemoryLogger, TracingLogger};
pub use options::{EngineOptions, SituationOptions, SolverOptions};
pub use parser::{parse_expression, ExprAst, ParsedRules};
pub use resource_limits::ResourceLimits;
pub use semantic::{LiteralValue, Node, NodeKind, NodeRef, RuleNode, ValueType};
pub use units::{Language, Unit, UnitTable};

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests;
