use crate::logger::{Logger, TracingLogger};
use crate::resource_limits::ResourceLimits;
use crate::units::{UnitNormalizer, UnitTable};
use std::fmt;
use std::sync::Arc;

/// Settings of the root finder used by inversion and circular-reference resolution
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
    /// Maximum number of bracketed iterations after the two blind probes
    pub max_iterations: usize,
    /// Accepted distance between f(x) and the goal
    pub tolerance: f64,
    /// Lowest acceptable solution
    pub min: f64,
    /// Highest acceptable solution
    pub max: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            tolerance: 1e-4,
            min: -1e9,
            max: 1e9,
        }
    }
}

/// Engine configuration
#[derive(Clone)]
pub struct EngineOptions {
    pub logger: Arc<dyn Logger>,
    pub unit_normalizer: Option<UnitNormalizer>,
    pub unit_table: UnitTable,
    pub solver: SolverOptions,
    /// Raise `EngineError::Cycle` instead of logging a warning
    pub strict_cycles: bool,
    /// Attach the set of rules touched to every evaluated rule
    pub track_traversed_variables: bool,
    pub limits: ResourceLimits,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            logger: Arc::new(TracingLogger),
            unit_normalizer: None,
            unit_table: UnitTable::default(),
            solver: SolverOptions::default(),
            strict_cycles: false,
            track_traversed_variables: true,
            limits: ResourceLimits::default(),
        }
    }
}

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_unit_normalizer(
        mut self,
        normalizer: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.unit_normalizer = Some(Arc::new(normalizer));
        self
    }

    pub fn with_unit_table(mut self, table: UnitTable) -> Self {
        self.unit_table = table;
        self
    }

    pub fn with_solver(mut self, solver: SolverOptions) -> Self {
        self.solver = solver;
        self
    }

    /// Override the iteration budget of inversion and fixed-point solving
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.solver.max_iterations = max_iterations;
        self
    }

    pub fn with_strict_cycles(mut self, strict: bool) -> Self {
        self.strict_cycles = strict;
        self
    }

    pub fn with_traversed_variables(mut self, track: bool) -> Self {
        self.track_traversed_variables = track;
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("unit_normalizer", &self.unit_normalizer.is_some())
            .field("unit_table", &self.unit_table)
            .field("solver", &self.solver)
            .field("strict_cycles", &self.strict_cycles)
            .field("track_traversed_variables", &self.track_traversed_variables)
            .field("limits", &self.limits)
            .finish()
    }
}

/// Options of `Engine::set_situation`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SituationOptions {
    /// Layer the new entries over the current situation instead of replacing it
    pub keep_previous_situation: bool,
    /// Raise on invalid entries instead of logging and dropping them
    pub strict: bool,
}

impl Default for SituationOptions {
    fn default() -> Self {
        Self {
            keep_previous_situation: false,
            strict: true,
        }
    }
}

impl SituationOptions {
    pub fn keep_previous() -> Self {
        Self {
            keep_previous_situation: true,
            ..Self::default()
        }
    }

    pub fn lenient() -> Self {
        Self {
            strict: false,
            ..Self::default()
        }
    }
}
