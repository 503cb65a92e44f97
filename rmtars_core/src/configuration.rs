//! Process wide defaults shared by model construction and the optimization backends
use std::sync::{LazyLock, RwLock};

pub static CONFIGURATION: LazyLock<RwLock<Configuration>> =
    LazyLock::new(|| RwLock::new(Configuration::default()));

pub struct Configuration {
    /// Lower bound given to reactions built without an explicit one
    pub lower_bound: f64,
    /// Upper bound given to reactions built without an explicit one
    pub upper_bound: f64,
    /// Integrality tolerance of branch and bound, and the feasibility tolerance handed to SCIP
    pub tolerance: f64,
    /// Backend used by [`crate::optimize::solvers::default_solver`]
    pub solver: Solver,
    /// Default number of workers handed to the solvers (0 lets the solver decide)
    pub processes: u32,
    /// Maximum number of branch and bound nodes explored for a single mixed integer solve
    pub node_limit: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            lower_bound: -1000.,
            upper_bound: 1000.,
            tolerance: 1e-07,
            solver: Solver::Clarabel,
            processes: 0,
            node_limit: 100_000,
        }
    }
}

/// Read a value out of the global configuration, falling back to the default
/// configuration if the lock has been poisoned
pub(crate) fn read_configuration<T>(f: impl Fn(&Configuration) -> T) -> T {
    match CONFIGURATION.read() {
        Ok(config) => f(&config),
        Err(_) => f(&Configuration::default()),
    }
}

/// Enum used to specify the default solver to use
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Solver {
    /// Use the Clarabel interior point solver
    Clarabel,
    /// Use the OSQP Quadratic Program Solver, requires the osqp feature to be enabled
    Osqp,
    /// Use SCIP for mixed integer problems, requires the scip feature to be enabled
    Scip,
}
