//! Solver backends for [`Problem`](crate::optimize::problem::Problem)s
//!
//! The continuous backends ([`clarabel::ClarabelSolver`], and
//! [`osqp::OsqpSolver`] with the `osqp` feature) solve linear and quadratic programs
//! with continuous variables. Problems with binary or integer variables are solved by
//! wrapping one of them in [`branch_bound::BranchAndBound`], or natively by SCIP
//! with the `scip` feature.
use std::time::Duration;

use cfg_if::cfg_if;

use crate::configuration::{read_configuration, Solver as ConfiguredSolver};
use crate::optimize::problem::Problem;
use crate::optimize::ProblemSolution;
use self::branch_bound::BranchAndBound;
use self::clarabel::ClarabelSolver;

pub mod branch_bound;
pub mod clarabel;
#[cfg(feature = "osqp")]
pub mod osqp;
#[cfg(feature = "scip")]
pub mod scip;

/// Value beyond which a bound is treated as infinite by the backends
pub(crate) const INFINITE_BOUND: f64 = 1e30;

/// A backend able to solve an optimization problem
///
/// Solving never fails with an error: anything other than an optimal solution is
/// reported through [`ProblemSolution::status`].
pub trait Solver: Send + Sync {
    /// Solve `problem`, leaving it unchanged
    fn solve(&self, problem: &Problem, options: &SolverOptions) -> ProblemSolution;
}

impl<S: Solver + ?Sized> Solver for Box<S> {
    fn solve(&self, problem: &Problem, options: &SolverOptions) -> ProblemSolution {
        (**self).solve(problem, options)
    }
}

/// Options for a single solve
#[derive(Clone, Debug, PartialEq)]
pub struct SolverOptions {
    /// Wall clock limit for the solve, None for no limit
    pub time_limit: Option<Duration>,
    /// Number of workers the solver may use, 0 lets the solver decide and 1 forces a
    /// sequential solve
    pub num_workers: usize,
    /// Whether the backend should print its own progress
    pub verbose: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            time_limit: None,
            num_workers: read_configuration(|c| c.processes as usize),
            verbose: false,
        }
    }
}

/// Mixed integer capable solver for the configured backend
///
/// Continuous backends are wrapped in [`BranchAndBound`]. A backend whose feature is not
/// enabled falls back to Clarabel with a warning.
pub fn default_solver() -> Box<dyn Solver> {
    match read_configuration(|c| c.solver) {
        ConfiguredSolver::Clarabel => Box::new(BranchAndBound::new(ClarabelSolver::new())),
        ConfiguredSolver::Osqp => osqp_solver(),
        ConfiguredSolver::Scip => scip_solver(),
    }
}

cfg_if! {
    if #[cfg(feature = "osqp")] {
        fn osqp_solver() -> Box<dyn Solver> {
            Box::new(BranchAndBound::new(self::osqp::OsqpSolver::new()))
        }
    } else {
        fn osqp_solver() -> Box<dyn Solver> {
            log::warn!("OSQP requested but the osqp feature is not enabled, using Clarabel");
            Box::new(BranchAndBound::new(ClarabelSolver::new()))
        }
    }
}

cfg_if! {
    if #[cfg(feature = "scip")] {
        fn scip_solver() -> Box<dyn Solver> {
            Box::new(self::scip::RusscipSolver::new())
        }
    } else {
        fn scip_solver() -> Box<dyn Solver> {
            log::warn!("SCIP requested but the scip feature is not enabled, using Clarabel");
            Box::new(BranchAndBound::new(ClarabelSolver::new()))
        }
    }
}

/// Convert a bound to a finite value the backends understand
pub(crate) fn clamp_bound(bound: f64) -> f64 {
    bound.clamp(-INFINITE_BOUND, INFINITE_BOUND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::variable::VariableType;
    use crate::optimize::OptimizationStatus;

    fn binary_switch() -> Problem {
        // minimize (x - 0.7)^2 + 0.1*(1 - y) with x <= y
        let mut problem = Problem::new_minimization();
        let x = problem
            .add_new_variable("x", None, VariableType::Continuous, 0., 10.)
            .unwrap();
        let y = problem
            .add_new_variable("y", None, VariableType::Binary, 0., 1.)
            .unwrap();
        problem
            .add_new_inequality_constraint("x_le_y", &[x, y], &[1., -1.], f64::NEG_INFINITY, 0.)
            .unwrap();
        problem.add_new_quadratic_objective_term(x, x, 1.).unwrap();
        problem.add_new_linear_objective_term(x, -1.4).unwrap();
        problem.add_new_linear_objective_term(y, -0.1).unwrap();
        problem
    }

    fn assert_switch_solution(solution: ProblemSolution) {
        assert_eq!(solution.status, OptimizationStatus::Optimal);
        let values = solution.variable_values.unwrap();
        assert!((values[0] - 0.7).abs() < 1e-3);
        assert!((values[1] - 1.).abs() < 1e-3);
    }

    #[test]
    fn default_solver_handles_binaries() {
        let solution = default_solver().solve(&binary_switch(), &SolverOptions::default());
        assert_switch_solution(solution);
    }

    #[test]
    fn every_backend_choice_handles_binaries() {
        // Backends without their feature fall back to Clarabel
        for solver in [osqp_solver(), scip_solver()] {
            let solution = solver.solve(&binary_switch(), &SolverOptions::default());
            assert_switch_solution(solution);
        }
    }

    #[test]
    fn clamp() {
        assert_eq!(clamp_bound(f64::INFINITY), INFINITE_BOUND);
        assert_eq!(clamp_bound(f64::NEG_INFINITY), -INFINITE_BOUND);
        assert_eq!(clamp_bound(-3.), -3.);
    }
}
