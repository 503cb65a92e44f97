//! Solver interface for OSQP solver
//!
//! OSQP takes problems as `min ½xᵀPx + qᵀx` subject to `l <= Ax <= u`, so each
//! constraint maps to a single row, and each variable gets an identity row carrying
//! its bounds.
use std::borrow::Cow;

use ::osqp::{CscMatrix as OsqpCsc, Problem as OsqpProblem, Settings, Status};
use nalgebra_sparse::{CooMatrix, CscMatrix};

use crate::optimize::problem::Problem;
use crate::optimize::solvers::{clamp_bound, Solver, SolverOptions};
use crate::optimize::constraint::Constraint;
use crate::optimize::{OptimizationStatus, ProblemSolution};

/// Continuous QP backend using the OSQP operator splitting solver
///
/// Binary and integer variables are relaxed to their bounds.
#[derive(Clone, Debug, Default)]
pub struct OsqpSolver {}

impl OsqpSolver {
    pub fn new() -> Self {
        OsqpSolver {}
    }
}

impl Solver for OsqpSolver {
    fn solve(&self, problem: &Problem, options: &SolverOptions) -> ProblemSolution {
        let n = problem.num_variables();
        let m = problem.num_constraints() + n;
        let (p, q) = problem.objective_matrices();

        let mut a = CooMatrix::new(m, n);
        let mut lower = Vec::with_capacity(m);
        let mut upper = Vec::with_capacity(m);
        for (row, constraint) in problem.constraints().enumerate() {
            for term in constraint.terms() {
                a.push(row, term.variable, term.coefficient);
            }
            let (l, u) = match *constraint {
                Constraint::Equality { equals, .. } => (equals, equals),
                Constraint::Inequality {
                    lower_bound,
                    upper_bound,
                    ..
                } => (lower_bound, upper_bound),
            };
            lower.push(clamp_bound(l));
            upper.push(clamp_bound(u));
        }
        let offset = problem.num_constraints();
        for var in problem.variables() {
            a.push(offset + var.index(), var.index(), 1.);
            lower.push(clamp_bound(var.lower_bound));
            upper.push(clamp_bound(var.upper_bound));
        }

        let settings = Settings::default()
            .verbose(options.verbose)
            .polish(true)
            .eps_abs(1e-7)
            .eps_rel(1e-7)
            .time_limit(options.time_limit);
        let mut osqp_problem = match OsqpProblem::new(
            to_osqp(p),
            &q,
            to_osqp(CscMatrix::from(&a)),
            &lower,
            &upper,
            &settings,
        ) {
            Ok(prob) => prob,
            Err(_) => return ProblemSolution::failed(OptimizationStatus::Error),
        };

        match osqp_problem.solve() {
            Status::Solved(solution) | Status::SolvedInaccurate(solution) => {
                let values = solution.x().to_vec();
                ProblemSolution {
                    status: OptimizationStatus::Optimal,
                    objective_value: Some(problem.objective_value(&values)),
                    variable_values: Some(values),
                }
            }
            Status::PrimalInfeasible(_) | Status::PrimalInfeasibleInaccurate(_) => {
                ProblemSolution::failed(OptimizationStatus::Infeasible)
            }
            Status::DualInfeasible(_) | Status::DualInfeasibleInaccurate(_) => {
                ProblemSolution::failed(OptimizationStatus::Unbounded)
            }
            Status::TimeLimitReached(_) => ProblemSolution::failed(OptimizationStatus::TimedOut),
            _ => ProblemSolution::failed(OptimizationStatus::Error),
        }
    }
}

fn to_osqp(matrix: CscMatrix<f64>) -> OsqpCsc<'static> {
    let (nrows, ncols) = (matrix.nrows(), matrix.ncols());
    let (indptr, indices, data) = matrix.disassemble();
    OsqpCsc {
        nrows,
        ncols,
        indptr: Cow::Owned(indptr),
        indices: Cow::Owned(indices),
        data: Cow::Owned(data),
    }
}
