//! Implements a solver interface for Clarabel
//!
//! Clarabel solves `min ½xᵀPx + qᵀx` subject to `Ax + s = b`, `s ∈ K`. Equality
//! constraints and fixed variables go into the zero cone, every finite side of an
//! inequality constraint or variable bound becomes a row of the nonnegative cone.
use ::clarabel::algebra::CscMatrix as ClarabelCsc;
use ::clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT,
};
use nalgebra_sparse::{CooMatrix, CscMatrix};

use crate::optimize::constraint::Constraint;
use crate::optimize::problem::Problem;
use crate::optimize::solvers::{Solver, SolverOptions, INFINITE_BOUND};
use crate::optimize::{OptimizationStatus, ProblemSolution};

/// Continuous QP backend using the Clarabel interior point solver
///
/// Binary and integer variables are relaxed to their bounds.
#[derive(Clone, Debug, Default)]
pub struct ClarabelSolver {}

impl ClarabelSolver {
    pub fn new() -> Self {
        ClarabelSolver {}
    }
}

impl Solver for ClarabelSolver {
    fn solve(&self, problem: &Problem, options: &SolverOptions) -> ProblemSolution {
        let (p, q) = problem.objective_matrices();
        let rows = ConeRows::from_problem(problem);
        let (a, b, cones) = rows.assemble(problem.num_variables());

        let time_limit = options
            .time_limit
            .map(|d| d.as_secs_f64())
            .unwrap_or(f64::INFINITY);
        let settings = match DefaultSettingsBuilder::default()
            .verbose(options.verbose)
            .time_limit(time_limit)
            .build()
        {
            Ok(settings) => settings,
            Err(_) => return ProblemSolution::failed(OptimizationStatus::Error),
        };

        let mut solver = DefaultSolver::new(&to_clarabel(p), &q, &to_clarabel(a), &b, &cones, settings);
        solver.solve();

        let status = convert_status(solver.solution.status);
        if status != OptimizationStatus::Optimal {
            return ProblemSolution::failed(status);
        }
        let values = solver.solution.x.clone();
        ProblemSolution {
            status,
            objective_value: Some(problem.objective_value(&values)),
            variable_values: Some(values),
        }
    }
}

fn convert_status(status: SolverStatus) -> OptimizationStatus {
    match status {
        SolverStatus::Solved | SolverStatus::AlmostSolved => OptimizationStatus::Optimal,
        SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
            OptimizationStatus::Infeasible
        }
        SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
            OptimizationStatus::Unbounded
        }
        SolverStatus::MaxTime => OptimizationStatus::TimedOut,
        _ => OptimizationStatus::Error,
    }
}

fn to_clarabel(matrix: CscMatrix<f64>) -> ClarabelCsc<f64> {
    let (nrows, ncols) = (matrix.nrows(), matrix.ncols());
    let (col_offsets, row_indices, values) = matrix.disassemble();
    ClarabelCsc::new(nrows, ncols, col_offsets, row_indices, values)
}

/// A sparse row `coefficients·x` paired with its right hand side
type Row = (Vec<(usize, f64)>, f64);

/// Constraint rows sorted into the two cones
#[derive(Default)]
struct ConeRows {
    zero: Vec<Row>,
    nonnegative: Vec<Row>,
}

impl ConeRows {
    fn from_problem(problem: &Problem) -> Self {
        let mut rows = ConeRows::default();
        for constraint in problem.constraints() {
            let terms: Vec<(usize, f64)> = constraint
                .terms()
                .iter()
                .map(|t| (t.variable, t.coefficient))
                .collect();
            match *constraint {
                Constraint::Equality { equals, .. } => rows.zero.push((terms, equals)),
                Constraint::Inequality {
                    lower_bound,
                    upper_bound,
                    ..
                } => rows.push_range(terms, lower_bound, upper_bound),
            }
        }
        for var in problem.variables() {
            rows.push_range(vec![(var.index(), 1.)], var.lower_bound, var.upper_bound);
        }
        rows
    }

    /// Add `lower <= terms <= upper`, dropping infinite sides
    fn push_range(&mut self, terms: Vec<(usize, f64)>, lower: f64, upper: f64) {
        if lower == upper && lower.abs() < INFINITE_BOUND {
            self.zero.push((terms, upper));
            return;
        }
        if lower > -INFINITE_BOUND {
            let negated = terms.iter().map(|&(i, c)| (i, -c)).collect();
            self.nonnegative.push((negated, -lower));
        }
        if upper < INFINITE_BOUND {
            self.nonnegative.push((terms, upper));
        }
    }

    fn assemble(self, num_variables: usize) -> (CscMatrix<f64>, Vec<f64>, Vec<SupportedConeT<f64>>) {
        let num_zero = self.zero.len();
        let num_nonnegative = self.nonnegative.len();
        let mut a = CooMatrix::new(num_zero + num_nonnegative, num_variables);
        let mut b = Vec::with_capacity(num_zero + num_nonnegative);
        for (row, (terms, rhs)) in self.zero.into_iter().chain(self.nonnegative).enumerate() {
            for (col, coef) in terms {
                a.push(row, col, coef);
            }
            b.push(rhs);
        }
        let mut cones = Vec::new();
        if num_zero > 0 {
            cones.push(SupportedConeT::ZeroConeT(num_zero));
        }
        if num_nonnegative > 0 {
            cones.push(SupportedConeT::NonnegativeConeT(num_nonnegative));
        }
        (CscMatrix::from(&a), b, cones)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::variable::VariableType;

    fn projection_problem() -> Problem {
        // minimize (x - 3)^2 + (y + 1)^2 subject to x + y = 1, 0 <= x <= 1.5
        let mut problem = Problem::new_minimization();
        let x = problem
            .add_new_variable("x", None, VariableType::Continuous, 0., 1.5)
            .unwrap();
        let y = problem
            .add_new_variable("y", None, VariableType::Continuous, f64::NEG_INFINITY, f64::INFINITY)
            .unwrap();
        problem
            .add_new_equality_constraint("sum", &[x, y], &[1., 1.], 1.)
            .unwrap();
        problem.add_new_quadratic_objective_term(x, x, 1.).unwrap();
        problem.add_new_quadratic_objective_term(y, y, 1.).unwrap();
        problem.add_new_linear_objective_term(x, -6.).unwrap();
        problem.add_new_linear_objective_term(y, 2.).unwrap();
        problem
    }

    #[test]
    fn solve_quadratic() {
        let solution = ClarabelSolver::new().solve(&projection_problem(), &SolverOptions::default());
        assert_eq!(solution.status, OptimizationStatus::Optimal);
        let values = solution.variable_values.unwrap();
        // Unconstrained projection onto x + y = 1 gives x = 2.5, the bound clips it to 1.5
        assert!((values[0] - 1.5).abs() < 1e-5);
        assert!((values[1] + 0.5).abs() < 1e-5);
        // 2.25 - 9 + 0.25 - 1
        assert!((solution.objective_value.unwrap() + 7.5).abs() < 1e-4);
    }

    #[test]
    fn solve_linear_maximization() {
        let mut problem = Problem::new_maximization();
        let x = problem
            .add_new_variable("x", None, VariableType::Continuous, 0., 4.)
            .unwrap();
        let y = problem
            .add_new_variable("y", None, VariableType::Continuous, 0., 4.)
            .unwrap();
        problem
            .add_new_inequality_constraint("cap", &[x, y], &[1., 2.], f64::NEG_INFINITY, 6.)
            .unwrap();
        problem.add_new_linear_objective_term(x, 1.).unwrap();
        problem.add_new_linear_objective_term(y, 1.).unwrap();
        let solution = ClarabelSolver::new().solve(&problem, &SolverOptions::default());
        assert_eq!(solution.status, OptimizationStatus::Optimal);
        assert!((solution.objective_value.unwrap() - 5.).abs() < 1e-5);
    }

    #[test]
    fn infeasible() {
        let mut problem = projection_problem();
        problem
            .add_new_inequality_constraint("too_big", &[0], &[1.], 2., f64::INFINITY)
            .unwrap();
        let solution = ClarabelSolver::new().solve(&problem, &SolverOptions::default());
        assert_eq!(solution.status, OptimizationStatus::Infeasible);
        assert!(solution.variable_values.is_none());
    }

    #[test]
    fn fixed_variables_are_equalities() {
        let mut problem = projection_problem();
        problem.update_variable_bounds("x", 0., 0.).unwrap();
        let rows = ConeRows::from_problem(&problem);
        // The sum constraint and the fixed x
        assert_eq!(rows.zero.len(), 2);
        // y is free, so no other rows are added
        assert_eq!(rows.nonnegative.len(), 0);
        let solution = ClarabelSolver::new().solve(&problem, &SolverOptions::default());
        let values = solution.variable_values.unwrap();
        assert!(values[0].abs() < 1e-6);
        assert!((values[1] - 1.).abs() < 1e-5);
    }
}
