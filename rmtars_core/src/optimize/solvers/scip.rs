//! Implements a solver interface for Russcip
//!
//! SCIP only takes linear objectives, so the quadratic part of `½xᵀPx + qᵀx` is moved
//! into an epigraph variable `t` with the constraint `½xᵀPx - t <= 0`, and `t + qᵀx`
//! is minimized instead.
use std::rc::Rc;

use russcip::prelude::*;

use crate::configuration::read_configuration;
use crate::optimize::constraint::Constraint;
use crate::optimize::problem::Problem;
use crate::optimize::solvers::{clamp_bound, Solver, SolverOptions, INFINITE_BOUND};
use crate::optimize::variable::VariableType;
use crate::optimize::{OptimizationStatus, ProblemSolution};

/// Mixed integer QP backend using SCIP through russcip
///
/// Unlike the continuous backends it handles binary and integer variables itself, so it
/// is not wrapped in [`BranchAndBound`](super::branch_bound::BranchAndBound).
#[derive(Clone, Debug)]
pub struct RusscipSolver {
    feasibility_tolerance: f64,
}

impl RusscipSolver {
    /// Create a solver using the configured tolerance
    pub fn new() -> Self {
        RusscipSolver {
            feasibility_tolerance: read_configuration(|c| c.tolerance),
        }
    }
}

impl Default for RusscipSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver for RusscipSolver {
    fn solve(&self, problem: &Problem, options: &SolverOptions) -> ProblemSolution {
        self.solve_scip(problem, options)
            .unwrap_or_else(|| ProblemSolution::failed(OptimizationStatus::Error))
    }
}

impl RusscipSolver {
    /// None when SCIP rejected a parameter
    fn solve_scip(&self, problem: &Problem, options: &SolverOptions) -> Option<ProblemSolution> {
        let model = Model::new().include_default_plugins().create_prob("rmtars");
        let model = if options.verbose {
            model
        } else {
            model.hide_output()
        };
        let mut model = model
            .set_obj_sense(ObjSense::Minimize)
            .set_real_param("numerics/feastol", self.feasibility_tolerance)
            .ok()?;
        if let Some(limit) = options.time_limit {
            model = model
                .set_real_param("limits/time", limit.as_secs_f64().min(INFINITE_BOUND))
                .ok()?;
        }
        if options.num_workers > 0 {
            model = model
                .set_int_param("parallel/maxnthreads", options.num_workers.min(i32::MAX as usize) as i32)
                .ok()?;
        }

        let (p, q) = problem.objective_matrices();
        let vars: Vec<_> = problem
            .variables()
            .zip(&q)
            .map(|(var, &coef)| {
                model.add_var(
                    clamp_bound(var.lower_bound),
                    clamp_bound(var.upper_bound),
                    coef,
                    &var.id,
                    var_type(var.variable_type),
                )
            })
            .collect();

        for constraint in problem.constraints() {
            let (lhs, rhs) = match *constraint {
                Constraint::Equality { equals, .. } => (equals, equals),
                Constraint::Inequality {
                    lower_bound,
                    upper_bound,
                    ..
                } => (clamp_bound(lower_bound), clamp_bound(upper_bound)),
            };
            let terms = constraint.terms();
            let cons_vars = terms.iter().map(|t| Rc::clone(&vars[t.variable])).collect();
            let coefs: Vec<f64> = terms.iter().map(|t| t.coefficient).collect();
            model.add_cons(cons_vars, &coefs, lhs, rhs, constraint.get_id());
        }

        if p.nnz() > 0 {
            let epigraph = model.add_var(
                -INFINITE_BOUND,
                INFINITE_BOUND,
                1.,
                "objective_epigraph",
                VarType::Continuous,
            );
            let mut quad_1 = Vec::with_capacity(p.nnz());
            let mut quad_2 = Vec::with_capacity(p.nnz());
            let mut quad_coefs = Vec::with_capacity(p.nnz());
            // P is upper triangular, so off diagonal entries already carry both halves
            for (i, j, &value) in p.triplet_iter() {
                quad_1.push(Rc::clone(&vars[i]));
                quad_2.push(Rc::clone(&vars[j]));
                quad_coefs.push(if i == j { 0.5 * value } else { value });
            }
            model.add_cons_quadratic(
                vec![epigraph],
                &mut [-1.],
                quad_1,
                quad_2,
                &mut quad_coefs,
                -INFINITE_BOUND,
                0.,
                "objective_quadratic",
            );
        }

        let solved = model.solve();
        let status = convert_status(solved.status());
        let values: Option<Vec<f64>> = match status {
            OptimizationStatus::Optimal | OptimizationStatus::TimedOut => solved
                .best_sol()
                .map(|sol| vars.iter().map(|v| sol.val(Rc::clone(v))).collect()),
            _ => None,
        };
        Some(match values {
            Some(values) => ProblemSolution {
                status,
                objective_value: Some(problem.objective_value(&values)),
                variable_values: Some(values),
            },
            None if status == OptimizationStatus::Optimal => {
                ProblemSolution::failed(OptimizationStatus::Error)
            }
            None => ProblemSolution::failed(status),
        })
    }
}

fn var_type(variable_type: VariableType) -> VarType {
    match variable_type {
        VariableType::Continuous => VarType::Continuous,
        VariableType::Integer => VarType::Integer,
        VariableType::Binary => VarType::Binary,
    }
}

fn convert_status(status: Status) -> OptimizationStatus {
    match status {
        Status::Optimal => OptimizationStatus::Optimal,
        Status::Infeasible | Status::Inforunbd => OptimizationStatus::Infeasible,
        Status::Unbounded => OptimizationStatus::Unbounded,
        Status::TimeLimit
        | Status::NodeLimit
        | Status::TotalNodeLimit
        | Status::StallNodeLimit
        | Status::GapLimit
        | Status::SolLimit
        | Status::BestSolLimit => OptimizationStatus::TimedOut,
        _ => OptimizationStatus::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solve_mixed_integer_quadratic() {
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

        let solution = RusscipSolver::new().solve(&problem, &SolverOptions::default());
        assert_eq!(solution.status, OptimizationStatus::Optimal);
        let values = solution.variable_values.unwrap();
        assert!((values[x] - 0.7).abs() < 1e-4);
        assert!((values[y] - 1.).abs() < 1e-6);
        // 0.49 - 0.98 - 0.1
        assert!((solution.objective_value.unwrap() + 0.59).abs() < 1e-4);
    }

    #[test]
    fn solve_knapsack_maximization() {
        // maximize 5a + 4b + 3c subject to 2a + 3b + c <= 4
        let mut problem = Problem::new_maximization();
        for (id, value) in [("a", 5.), ("b", 4.), ("c", 3.)] {
            let var = problem
                .add_new_variable(id, None, VariableType::Binary, 0., 1.)
                .unwrap();
            problem.add_new_linear_objective_term(var, value).unwrap();
        }
        problem
            .add_new_inequality_constraint("weight", &[0, 1, 2], &[2., 3., 1.], f64::NEG_INFINITY, 4.)
            .unwrap();
        let solution = RusscipSolver::new().solve(&problem, &SolverOptions::default());
        assert_eq!(solution.status, OptimizationStatus::Optimal);
        assert!((solution.objective_value.unwrap() - 8.).abs() < 1e-6);
        let values = solution.variable_values.unwrap();
        assert!((values[0] - 1.).abs() < 1e-6);
        assert!(values[1].abs() < 1e-6);
    }

    #[test]
    fn infeasible() {
        let mut problem = Problem::new_minimization();
        let x = problem
            .add_new_variable("x", None, VariableType::Integer, 0., 3.)
            .unwrap();
        problem
            .add_new_equality_constraint("half", &[x], &[2.], 3.)
            .unwrap();
        let solution = RusscipSolver::new().solve(&problem, &SolverOptions::default());
        assert_eq!(solution.status, OptimizationStatus::Infeasible);
        assert!(solution.variable_values.is_none());
    }
}
