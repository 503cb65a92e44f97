//! Minimization Of Metabolic Adjustment
//!
//! Finds the steady state flux closest (in euclidean distance) to a reference flux:
//! `min Σ (v - vref)²`, expanded as `vᵀv - 2·vrefᵀv` with the constant dropped.
use crate::analysis::mta_model::flux_problem;
use crate::analysis::rmta::{check_dimension, RmtaError};
use crate::analysis::solve_knockout;
use crate::metabolic_model::model::Model;
use crate::optimize::problem::{Problem, ProblemError};
use crate::optimize::solvers::{Solver, SolverOptions};

/// MOMA problem for a reference flux, reused as a template for every knockout
#[derive(Clone, Debug)]
pub struct MomaModel {
    problem: Problem,
    num_reactions: usize,
}

impl MomaModel {
    pub fn new(model: &Model, vref: &[f64]) -> Result<Self, RmtaError> {
        let num_reactions = model.num_reactions();
        check_dimension("reference flux", num_reactions, vref.len())?;
        let mut problem = flux_problem(model)?;
        for (idx, &v_ref) in vref.iter().enumerate() {
            problem.add_new_quadratic_objective_term(idx, idx, 1.)?;
            problem.add_new_linear_objective_term(idx, -2. * v_ref)?;
        }
        Ok(MomaModel {
            problem,
            num_reactions,
        })
    }

    /// The underlying optimization problem
    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    /// Solve with the reactions in `knockout` fixed at zero
    ///
    /// Anything other than an optimal solution gives `None`.
    pub fn solve_knockout<S: Solver + ?Sized>(
        &self,
        knockout: &[usize],
        solver: &S,
        options: &SolverOptions,
    ) -> Result<Option<Vec<f64>>, ProblemError> {
        solve_knockout(
            &self.problem,
            self.num_reactions,
            knockout,
            solver,
            options,
            |solution| solution.is_optimal(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::score::{transformation_score, FluxChange::*};
    use crate::analysis::test_models::three_reaction_model;
    use crate::optimize::problem::ProblemType;
    use crate::optimize::solvers::clarabel::ClarabelSolver;

    const VREF: [f64; 3] = [1., 0., -1.];

    #[test]
    fn wild_type_returns_reference() {
        let moma = MomaModel::new(&three_reaction_model(), &VREF).unwrap();
        assert_eq!(*moma.problem().problem_type(), ProblemType::QuadraticContinuous);
        let flux = moma
            .solve_knockout(&[], &ClarabelSolver::new(), &SolverOptions::default())
            .unwrap()
            .unwrap();
        for (v, r) in flux.iter().zip(VREF) {
            assert!((v - r).abs() < 1e-5);
        }
    }

    #[test]
    fn uncoupled_knockout_keeps_reference() {
        let moma = MomaModel::new(&three_reaction_model(), &VREF).unwrap();
        let flux = moma
            .solve_knockout(&[1], &ClarabelSolver::new(), &SolverOptions::default())
            .unwrap()
            .unwrap();
        let score = transformation_score(&flux, &VREF, &[Forward, Unchanged, Backward]);
        assert!(score.abs() < 1e-4);
    }

    #[test]
    fn knockout_redistributes_flux() {
        let moma = MomaModel::new(&three_reaction_model(), &VREF).unwrap();
        let flux = moma
            .solve_knockout(&[0], &ClarabelSolver::new(), &SolverOptions::default())
            .unwrap()
            .unwrap();
        // v2 = v3, closest point to (0, -1) on that line is (-0.5, -0.5)
        assert!(flux[0].abs() < 1e-6);
        assert!((flux[1] + 0.5).abs() < 1e-5);
        assert!((flux[2] + 0.5).abs() < 1e-5);
    }

    #[test]
    fn wrong_reference_length() {
        assert!(matches!(
            MomaModel::new(&three_reaction_model(), &[1., 0.]),
            Err(RmtaError::DimensionMismatch { .. })
        ));
    }
}
