//! Mixed integer quadratic model of the Metabolic Transformation Analysis
//!
//! Every reaction gets a flux variable with the model's bounds, and every reaction with
//! a desired change gets a binary indicator `y` that is 1 when the change is achieved:
//!
//! - forward: `v - (vref + eps - lb)·y >= lb`, so `y = 1` forces `v >= vref + eps`
//! - backward: `v + (ub - vref + eps)·y <= ub`, so `y = 1` forces `v <= vref - eps`
//!
//! The objective trades off staying close to the reference on unchanged reactions
//! against achieving the desired changes:
//! `min α/2·Σ_unchanged (v - vref)² + (1 - α)/2·Σ_changed (1 - y)`.
use log::debug;
use serde::{Deserialize, Serialize};

use crate::analysis::rmta::{check_dimension, RmtaError};
use crate::analysis::score::FluxChange;
use crate::analysis::solve_knockout;
use crate::configuration::read_configuration;
use crate::metabolic_model::model::Model;
use crate::optimize::problem::{Problem, ProblemError};
use crate::optimize::solvers::{Solver, SolverOptions};
use crate::optimize::variable::VariableType;

/// Minimum change required for a labelled reaction to count as changed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Epsilon {
    /// Same threshold for every reaction
    Uniform(f64),
    /// One threshold per reaction, in model order
    PerReaction(Vec<f64>),
}

impl Default for Epsilon {
    fn default() -> Self {
        Epsilon::Uniform(0.)
    }
}

impl Epsilon {
    /// Threshold for every reaction, checking the values are usable
    pub fn values(&self, num_reactions: usize) -> Result<Vec<f64>, RmtaError> {
        let values = match self {
            Epsilon::Uniform(eps) => vec![*eps; num_reactions],
            Epsilon::PerReaction(values) => {
                check_dimension("epsilon", num_reactions, values.len())?;
                values.clone()
            }
        };
        if let Some(bad) = values.iter().find(|e| !e.is_finite() || **e < 0.) {
            return Err(RmtaError::InvalidEpsilon(*bad));
        }
        Ok(values)
    }
}

/// The MTA optimization problem for one set of labels and one alpha
///
/// Built once and reused as a template, each knockout is solved on a copy.
#[derive(Clone, Debug)]
pub struct MtaModel {
    problem: Problem,
    num_reactions: usize,
}

impl MtaModel {
    /// Build the MTA problem
    ///
    /// `vref`, `labels` and `epsilon` are in model reaction order.
    pub fn new(
        model: &Model,
        vref: &[f64],
        labels: &[FluxChange],
        alpha: f64,
        epsilon: &[f64],
    ) -> Result<Self, RmtaError> {
        let num_reactions = model.num_reactions();
        check_dimension("reference flux", num_reactions, vref.len())?;
        check_dimension("labels", num_reactions, labels.len())?;
        check_dimension("epsilon", num_reactions, epsilon.len())?;
        let mut problem = flux_problem(model)?;
        let (default_lb, default_ub) = read_configuration(|c| (c.lower_bound, c.upper_bound));

        for (idx, reaction) in model.reactions.values().enumerate() {
            let label = labels[idx];
            let v_ref = vref[idx];
            if label.is_changed() {
                // Infinite bounds can't be used as big-M constants
                let lb = finite_or(reaction.lower_bound, default_lb);
                let ub = finite_or(reaction.upper_bound, default_ub);
                let y = problem.add_new_variable(
                    &format!("{}_change", reaction.id),
                    None,
                    VariableType::Binary,
                    0.,
                    1.,
                )?;
                match label {
                    FluxChange::Forward => problem.add_new_inequality_constraint(
                        &format!("{}_forward", reaction.id),
                        &[idx, y],
                        &[1., -(v_ref + epsilon[idx] - lb)],
                        lb,
                        f64::INFINITY,
                    )?,
                    _ => problem.add_new_inequality_constraint(
                        &format!("{}_backward", reaction.id),
                        &[idx, y],
                        &[1., ub - v_ref + epsilon[idx]],
                        f64::NEG_INFINITY,
                        ub,
                    )?,
                }
                if alpha < 1. {
                    problem.add_new_linear_objective_term(y, -(1. - alpha) / 2.)?;
                }
            } else if alpha > 0. {
                problem.add_new_quadratic_objective_term(idx, idx, alpha / 2.)?;
                problem.add_new_linear_objective_term(idx, -alpha * v_ref)?;
            }
        }
        debug!(
            "Built MTA problem with {} variables and {} constraints (alpha = {})",
            problem.num_variables(),
            problem.num_constraints(),
            alpha
        );
        Ok(MtaModel {
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
    /// Returns `None` when no feasible solution was found. A solution found before the
    /// time limit stopped the search is still returned.
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
            |solution| solution.variable_values.is_some(),
        )
    }
}

/// Problem with one flux variable per reaction (in model order) and mass balance
/// constraints, with an empty minimization objective
pub(crate) fn flux_problem(model: &Model) -> Result<Problem, RmtaError> {
    let mut problem = Problem::new_minimization();
    for reaction in model.reactions.values() {
        problem.add_new_variable(
            &reaction.id,
            reaction.name.as_deref(),
            VariableType::Continuous,
            reaction.lower_bound,
            reaction.upper_bound,
        )?;
    }
    let stoichiometry = model.stoichiometric_matrix()?;
    let mut rows: Vec<(Vec<usize>, Vec<f64>)> = vec![(Vec::new(), Vec::new()); model.metabolites.len()];
    for (met, rxn, coef) in stoichiometry.triplet_iter() {
        rows[met].0.push(rxn);
        rows[met].1.push(*coef);
    }
    for (met_id, (vars, coefs)) in model.metabolites.keys().zip(rows) {
        problem.add_new_equality_constraint(&format!("{}_balance", met_id), &vars, &coefs, 0.)?;
    }
    Ok(problem)
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::score::{score_solution, transformation_score, FluxChange::*};
    use crate::analysis::test_models::three_reaction_model;
    use crate::optimize::objective::ObjectiveTerm;
    use crate::optimize::solvers::default_solver;

    const VREF: [f64; 3] = [1., 0., -1.];
    const LABELS: [FluxChange; 3] = [Forward, Unchanged, Backward];

    fn sequential() -> SolverOptions {
        SolverOptions {
            time_limit: None,
            num_workers: 1,
            verbose: false,
        }
    }

    #[test]
    fn formulation() {
        let model = three_reaction_model();
        let mta = MtaModel::new(&model, &VREF, &LABELS, 0.66, &[0.5; 3]).unwrap();
        let problem = mta.problem();
        // Three fluxes and an indicator for R1 and R3
        assert_eq!(problem.num_variables(), 5);
        assert_eq!(problem.integral_variables(), vec![3, 4]);
        // Mass balance plus one constraint per indicator
        assert_eq!(problem.num_constraints(), 3);
        let constraints: Vec<String> = problem.constraints().map(|c| c.to_string()).collect();
        assert_eq!(constraints[1], "0 <= 1*x0 + -1.5*x3 <= inf");
        assert_eq!(constraints[2], "-inf <= 1*x2 + 11.5*x4 <= 10");
        assert!(problem
            .objective()
            .terms()
            .contains(&ObjectiveTerm::new_quadratic(1, 1, 0.33)));
    }

    #[test]
    fn epsilon_values() {
        assert_eq!(Epsilon::Uniform(0.1).values(2).unwrap(), vec![0.1, 0.1]);
        assert!(matches!(
            Epsilon::PerReaction(vec![0.1]).values(2),
            Err(RmtaError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            Epsilon::Uniform(-1.).values(2),
            Err(RmtaError::InvalidEpsilon(_))
        ));
    }

    #[test]
    fn knocking_out_desired_change_lowers_score() {
        let model = three_reaction_model();
        let mta = MtaModel::new(&model, &VREF, &LABELS, 0.66, &[0.; 3]).unwrap();
        let solver = default_solver();

        let wild_type = mta.solve_knockout(&[], &solver, &sequential()).unwrap();
        let wild_type_score = score_solution(wild_type.as_deref(), &VREF, &LABELS, false);
        assert!(wild_type_score >= -1e-4);

        let ko_r1 = mta.solve_knockout(&[0], &solver, &sequential()).unwrap();
        let flux = ko_r1.clone().unwrap();
        assert!(flux[0].abs() < 1e-6);
        let ko_score = score_solution(ko_r1.as_deref(), &VREF, &LABELS, true);
        assert!(ko_score < wild_type_score);
        // Without the collapse rule the score is still lower
        assert!(transformation_score(&flux, &VREF, &LABELS) < wild_type_score);
    }

    #[test]
    fn knockout_outside_model_is_an_error() {
        let model = three_reaction_model();
        let mta = MtaModel::new(&model, &VREF, &LABELS, 0.66, &[0.; 3]).unwrap();
        // Index 3 is an indicator, not a reaction
        assert!(mta
            .solve_knockout(&[3], &default_solver(), &sequential())
            .is_err());
    }
}
