//! Robust Metabolic Transformation Analysis and its building blocks
pub mod checkpoint;
pub mod moma;
pub mod mta_model;
pub mod perturbation;
pub mod rmta;
pub mod score;

use crate::optimize::problem::{Problem, ProblemError};
use crate::optimize::solvers::{Solver, SolverOptions};
use crate::optimize::ProblemSolution;

/// Solve a copy of `problem` with the reactions in `knockout` fixed at zero
///
/// Flux variables must be the first `num_reactions` variables of the problem. Returns
/// the flux part of the solution when `accept` considers the solution usable.
pub(crate) fn solve_knockout<S, F>(
    problem: &Problem,
    num_reactions: usize,
    knockout: &[usize],
    solver: &S,
    options: &SolverOptions,
    accept: F,
) -> Result<Option<Vec<f64>>, ProblemError>
where
    S: Solver + ?Sized,
    F: Fn(&ProblemSolution) -> bool,
{
    let mut knocked_out = problem.clone();
    for &rxn in knockout {
        if rxn >= num_reactions {
            return Err(ProblemError::NonExistentVariable);
        }
        knocked_out.update_variable_bounds_by_index(rxn, 0., 0.)?;
    }
    let solution = solver.solve(&knocked_out, options);
    if !accept(&solution) {
        return Ok(None);
    }
    Ok(solution.variable_values.map(|mut values| {
        values.truncate(num_reactions);
        values
    }))
}

#[cfg(test)]
pub(crate) mod test_models {
    use indexmap::IndexMap;

    use crate::metabolic_model::metabolite::Metabolite;
    use crate::metabolic_model::model::Model;
    use crate::metabolic_model::reaction::ReactionBuilder;

    /// Single metabolite A produced by R1 and R3, consumed by R2
    ///
    /// R1 is irreversible, R2 and R3 are reversible. `[1, 0, -1]` is a steady state.
    pub(crate) fn three_reaction_model() -> Model {
        let mut model = Model::new_empty();
        model.add_metabolite(Metabolite::new("A"));
        for (id, coef, lb) in [("R1", 1., 0.), ("R2", -1., -10.), ("R3", 1., -10.)] {
            let mut mets = IndexMap::new();
            mets.insert("A".to_string(), coef);
            model.add_reaction(
                ReactionBuilder::default()
                    .id(id.to_string())
                    .metabolites(mets)
                    .lower_bound(lb)
                    .upper_bound(10.)
                    .build()
                    .unwrap(),
            );
        }
        model
    }
}
