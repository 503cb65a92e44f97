//! Branch and bound over a continuous backend, for problems with binary or integer variables
//!
//! Nodes are explored depth first. At each node the relaxation is solved by the wrapped
//! backend, and the integral variable furthest from an integer value is branched on.
//! Up to `num_workers` open nodes are solved concurrently, their results are then
//! merged in a fixed order so the search is deterministic regardless of scheduling.
use std::time::Instant;

use log::debug;
use rayon::prelude::*;

use crate::configuration::read_configuration;
use crate::optimize::problem::Problem;
use crate::optimize::solvers::{Solver, SolverOptions};
use crate::optimize::{OptimizationStatus, ProblemSolution};

/// Bound changes applied to the root problem to get a node, `(variable, lower, upper)`
type Node = Vec<(usize, f64, f64)>;

/// Mixed integer solver built on top of a continuous relaxation solver
#[derive(Clone, Debug)]
pub struct BranchAndBound<S: Solver> {
    relaxation_solver: S,
    node_limit: usize,
    integrality_tolerance: f64,
}

impl<S: Solver> BranchAndBound<S> {
    /// Wrap `relaxation_solver`, using the configured node limit and tolerance
    pub fn new(relaxation_solver: S) -> Self {
        BranchAndBound {
            relaxation_solver,
            node_limit: read_configuration(|c| c.node_limit),
            integrality_tolerance: read_configuration(|c| c.tolerance),
        }
    }

    /// Set the maximum number of nodes explored in a single solve
    pub fn with_node_limit(mut self, node_limit: usize) -> Self {
        self.node_limit = node_limit;
        self
    }

    fn solve_node(&self, problem: &Problem, node: &Node, options: &SolverOptions) -> ProblemSolution {
        let mut relaxation = problem.clone();
        for &(var, lower, upper) in node {
            if relaxation
                .update_variable_bounds_by_index(var, lower, upper)
                .is_err()
            {
                return ProblemSolution::failed(OptimizationStatus::Infeasible);
            }
        }
        self.relaxation_solver.solve(&relaxation, options)
    }

    /// Integral variable with the largest distance to the nearest integer, if any is
    /// further than the tolerance
    fn branching_variable(&self, integral: &[usize], values: &[f64]) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64, f64)> = None;
        for &var in integral {
            let value = values[var];
            let fractionality = (value - value.round()).abs();
            if fractionality <= self.integrality_tolerance {
                continue;
            }
            match best {
                Some((_, _, f)) if f >= fractionality => {}
                _ => best = Some((var, value, fractionality)),
            }
        }
        best.map(|(var, value, _)| (var, value))
    }
}

/// Outcome flags collected while searching
#[derive(Default)]
struct SearchState {
    incumbent: Option<(f64, Vec<f64>)>,
    limit_reached: bool,
    unbounded: bool,
    errored: bool,
}

impl<S: Solver> Solver for BranchAndBound<S> {
    fn solve(&self, problem: &Problem, options: &SolverOptions) -> ProblemSolution {
        if !problem.has_integer_variables() {
            return self.relaxation_solver.solve(problem, options);
        }
        let start = Instant::now();
        let integral = problem.integral_variables();
        let workers = match options.num_workers {
            0 => rayon::current_num_threads(),
            n => n,
        }
        .max(1);

        let mut state = SearchState::default();
        let mut open: Vec<Node> = vec![Vec::new()];
        let mut explored = 0usize;
        while !open.is_empty() {
            if explored >= self.node_limit {
                state.limit_reached = true;
                break;
            }
            let remaining = match options.time_limit {
                Some(limit) => match limit.checked_sub(start.elapsed()) {
                    Some(left) if !left.is_zero() => Some(left),
                    _ => {
                        state.limit_reached = true;
                        break;
                    }
                },
                None => None,
            };
            let node_options = SolverOptions {
                time_limit: remaining,
                num_workers: 1,
                verbose: options.verbose,
            };
            let take = workers.min(open.len()).min(self.node_limit - explored);
            let batch = open.split_off(open.len() - take);
            explored += take;

            let results: Vec<ProblemSolution> = if take == 1 {
                vec![self.solve_node(problem, &batch[0], &node_options)]
            } else {
                batch
                    .par_iter()
                    .map(|node| self.solve_node(problem, node, &node_options))
                    .collect()
            };

            for (node, result) in batch.into_iter().zip(results) {
                match result.status {
                    OptimizationStatus::Optimal => {}
                    OptimizationStatus::Infeasible => continue,
                    OptimizationStatus::Unbounded => {
                        state.unbounded = true;
                        continue;
                    }
                    OptimizationStatus::TimedOut => {
                        state.limit_reached = true;
                        continue;
                    }
                    OptimizationStatus::Error => {
                        state.errored = true;
                        continue;
                    }
                }
                let Some(mut values) = result.variable_values else {
                    state.errored = true;
                    continue;
                };
                let relaxed_bound = problem.minimization_value(&values);
                if let Some((best, _)) = &state.incumbent {
                    if relaxed_bound >= *best - self.integrality_tolerance {
                        continue;
                    }
                }
                match self.branching_variable(&integral, &values) {
                    None => {
                        for &var in &integral {
                            values[var] = values[var].round();
                        }
                        let objective = problem.minimization_value(&values);
                        let improves = match &state.incumbent {
                            Some((best, _)) => objective < *best,
                            None => true,
                        };
                        if improves {
                            state.incumbent = Some((objective, values));
                        }
                    }
                    Some((var, value)) => {
                        let (lower, upper) = node_bounds(problem, &node, var);
                        let mut down = node.clone();
                        down.push((var, lower, value.floor()));
                        let mut up = node;
                        up.push((var, value.ceil(), upper));
                        // The up branch ends on top of the stack, so it is explored first
                        open.push(down);
                        open.push(up);
                    }
                }
            }
            if state.unbounded || state.limit_reached {
                break;
            }
        }
        debug!(
            "Branch and bound explored {} nodes in {:.3}s",
            explored,
            start.elapsed().as_secs_f64()
        );

        if state.unbounded {
            return ProblemSolution::failed(OptimizationStatus::Unbounded);
        }
        match state.incumbent {
            Some((_, values)) => ProblemSolution {
                // A solution found before the search could finish, or with part of the
                // tree lost to solver errors, is still reported but isn't proven optimal
                status: if state.limit_reached {
                    OptimizationStatus::TimedOut
                } else if state.errored {
                    OptimizationStatus::Error
                } else {
                    OptimizationStatus::Optimal
                },
                objective_value: Some(problem.objective_value(&values)),
                variable_values: Some(values),
            },
            None if state.limit_reached => ProblemSolution::failed(OptimizationStatus::TimedOut),
            None if state.errored => ProblemSolution::failed(OptimizationStatus::Error),
            None => ProblemSolution::failed(OptimizationStatus::Infeasible),
        }
    }
}

/// Current bounds of `var` at `node`
fn node_bounds(problem: &Problem, node: &Node, var: usize) -> (f64, f64) {
    node.iter()
        .rev()
        .find(|(v, _, _)| *v == var)
        .map(|&(_, lower, upper)| (lower, upper))
        .unwrap_or_else(|| {
            let lower = problem.lower_bounds()[var];
            let upper = problem.upper_bounds()[var];
            (lower, upper)
        })
}
