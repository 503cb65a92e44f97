//! Robust Metabolic Transformation Analysis
//!
//! For every knockout entity, three scenarios are solved:
//!
//! - best: the MTA problem with the desired flux changes
//! - MOMA: the undirected minimal adjustment response
//! - worst: the MTA problem with the desired changes reversed
//!
//! Each is scored against the desired changes, and the three scores are combined into
//! the robust transformation score (see [`robust_score`]). Progress is checkpointed
//! every `batch_size` knockouts so an interrupted run can pick up where it left off.
use std::path::PathBuf;
use std::time::{Duration, Instant};

use derive_builder::Builder;
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

use crate::analysis::checkpoint::{
    CheckpointError, CheckpointStore, PipelineState, StageProgress, DEFAULT_CHECKPOINT_PATH,
};
use crate::analysis::moma::MomaModel;
use crate::analysis::mta_model::{Epsilon, MtaModel};
use crate::analysis::perturbation::{DeduplicatedKnockouts, PerturbationMatrix};
use crate::analysis::score::{
    clean_labels, robust_score, score_solution, worst_case_labels, FluxChange,
};
use crate::metabolic_model::model::{GprError, Model, ModelError};
use crate::optimize::problem::ProblemError;
use crate::optimize::solvers::{default_solver, Solver, SolverOptions};
use crate::utils::hashing::Fingerprint;

// region Options
/// What to do with a checkpoint written for different inputs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StaleCheckpoint {
    /// Refuse to run
    #[default]
    Fail,
    /// Log a warning and start from scratch
    Discard,
}

/// Options for [`rmta`]
#[derive(Builder, Clone, Debug, PartialEq)]
#[builder(default)]
pub struct RmtaOptions {
    /// Trade-off values between achieving the desired changes and staying close to
    /// the reference flux, one knockout sweep is run per value
    pub alphas: Vec<f64>,
    /// Minimum change for a labelled reaction to count as changed
    pub epsilon: Epsilon,
    /// Knock out reactions rather than genes
    pub rxn_ko: bool,
    /// Wall clock limit for each individual solve
    #[builder(setter(strip_option))]
    pub time_limit: Option<Duration>,
    /// Delimiter between gene ids and transcript suffixes, transcripts of the same gene
    /// are knocked out together
    #[builder(setter(into, strip_option))]
    pub separate_transcript: Option<String>,
    /// Workers available to the solver, 0 to decide automatically, 1 for sequential
    pub num_workers: usize,
    /// 0 for no progress output, 1 for per stage and batch progress, 2 or more to also
    /// log every knockout
    pub print_level: u8,
    /// Where the checkpoint is kept
    #[builder(setter(into))]
    pub checkpoint_path: PathBuf,
    /// Whether to checkpoint at all
    pub checkpointing: bool,
    /// Number of knockouts between checkpoints
    pub batch_size: usize,
    /// What to do with a checkpoint from a different run
    pub stale_checkpoint: StaleCheckpoint,
}

impl Default for RmtaOptions {
    fn default() -> Self {
        RmtaOptions {
            alphas: vec![0.66],
            epsilon: Epsilon::Uniform(0.),
            rxn_ko: false,
            time_limit: None,
            separate_transcript: None,
            num_workers: 0,
            print_level: 1,
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT_PATH),
            checkpointing: true,
            batch_size: 100,
            stale_checkpoint: StaleCheckpoint::Fail,
        }
    }
}
// endregion Options

// region Results
/// Scores of every knockout entity for one alpha value
#[derive(Clone, Debug, PartialEq)]
pub struct AlphaScores {
    pub alpha: f64,
    pub b_ts: Vec<f64>,
    pub m_ts: Vec<f64>,
    pub w_ts: Vec<f64>,
    pub r_ts: Vec<f64>,
}

/// Output of [`rmta`]
///
/// Score matrices have one row per knockout entity and one column per alpha value.
/// Flux matrices have one row per reaction and one column per knockout entity.
#[derive(Clone, Debug, PartialEq)]
pub struct RmtaResult {
    pub alphas: Vec<f64>,
    /// Knockout entities (genes or reactions), in their original order
    pub knockouts: Vec<String>,
    /// Reaction ids, in model order
    pub reactions: Vec<String>,
    pub b_ts: DMatrix<f64>,
    pub m_ts: DVector<f64>,
    pub w_ts: DMatrix<f64>,
    pub r_ts: DMatrix<f64>,
    /// One matrix per alpha value
    pub best_fluxes: Vec<DMatrix<f64>>,
    pub moma_fluxes: DMatrix<f64>,
    /// One matrix per alpha value
    pub worst_fluxes: Vec<DMatrix<f64>>,
}

impl RmtaResult {
    /// Scores for the alpha at `index`
    pub fn scores_at(&self, index: usize) -> Option<AlphaScores> {
        let alpha = *self.alphas.get(index)?;
        Some(AlphaScores {
            alpha,
            b_ts: self.b_ts.column(index).iter().copied().collect(),
            m_ts: self.m_ts.iter().copied().collect(),
            w_ts: self.w_ts.column(index).iter().copied().collect(),
            r_ts: self.r_ts.column(index).iter().copied().collect(),
        })
    }

    /// Scores for the given alpha value
    pub fn scores_for_alpha(&self, alpha: f64) -> Option<AlphaScores> {
        let index = self.alphas.iter().position(|a| *a == alpha)?;
        self.scores_at(index)
    }

    /// Scores for every alpha value, in the order the alphas were given
    pub fn scores_by_alpha(&self) -> Vec<AlphaScores> {
        (0..self.alphas.len())
            .filter_map(|i| self.scores_at(i))
            .collect()
    }

    /// The scores when the run used exactly one alpha value
    pub fn single_alpha(&self) -> Option<AlphaScores> {
        if self.alphas.len() == 1 {
            self.scores_at(0)
        } else {
            None
        }
    }
}

/// Output of [`mta`]
#[derive(Clone, Debug, PartialEq)]
pub struct MtaResult {
    pub alpha: f64,
    pub knockouts: Vec<String>,
    pub reactions: Vec<String>,
    /// Transformation score per knockout entity
    pub scores: DVector<f64>,
    /// Reactions × knockout entities
    pub fluxes: DMatrix<f64>,
}
// endregion Results

#[derive(Error, Debug)]
pub enum RmtaError {
    #[error("Invalid model: {0}")]
    Model(#[from] ModelError),
    #[error("Unable to evaluate GPR: {0}")]
    Gpr(#[from] GprError),
    #[error("{what} has {found} entries but the model has {expected} reactions")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Alpha must be between 0 and 1, got {0}")]
    InvalidAlpha(f64),
    #[error("At least one alpha value is needed")]
    NoAlphas,
    #[error("Alpha {0} was given more than once")]
    DuplicateAlpha(f64),
    #[error("Epsilon must be finite and non-negative, got {0}")]
    InvalidEpsilon(f64),
    #[error("Reference flux of reaction {0} is not finite")]
    InvalidReference(String),
    #[error("Batch size must be at least 1")]
    InvalidBatchSize,
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("Unable to build optimization problem: {0}")]
    Problem(#[from] ProblemError),
    #[error("Nothing to knock out, the model has no genes")]
    NoKnockouts,
}

pub(crate) fn check_dimension(
    what: &'static str,
    expected: usize,
    found: usize,
) -> Result<(), RmtaError> {
    if expected != found {
        return Err(RmtaError::DimensionMismatch {
            what,
            expected,
            found,
        });
    }
    Ok(())
}

/// Run rMTA with the default solver
///
/// # Parameters
/// - `model`: Metabolic model
/// - `labels`: Desired change for every reaction, in model order
/// - `vref`: Reference flux for every reaction, in model order
/// - `options`: See [`RmtaOptions`]
pub fn rmta(
    model: &Model,
    labels: &[FluxChange],
    vref: &[f64],
    options: &RmtaOptions,
) -> Result<RmtaResult, RmtaError> {
    let solver = default_solver();
    rmta_with_solver(model, labels, vref, options, &solver)
}

/// Run rMTA with the given solver, which must handle binary variables
pub fn rmta_with_solver<S: Solver + ?Sized>(
    model: &Model,
    labels: &[FluxChange],
    vref: &[f64],
    options: &RmtaOptions,
    solver: &S,
) -> Result<RmtaResult, RmtaError> {
    let mut run = RmtaRun::start(model, labels, vref, options, solver)?;
    run.directional_scenario(Scenario::Best)?;
    run.moma_scenario()?;
    run.directional_scenario(Scenario::Worst)?;
    Ok(run.aggregate())
}

/// Run the classic (best scenario only) MTA with the default solver
pub fn mta(
    model: &Model,
    labels: &[FluxChange],
    vref: &[f64],
    alpha: f64,
    options: &RmtaOptions,
) -> Result<MtaResult, RmtaError> {
    let solver = default_solver();
    mta_with_solver(model, labels, vref, alpha, options, &solver)
}

/// Run the classic MTA with the given solver
///
/// Only the knockout and solver related fields of `options` are used, there is no
/// checkpointing.
pub fn mta_with_solver<S: Solver + ?Sized>(
    model: &Model,
    labels: &[FluxChange],
    vref: &[f64],
    alpha: f64,
    options: &RmtaOptions,
    solver: &S,
) -> Result<MtaResult, RmtaError> {
    let inputs = Inputs::prepare(model, labels, vref, &[alpha], options)?;
    let solver_options = solver_options(options);
    let mta = MtaModel::new(model, vref, &inputs.best_labels, alpha, &inputs.epsilon)?;
    let num_reactions = model.num_reactions();

    let mut unique_scores = Vec::with_capacity(inputs.knockouts.patterns.len());
    let mut unique_fluxes = Vec::with_capacity(inputs.knockouts.patterns.len());
    for pattern in &inputs.knockouts.patterns {
        let flux = mta.solve_knockout(pattern, solver, &solver_options)?;
        unique_scores.push(score_solution(
            flux.as_deref(),
            vref,
            &inputs.best_labels,
            !pattern.is_empty(),
        ));
        unique_fluxes.push(flux.unwrap_or_else(|| vec![0.; num_reactions]));
    }
    let inverse = &inputs.knockouts.inverse;
    Ok(MtaResult {
        alpha,
        knockouts: inputs.perturbation.entities().to_vec(),
        reactions: model.reaction_ids(),
        scores: DVector::from_iterator(inverse.len(), inverse.iter().map(|&u| unique_scores[u])),
        fluxes: remap_fluxes(&unique_fluxes, inverse, num_reactions),
    })
}

/// Validated inputs shared by [`rmta`] and [`mta`]
struct Inputs {
    best_labels: Vec<FluxChange>,
    worst_labels: Vec<FluxChange>,
    epsilon: Vec<f64>,
    perturbation: PerturbationMatrix,
    knockouts: DeduplicatedKnockouts,
}

impl Inputs {
    fn prepare(
        model: &Model,
        labels: &[FluxChange],
        vref: &[f64],
        alphas: &[f64],
        options: &RmtaOptions,
    ) -> Result<Self, RmtaError> {
        if alphas.is_empty() {
            return Err(RmtaError::NoAlphas);
        }
        if let Some(bad) = alphas.iter().find(|a| !(0. ..=1.).contains(*a)) {
            return Err(RmtaError::InvalidAlpha(*bad));
        }
        if let Some((i, _)) = alphas
            .iter()
            .enumerate()
            .find(|&(i, a)| alphas[..i].contains(a))
        {
            return Err(RmtaError::DuplicateAlpha(alphas[i]));
        }
        model.validate()?;
        let num_reactions = model.num_reactions();
        check_dimension("labels", num_reactions, labels.len())?;
        check_dimension("reference flux", num_reactions, vref.len())?;
        if let Some(idx) = vref.iter().position(|v| !v.is_finite()) {
            return Err(RmtaError::InvalidReference(model.reaction_ids()[idx].clone()));
        }
        let epsilon = options.epsilon.values(num_reactions)?;

        let lower_bounds = model.lower_bounds();
        let best_labels = clean_labels(labels, vref, &lower_bounds);
        let worst_labels = worst_case_labels(labels, vref, &lower_bounds);

        let perturbation = PerturbationMatrix::build(
            model,
            options.rxn_ko,
            options.separate_transcript.as_deref(),
        )?;
        if perturbation.is_empty() {
            return Err(RmtaError::NoKnockouts);
        }
        let knockouts = perturbation.deduplicate();
        Ok(Inputs {
            best_labels,
            worst_labels,
            epsilon,
            perturbation,
            knockouts,
        })
    }

    /// Fingerprint of everything that determines the results
    fn fingerprint(&self, model: &Model, vref: &[f64], options: &RmtaOptions) -> String {
        let mut fingerprint = Fingerprint::new();
        fingerprint.add_usize(model.num_reactions());
        for reaction in model.reactions.values() {
            fingerprint
                .add_str(&reaction.id)
                .add_f64(reaction.lower_bound)
                .add_f64(reaction.upper_bound)
                .add_usize(reaction.metabolites.len());
            for (met, coef) in &reaction.metabolites {
                fingerprint.add_str(met).add_f64(*coef);
            }
        }
        let signs = |labels: &[FluxChange]| labels.iter().map(|l| l.sign()).collect::<Vec<_>>();
        fingerprint
            .add_f64_slice(&signs(&self.best_labels))
            .add_f64_slice(&signs(&self.worst_labels))
            .add_f64_slice(vref)
            .add_f64_slice(&options.alphas)
            .add_f64_slice(&self.epsilon)
            .add_bool(options.rxn_ko)
            .add_opt_str(options.separate_transcript.as_deref())
            .add_usize(self.perturbation.len());
        for (entity, pattern) in self
            .perturbation
            .entities()
            .iter()
            .zip(self.perturbation.patterns())
        {
            fingerprint.add_str(entity).add_usize_slice(pattern);
        }
        fingerprint.finish_hex()
    }
}

fn solver_options(options: &RmtaOptions) -> SolverOptions {
    SolverOptions {
        time_limit: options.time_limit,
        num_workers: options.num_workers,
        verbose: false,
    }
}

/// Directional scenarios, sharing the same loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scenario {
    Best,
    Worst,
}

impl Scenario {
    fn name(self) -> &'static str {
        match self {
            Scenario::Best => "best",
            Scenario::Worst => "worst",
        }
    }
}

/// State of one rMTA run
struct RmtaRun<'a, S: Solver + ?Sized> {
    model: &'a Model,
    vref: &'a [f64],
    options: &'a RmtaOptions,
    solver: &'a S,
    solver_options: SolverOptions,
    inputs: Inputs,
    state: PipelineState,
    store: CheckpointStore,
}

impl<'a, S: Solver + ?Sized> RmtaRun<'a, S> {
    /// Validate inputs, build the knockouts, and restore any checkpoint
    fn start(
        model: &'a Model,
        labels: &[FluxChange],
        vref: &'a [f64],
        options: &'a RmtaOptions,
        solver: &'a S,
    ) -> Result<Self, RmtaError> {
        if options.batch_size == 0 {
            return Err(RmtaError::InvalidBatchSize);
        }
        let inputs = Inputs::prepare(model, labels, vref, &options.alphas, options)?;
        let fingerprint = inputs.fingerprint(model, vref, options);
        let num_alphas = options.alphas.len();
        let num_unique = inputs.knockouts.patterns.len();
        let num_reactions = model.num_reactions();
        if options.print_level >= 1 {
            info!(
                "rMTA: {} knockout entities ({} unique), {} reactions, {} alpha value(s)",
                inputs.perturbation.len(),
                num_unique,
                num_reactions,
                num_alphas
            );
        }

        let store = CheckpointStore::new(&options.checkpoint_path, options.checkpointing);
        let state = match store.load()? {
            Some(state) if state.fingerprint == fingerprint => {
                if !state.has_shape(num_alphas, num_unique, num_reactions) {
                    return Err(CheckpointError::Corrupt {
                        path: store.path().to_path_buf(),
                        reason: "stored arrays don't match the inputs".to_string(),
                    }
                    .into());
                }
                if options.print_level >= 1 {
                    info!("Resuming from checkpoint {:?}", store.path());
                }
                state
            }
            Some(_) => match options.stale_checkpoint {
                StaleCheckpoint::Fail => {
                    return Err(CheckpointError::Mismatch {
                        path: store.path().to_path_buf(),
                    }
                    .into())
                }
                StaleCheckpoint::Discard => {
                    warn!(
                        "Discarding checkpoint {:?} written for different inputs",
                        store.path()
                    );
                    PipelineState::new(fingerprint, num_alphas, num_unique, num_reactions)
                }
            },
            None => PipelineState::new(fingerprint, num_alphas, num_unique, num_reactions),
        };

        Ok(RmtaRun {
            model,
            vref,
            options,
            solver,
            solver_options: solver_options(options),
            inputs,
            state,
            store,
        })
    }

    /// Persist the state, a failure only costs resumption granularity
    fn commit(&self) {
        if let Err(err) = self.store.save(&self.state) {
            warn!("Unable to write checkpoint {:?}: {}", self.store.path(), err);
        }
    }

    /// Whether `completed` knockouts ends a batch which isn't the last one
    fn at_batch_boundary(&self, completed: usize) -> bool {
        completed % self.options.batch_size == 0 && completed < self.inputs.knockouts.patterns.len()
    }

    fn log_batch(&self, stage: &str, completed: usize, started: Instant) {
        if self.options.print_level >= 1 {
            let total = self.inputs.knockouts.patterns.len();
            info!(
                "{} scenario: {}/{} knockouts ({:.1}%), {:.1}s elapsed",
                stage,
                completed,
                total,
                100. * completed as f64 / total as f64,
                started.elapsed().as_secs_f64()
            );
        }
    }

    fn directional_scenario(&mut self, scenario: Scenario) -> Result<(), RmtaError> {
        let name = scenario.name();
        if progress_mut(&mut self.state, scenario).done {
            if self.options.print_level >= 1 {
                info!("{} scenario already complete", name);
            }
            return Ok(());
        }
        let started = Instant::now();
        let labels = match scenario {
            Scenario::Best => self.inputs.best_labels.clone(),
            Scenario::Worst => self.inputs.worst_labels.clone(),
        };
        let num_unique = self.inputs.knockouts.patterns.len();
        let num_alphas = self.options.alphas.len();

        while progress_mut(&mut self.state, scenario).alpha_index < num_alphas {
            let alpha_index = progress_mut(&mut self.state, scenario).alpha_index;
            let alpha = self.options.alphas[alpha_index];
            if self.options.print_level >= 1 {
                info!("Starting {} scenario for alpha = {}", name, alpha);
            }
            let mta = MtaModel::new(self.model, self.vref, &labels, alpha, &self.inputs.epsilon)?;

            let first = progress_mut(&mut self.state, scenario).completed;
            for k in first..num_unique {
                let pattern = &self.inputs.knockouts.patterns[k];
                let flux = mta.solve_knockout(pattern, self.solver, &self.solver_options)?;
                let score = score_solution(
                    flux.as_deref(),
                    self.vref,
                    &self.inputs.best_labels,
                    !pattern.is_empty(),
                );
                if self.options.print_level >= 2 {
                    debug!(
                        "{} scenario, alpha = {}: knockout {}/{} scored {}",
                        name,
                        alpha,
                        k + 1,
                        num_unique,
                        score
                    );
                }
                let flux = flux.unwrap_or_else(|| vec![0.; self.vref.len()]);
                match scenario {
                    Scenario::Best => {
                        self.state.b_ts[alpha_index][k] = score;
                        self.state.best_fluxes[alpha_index][k] = flux;
                    }
                    Scenario::Worst => {
                        self.state.w_ts[alpha_index][k] = score;
                        self.state.worst_fluxes[alpha_index][k] = flux;
                    }
                }
                progress_mut(&mut self.state, scenario).completed = k + 1;
                if self.at_batch_boundary(k + 1) {
                    self.commit();
                    self.log_batch(name, k + 1, started);
                }
            }

            let progress = progress_mut(&mut self.state, scenario);
            progress.alpha_index += 1;
            progress.completed = 0;
            self.commit();
        }

        progress_mut(&mut self.state, scenario).done = true;
        self.commit();
        if self.options.print_level >= 1 {
            info!(
                "{} scenario finished in {:.1}s",
                name,
                started.elapsed().as_secs_f64()
            );
        }
        Ok(())
    }

    fn moma_scenario(&mut self) -> Result<(), RmtaError> {
        if self.state.moma.done {
            if self.options.print_level >= 1 {
                info!("MOMA scenario already complete");
            }
            return Ok(());
        }
        let started = Instant::now();
        if self.options.print_level >= 1 {
            info!("Starting MOMA scenario");
        }
        let moma = MomaModel::new(self.model, self.vref)?;
        let num_unique = self.inputs.knockouts.patterns.len();

        for k in self.state.moma.completed..num_unique {
            let pattern = &self.inputs.knockouts.patterns[k];
            let flux = moma.solve_knockout(pattern, self.solver, &self.solver_options)?;
            let score = score_solution(flux.as_deref(), self.vref, &self.inputs.best_labels, true);
            if self.options.print_level >= 2 {
                debug!(
                    "MOMA scenario: knockout {}/{} scored {}",
                    k + 1,
                    num_unique,
                    score
                );
            }
            self.state.m_ts[k] = score;
            self.state.moma_fluxes[k] = flux.unwrap_or_else(|| vec![0.; self.vref.len()]);
            self.state.moma.completed = k + 1;
            if self.at_batch_boundary(k + 1) {
                self.commit();
                self.log_batch("MOMA", k + 1, started);
            }
        }

        self.state.moma.alpha_index = 1;
        self.state.moma.done = true;
        self.commit();
        if self.options.print_level >= 1 {
            info!(
                "MOMA scenario finished in {:.1}s",
                started.elapsed().as_secs_f64()
            );
        }
        Ok(())
    }

    /// Map unique knockout results back to the entities, combine the scores, and remove
    /// the checkpoint
    fn aggregate(self) -> RmtaResult {
        let inverse = &self.inputs.knockouts.inverse;
        let num_entities = inverse.len();
        let num_alphas = self.options.alphas.len();
        let num_reactions = self.model.num_reactions();
        let state = &self.state;

        let b_ts = DMatrix::from_fn(num_entities, num_alphas, |e, a| state.b_ts[a][inverse[e]]);
        let w_ts = DMatrix::from_fn(num_entities, num_alphas, |e, a| state.w_ts[a][inverse[e]]);
        let m_ts = DVector::from_fn(num_entities, |e, _| state.m_ts[inverse[e]]);
        let r_ts = DMatrix::from_fn(num_entities, num_alphas, |e, a| {
            robust_score(b_ts[(e, a)], m_ts[e], w_ts[(e, a)])
        });

        let result = RmtaResult {
            alphas: self.options.alphas.clone(),
            knockouts: self.inputs.perturbation.entities().to_vec(),
            reactions: self.model.reaction_ids(),
            best_fluxes: state
                .best_fluxes
                .iter()
                .map(|fluxes| remap_fluxes(fluxes, inverse, num_reactions))
                .collect(),
            moma_fluxes: remap_fluxes(&state.moma_fluxes, inverse, num_reactions),
            worst_fluxes: state
                .worst_fluxes
                .iter()
                .map(|fluxes| remap_fluxes(fluxes, inverse, num_reactions))
                .collect(),
            b_ts,
            m_ts,
            w_ts,
            r_ts,
        };
        if let Err(err) = self.store.remove() {
            warn!("Unable to remove checkpoint {:?}: {}", self.store.path(), err);
        }
        if self.options.print_level >= 1 {
            info!("rMTA finished");
        }
        result
    }
}

fn progress_mut(state: &mut PipelineState, scenario: Scenario) -> &mut StageProgress {
    match scenario {
        Scenario::Best => &mut state.best,
        Scenario::Worst => &mut state.worst,
    }
}

/// Reactions × entities matrix from per unique knockout flux vectors
fn remap_fluxes(unique: &[Vec<f64>], inverse: &[usize], num_reactions: usize) -> DMatrix<f64> {
    DMatrix::from_fn(num_reactions, inverse.len(), |r, e| unique[inverse[e]][r])
}
