//! Command line front end for rMTA
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, ValueEnum};
use indexmap::IndexMap;
use log::info;
use nalgebra::DMatrix;
use serde::Serialize;

use rmtars_core::analysis::checkpoint::DEFAULT_CHECKPOINT_PATH;
use rmtars_core::analysis::mta_model::Epsilon;
use rmtars_core::analysis::rmta::{rmta, RmtaOptions, RmtaResult, StaleCheckpoint};
use rmtars_core::analysis::score::FluxChange;
use rmtars_core::configuration::{Solver, CONFIGURATION};
use rmtars_core::metabolic_model::model::Model;

#[derive(Parser, Debug)]
#[command(name = "rmtars")]
#[command(about = "Robust Metabolic Transformation Analysis", long_about = None)]
struct Cli {
    /// Metabolic model in COBRApy JSON format
    #[arg(short, long)]
    model: PathBuf,

    /// JSON object mapping reaction ids to the desired change (-1, 0 or 1),
    /// reactions that are missing are expected to stay unchanged
    #[arg(short, long)]
    labels: PathBuf,

    /// JSON object mapping every reaction id to its reference flux
    #[arg(short, long)]
    reference: PathBuf,

    /// Where to write the results
    #[arg(short, long)]
    output: PathBuf,

    /// Alpha value(s), repeat the flag to sweep several
    #[arg(long = "alpha", default_values_t = [0.66])]
    alphas: Vec<f64>,

    /// Minimum flux change for a labelled reaction to count as changed
    #[arg(long, default_value_t = 0.)]
    epsilon: f64,

    /// Knock out reactions instead of genes
    #[arg(long, action = ArgAction::SetTrue)]
    rxn_ko: bool,

    /// Time limit in seconds for each individual solve
    #[arg(long, value_name = "SECS")]
    time_limit: Option<f64>,

    /// Delimiter separating gene ids from transcript suffixes
    #[arg(long, value_name = "DELIM")]
    separate_transcript: Option<String>,

    /// Solver workers, 0 to decide automatically
    #[arg(long, default_value_t = 0)]
    num_workers: usize,

    /// 0 silent, 1 progress, 2 per knockout details
    #[arg(long, default_value_t = 1)]
    print_level: u8,

    /// Checkpoint file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CHECKPOINT_PATH)]
    checkpoint: PathBuf,

    /// Disable checkpointing
    #[arg(long, action = ArgAction::SetTrue)]
    no_checkpoint: bool,

    /// Knockouts between checkpoints
    #[arg(long, default_value_t = 100)]
    batch_size: usize,

    /// Start over when the checkpoint was written for different inputs
    #[arg(long, action = ArgAction::SetTrue)]
    discard_stale_checkpoint: bool,

    /// Include the flux distributions in the output
    #[arg(long, action = ArgAction::SetTrue)]
    with_fluxes: bool,

    /// Optimization backend, osqp and scip need the matching build feature
    #[arg(long, value_enum, default_value_t = Backend::Clarabel)]
    solver: Backend,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Backend {
    Clarabel,
    Osqp,
    Scip,
}

impl From<Backend> for Solver {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Clarabel => Solver::Clarabel,
            Backend::Osqp => Solver::Osqp,
            Backend::Scip => Solver::Scip,
        }
    }
}

impl Cli {
    fn rmta_options(&self) -> anyhow::Result<RmtaOptions> {
        let time_limit = match self.time_limit {
            Some(secs) => Some(Duration::try_from_secs_f64(secs).with_context(|| {
                format!(
                    "Time limit must be a non-negative number of seconds, got {}",
                    secs
                )
            })?),
            None => None,
        };
        Ok(RmtaOptions {
            alphas: self.alphas.clone(),
            epsilon: Epsilon::Uniform(self.epsilon),
            rxn_ko: self.rxn_ko,
            time_limit,
            separate_transcript: self.separate_transcript.clone(),
            num_workers: self.num_workers,
            print_level: self.print_level,
            checkpoint_path: self.checkpoint.clone(),
            checkpointing: !self.no_checkpoint,
            batch_size: self.batch_size,
            stale_checkpoint: if self.discard_stale_checkpoint {
                StaleCheckpoint::Discard
            } else {
                StaleCheckpoint::Fail
            },
        })
    }
}

/// A value per alpha, written bare when only one alpha was used
#[derive(Serialize, Debug, PartialEq)]
#[serde(untagged)]
enum PerAlpha<T> {
    Single(T),
    Keyed(IndexMap<String, T>),
}

impl<T> PerAlpha<T> {
    fn new(alphas: &[f64], values: Vec<T>) -> Self {
        if alphas.len() == 1 {
            if let Some(value) = values.into_iter().next() {
                return PerAlpha::Single(value);
            }
            return PerAlpha::Keyed(IndexMap::new());
        }
        PerAlpha::Keyed(
            alphas
                .iter()
                .map(|a| a.to_string())
                .zip(values)
                .collect(),
        )
    }
}

/// Flux distributions, one vector per knockout entity
#[derive(Serialize, Debug)]
struct FluxOutput {
    reactions: Vec<String>,
    best: PerAlpha<Vec<Vec<f64>>>,
    moma: Vec<Vec<f64>>,
    worst: PerAlpha<Vec<Vec<f64>>>,
}

/// Invalid scores are written as null
#[derive(Serialize, Debug)]
struct Output {
    alphas: Vec<f64>,
    knockouts: Vec<String>,
    b_ts: PerAlpha<Vec<f64>>,
    m_ts: Vec<f64>,
    w_ts: PerAlpha<Vec<f64>>,
    r_ts: PerAlpha<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fluxes: Option<FluxOutput>,
}

impl Output {
    fn new(result: &RmtaResult, with_fluxes: bool) -> Self {
        let by_alpha = result.scores_by_alpha();
        let columns = |matrix: &DMatrix<f64>| -> Vec<Vec<f64>> {
            matrix
                .column_iter()
                .map(|column| column.iter().copied().collect())
                .collect()
        };
        let fluxes = with_fluxes.then(|| FluxOutput {
            reactions: result.reactions.clone(),
            best: PerAlpha::new(&result.alphas, result.best_fluxes.iter().map(columns).collect()),
            moma: columns(&result.moma_fluxes),
            worst: PerAlpha::new(
                &result.alphas,
                result.worst_fluxes.iter().map(columns).collect(),
            ),
        });
        Output {
            alphas: result.alphas.clone(),
            knockouts: result.knockouts.clone(),
            b_ts: PerAlpha::new(
                &result.alphas,
                by_alpha.iter().map(|s| s.b_ts.clone()).collect(),
            ),
            m_ts: result.m_ts.iter().copied().collect(),
            w_ts: PerAlpha::new(
                &result.alphas,
                by_alpha.iter().map(|s| s.w_ts.clone()).collect(),
            ),
            r_ts: PerAlpha::new(
                &result.alphas,
                by_alpha.iter().map(|s| s.r_ts.clone()).collect(),
            ),
            fluxes,
        }
    }
}

fn read_json_map<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> anyhow::Result<IndexMap<String, T>> {
    let file = File::open(path).with_context(|| format!("Unable to open {:?}", path))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Unable to parse {:?}", path))
}

/// Labels in model order, reactions not in the file are unchanged
fn read_labels(path: &Path, model: &Model) -> anyhow::Result<Vec<FluxChange>> {
    let raw: IndexMap<String, f64> = read_json_map(path)?;
    if let Some(unknown) = raw.keys().find(|id| !model.reactions.contains_key(*id)) {
        bail!("Label given for unknown reaction {} in {:?}", unknown, path);
    }
    model
        .reactions
        .keys()
        .map(|id| match raw.get(id) {
            Some(&label) => FluxChange::try_from(label)
                .with_context(|| format!("Invalid label for reaction {}", id)),
            None => Ok(FluxChange::Unchanged),
        })
        .collect()
}

/// Reference flux in model order, every reaction must be present
fn read_reference(path: &Path, model: &Model) -> anyhow::Result<Vec<f64>> {
    let raw: IndexMap<String, f64> = read_json_map(path)?;
    model
        .reactions
        .keys()
        .map(|id| {
            raw.get(id)
                .copied()
                .with_context(|| format!("No reference flux for reaction {} in {:?}", id, path))
        })
        .collect()
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let model = Model::read_json(&cli.model)
        .with_context(|| format!("Unable to read model {:?}", cli.model))?;
    let labels = read_labels(&cli.labels, &model)?;
    let vref = read_reference(&cli.reference, &model)?;
    let options = cli.rmta_options()?;
    match CONFIGURATION.write() {
        Ok(mut config) => config.solver = cli.solver.into(),
        Err(_) => bail!("Configuration lock was poisoned"),
    }

    let result = rmta(&model, &labels, &vref, &options).context("rMTA failed")?;

    let output = Output::new(&result, cli.with_fluxes);
    let file = File::create(&cli.output)
        .with_context(|| format!("Unable to create {:?}", cli.output))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &output)
        .with_context(|| format!("Unable to write {:?}", cli.output))?;
    info!("Results written to {:?}", cli.output);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = match cli.print_level {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
    run(&cli)
}
