//! Persisted pipeline state, allowing an interrupted run to resume
//!
//! The state is written as JSON, first to a sibling temporary file which is then
//! renamed over the checkpoint, so a crash during a write leaves the previous
//! checkpoint intact.
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default checkpoint location, relative to the working directory
pub const DEFAULT_CHECKPOINT_PATH: &str = "tmp_rMTA.json";

/// Progress through one scenario pass
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StageProgress {
    /// Alpha value currently being processed (unused by the MOMA pass)
    pub alpha_index: usize,
    /// Number of unique knockouts completed for the current alpha
    pub completed: usize,
    /// Whether the whole pass is finished
    pub done: bool,
}

/// Everything needed to resume a run
///
/// Score arrays are indexed `[alpha][unique knockout]`, flux arrays
/// `[alpha][unique knockout][reaction]`. Invalid scores are stored as `null`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Fingerprint of the inputs that produced this state
    pub fingerprint: String,
    pub best: StageProgress,
    pub moma: StageProgress,
    pub worst: StageProgress,
    #[serde(with = "nullable_score_matrix")]
    pub b_ts: Vec<Vec<f64>>,
    #[serde(with = "nullable_scores")]
    pub m_ts: Vec<f64>,
    #[serde(with = "nullable_score_matrix")]
    pub w_ts: Vec<Vec<f64>>,
    pub best_fluxes: Vec<Vec<Vec<f64>>>,
    pub moma_fluxes: Vec<Vec<f64>>,
    pub worst_fluxes: Vec<Vec<Vec<f64>>>,
}

impl PipelineState {
    /// Fresh zero initialized state
    pub fn new(fingerprint: String, num_alphas: usize, num_knockouts: usize, num_reactions: usize) -> Self {
        let fluxes = vec![vec![vec![0.; num_reactions]; num_knockouts]; num_alphas];
        PipelineState {
            fingerprint,
            best: StageProgress::default(),
            moma: StageProgress::default(),
            worst: StageProgress::default(),
            b_ts: vec![vec![0.; num_knockouts]; num_alphas],
            m_ts: vec![0.; num_knockouts],
            w_ts: vec![vec![0.; num_knockouts]; num_alphas],
            best_fluxes: fluxes.clone(),
            moma_fluxes: vec![vec![0.; num_reactions]; num_knockouts],
            worst_fluxes: fluxes,
        }
    }

    /// Whether every array has the expected shape, and the progress counters fit in it
    pub fn has_shape(&self, num_alphas: usize, num_knockouts: usize, num_reactions: usize) -> bool {
        let scores_ok = |scores: &Vec<Vec<f64>>| {
            scores.len() == num_alphas && scores.iter().all(|s| s.len() == num_knockouts)
        };
        let fluxes_ok = |fluxes: &Vec<Vec<f64>>| {
            fluxes.len() == num_knockouts && fluxes.iter().all(|f| f.len() == num_reactions)
        };
        let progress_ok = |progress: &StageProgress, num_alphas: usize| {
            progress.alpha_index <= num_alphas && progress.completed <= num_knockouts
        };
        scores_ok(&self.b_ts)
            && scores_ok(&self.w_ts)
            && self.m_ts.len() == num_knockouts
            && self.best_fluxes.len() == num_alphas
            && self.best_fluxes.iter().all(fluxes_ok)
            && self.worst_fluxes.len() == num_alphas
            && self.worst_fluxes.iter().all(fluxes_ok)
            && fluxes_ok(&self.moma_fluxes)
            && progress_ok(&self.best, num_alphas)
            && progress_ok(&self.worst, num_alphas)
            && progress_ok(&self.moma, 1)
    }
}

/// Location of the checkpoint, and whether checkpointing is enabled at all
#[derive(Clone, Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    enabled: bool,
}

impl CheckpointStore {
    pub fn new<P: AsRef<Path>>(path: P, enabled: bool) -> Self {
        CheckpointStore {
            path: path.as_ref().to_path_buf(),
            enabled,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the checkpoint, `Ok(None)` if there is none (or checkpointing is disabled)
    pub fn load(&self) -> Result<Option<PipelineState>, CheckpointError> {
        if !self.enabled || !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&self.path).map_err(|err| CheckpointError::Corrupt {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;
        let state = serde_json::from_str(&data).map_err(|err| CheckpointError::Corrupt {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;
        Ok(Some(state))
    }

    /// Write the checkpoint, replacing any previous one
    pub fn save(&self, state: &PipelineState) -> Result<(), CheckpointError> {
        if !self.enabled {
            return Ok(());
        }
        let data = serde_json::to_string(state)?;
        let temp = self.temp_path();
        fs::write(&temp, data)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }

    /// Delete the checkpoint if it exists
    pub fn remove(&self) -> Result<(), CheckpointError> {
        if self.enabled && self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint {path:?} can't be used to resume: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("Checkpoint {path:?} was written for different inputs, remove it or discard stale checkpoints")]
    Mismatch { path: PathBuf },
    #[error("Unable to serialize checkpoint")]
    Serialize(#[from] serde_json::Error),
    #[error("Unable to write checkpoint")]
    Io(#[from] std::io::Error),
}

/// JSON has no infinities, invalid scores are written as null
mod nullable_scores {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::analysis::score::INVALID_SCORE;

    pub(super) fn to_nullable(scores: &[f64]) -> Vec<Option<f64>> {
        scores.iter().map(|s| s.is_finite().then_some(*s)).collect()
    }

    pub(super) fn from_nullable(scores: Vec<Option<f64>>) -> Vec<f64> {
        scores
            .into_iter()
            .map(|s| s.unwrap_or(INVALID_SCORE))
            .collect()
    }

    pub fn serialize<S: Serializer>(scores: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        to_nullable(scores).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        Ok(from_nullable(Vec::<Option<f64>>::deserialize(deserializer)?))
    }
}

mod nullable_score_matrix {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::nullable_scores::{from_nullable, to_nullable};

    pub fn serialize<S: Serializer>(scores: &[Vec<f64>], serializer: S) -> Result<S::Ok, S::Error> {
        scores
            .iter()
            .map(|row| to_nullable(row))
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<f64>>, D::Error> {
        Ok(Vec::<Vec<Option<f64>>>::deserialize(deserializer)?
            .into_iter()
            .map(from_nullable)
            .collect())
    }
}
