//! Persistent archive of per-trial reward curves
//!
//! The archive is a JSON object whose `ppo_lr_results` key holds every
//! finished trial's reward curve, grouped by learning rate: trials of the
//! `i`-th learning rate occupy `[i * num_trials, (i + 1) * num_trials)`.
//! The remaining keys are metadata and may be absent.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SweepError};

/// Accumulated sweep results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultArchive {
    /// One reward curve per trial, in sweep order
    pub ppo_lr_results: Vec<Vec<f64>>,
    /// Learning rates of the sweep that wrote the archive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_rates: Option<Vec<f64>>,
    /// Trials per learning rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_trials: Option<usize>,
    /// Id of the run that wrote the archive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    /// Time of the last save
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ResultArchive {
    /// Start an empty archive for a new run
    #[must_use]
    pub fn new(learning_rates: &[f64], num_trials: usize) -> Self {
        Self {
            ppo_lr_results: Vec::with_capacity(learning_rates.len() * num_trials),
            learning_rates: Some(learning_rates.to_vec()),
            num_trials: Some(num_trials),
            run_id: Some(Uuid::new_v4()),
            updated_at: None,
        }
    }

    /// Append the reward curve of a finished trial
    pub fn push_trial(&mut self, rewards: Vec<f64>) {
        self.ppo_lr_results.push(rewards);
    }

    /// Number of stored trials
    #[must_use]
    pub fn len(&self) -> usize {
        self.ppo_lr_results.len()
    }

    /// Whether no trial has been stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ppo_lr_results.is_empty()
    }

    /// Overwrite `path` with the whole archive.
    ///
    /// The JSON is written to a sibling temp file first and renamed over
    /// `path`, so readers never see a half-written archive.
    pub async fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.updated_at = Some(Utc::now());

        let bytes = serde_json::to_vec(self)?;
        let tmp = temp_path(path)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Read an archive written by [`ResultArchive::save`] or any compatible writer
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn temp_path(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| SweepError::InvalidConfig(format!("{} is not a file path", path.display())))?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(name);
    tmp_name.push(".tmp");
    Ok(path.with_file_name(tmp_name))
}
