//! Sweep configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use mars_rl_agent::{MLPConfig, PPOConfig};
use mars_rl_core::{EnvironmentConfig, TrainingSchedule};
use mars_rl_env::MARS_EXPLORER_ID;

use crate::error::{Result, SweepError};

/// Everything one sweep run needs, fixed for the duration of the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Learning rates to compare, in sweep order
    pub learning_rates: Vec<f64>,
    /// Independent trials per learning rate
    pub num_trials: usize,
    /// Training episodes per trial
    pub episodes_per_trial: usize,
    /// Per-episode step cap; `None` uses the environment's own limit
    pub max_steps: Option<usize>,
    /// Policy update cadence, in episodes
    pub update_interval: usize,
    /// Registry id of the environment
    pub env_id: String,
    /// Settings merged onto the environment's defaults
    pub environment: EnvironmentConfig,
    /// PPO hyperparameters; the learning rate is replaced per sweep point
    pub agent: PPOConfig,
    /// Hidden layers and activation; input and output sizes come from the environment
    pub network: MLPConfig,
    /// Directory holding the result archive
    pub results_dir: PathBuf,
    /// Directory holding the comparison plot
    pub plot_dir: PathBuf,
    /// Archive file name inside `results_dir`
    pub archive_file: String,
    /// Plot file name inside `plot_dir`
    pub plot_file: String,
    /// Base seed; trial `k` of the sweep uses `seed + k`
    pub seed: Option<u64>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            learning_rates: vec![1e-4, 1e-3, 1e-2, 3e-4],
            num_trials: 10,
            episodes_per_trial: 5000,
            max_steps: None,
            update_interval: 10,
            env_id: MARS_EXPLORER_ID.to_string(),
            environment: EnvironmentConfig::default(),
            agent: PPOConfig::default(),
            network: MLPConfig::default(),
            results_dir: PathBuf::from("training_results"),
            plot_dir: PathBuf::from("plot_figs"),
            archive_file: "ppo_lr_results.json".to_string(),
            plot_file: "ppo_lr_results.png".to_string(),
            seed: None,
        }
    }
}

impl SweepConfig {
    /// Load a configuration from a JSON file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Check that the sweep can run
    pub fn validate(&self) -> Result<()> {
        if self.learning_rates.is_empty() {
            return Err(SweepError::InvalidConfig("no learning rates to sweep".into()));
        }
        if let Some(lr) = self.learning_rates.iter().find(|lr| !(lr.is_finite() && **lr > 0.0)) {
            return Err(SweepError::InvalidConfig(format!(
                "learning rates must be positive, got {lr}"
            )));
        }
        if self.num_trials == 0 {
            return Err(SweepError::InvalidConfig("num_trials must be at least 1".into()));
        }
        if self.episodes_per_trial == 0 {
            return Err(SweepError::InvalidConfig(
                "episodes_per_trial must be at least 1".into(),
            ));
        }
        if self.update_interval == 0 {
            return Err(SweepError::InvalidConfig("update_interval must be at least 1".into()));
        }
        if self.max_steps == Some(0) {
            return Err(SweepError::InvalidConfig("max_steps must be at least 1".into()));
        }
        if self.archive_file.is_empty() || self.plot_file.is_empty() {
            return Err(SweepError::InvalidConfig("output file names must not be empty".into()));
        }
        self.agent
            .validate()
            .map_err(|e| SweepError::InvalidConfig(e.to_string()))
    }

    /// Where the result archive is written
    #[must_use]
    pub fn archive_path(&self) -> PathBuf {
        self.results_dir.join(&self.archive_file)
    }

    /// Where the comparison plot is written
    #[must_use]
    pub fn plot_path(&self) -> PathBuf {
        self.plot_dir.join(&self.plot_file)
    }

    /// Number of trials in a full sweep
    #[must_use]
    pub fn total_trials(&self) -> usize {
        self.learning_rates.len() * self.num_trials
    }

    /// Training schedule of a single trial
    #[must_use]
    pub fn schedule(&self, max_timesteps: usize) -> TrainingSchedule {
        TrainingSchedule {
            num_episodes: self.episodes_per_trial,
            max_timesteps,
            update_interval: self.update_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_reference_run() {
        let config = SweepConfig::default();
        assert_eq!(config.learning_rates, vec![1e-4, 1e-3, 1e-2, 3e-4]);
        assert_eq!(config.num_trials, 10);
        assert_eq!(config.episodes_per_trial, 5000);
        assert_eq!(config.update_interval, 10);
        assert_eq!(config.total_trials(), 40);
        assert_eq!(config.archive_path(), Path::new("training_results/ppo_lr_results.json"));
        assert_eq!(config.plot_path(), Path::new("plot_figs/ppo_lr_results.png"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "learning_rates": [0.001],
                "num_trials": 2,
                "environment": {{"seed": 9, "lidar_range": 4}},
                "agent": {{"clip_param": 0.1}},
                "network": {{"hidden_dims": [32]}}
            }}"#
        )
        .unwrap();

        let config = SweepConfig::load(file.path()).unwrap();
        assert_eq!(config.learning_rates, vec![0.001]);
        assert_eq!(config.num_trials, 2);
        assert_eq!(config.episodes_per_trial, 5000);
        assert_eq!(config.environment.seed, Some(9));
        assert_eq!(config.environment.params["lidar_range"], 4);
        assert!((config.agent.clip_param - 0.1).abs() < 1e-12);
        assert_eq!(config.network.hidden_dims, vec![32]);
    }

    #[test]
    fn test_validation_rejects_unrunnable_sweeps() {
        let cases = [
            SweepConfig { learning_rates: vec![], ..SweepConfig::default() },
            SweepConfig { learning_rates: vec![1e-3, -1e-3], ..SweepConfig::default() },
            SweepConfig { learning_rates: vec![f64::NAN], ..SweepConfig::default() },
            SweepConfig { num_trials: 0, ..SweepConfig::default() },
            SweepConfig { episodes_per_trial: 0, ..SweepConfig::default() },
            SweepConfig { update_interval: 0, ..SweepConfig::default() },
            SweepConfig { max_steps: Some(0), ..SweepConfig::default() },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(SweepError::InvalidConfig(_))),
                "{config:?} should be rejected"
            );
        }
    }
}
