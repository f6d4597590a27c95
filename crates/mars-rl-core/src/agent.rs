//! Agent configuration and the training contract used by sweep drivers

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Environment;

/// Configuration shared by learning agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Learning rate
    pub learning_rate: f64,
    /// Discount factor
    pub gamma: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            gamma: 0.99,
        }
    }
}

/// Episode budget for one call to [`Learning::train`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingSchedule {
    /// Number of episodes to run
    pub num_episodes: usize,
    /// Per-episode step cap
    pub max_timesteps: usize,
    /// Policy update cadence, in episodes
    pub update_interval: usize,
}

impl TrainingSchedule {
    /// Reject schedules that cannot make progress
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_timesteps == 0 {
            return Err(crate::RLError::Agent("max_timesteps must be at least 1".into()));
        }
        if self.update_interval == 0 {
            return Err(crate::RLError::Agent("update_interval must be at least 1".into()));
        }
        Ok(())
    }

    /// Number of policy updates a full run performs
    #[must_use]
    pub fn expected_updates(&self) -> usize {
        if self.update_interval == 0 {
            0
        } else {
            self.num_episodes / self.update_interval
        }
    }
}

/// What a training run produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Total reward of each episode, in order
    pub episode_rewards: Vec<f64>,
    /// Mean actor (surrogate) loss of each policy update
    pub actor_losses: Vec<f64>,
    /// Number of steps taken in each episode
    pub episode_steps: Vec<usize>,
}

impl TrainingReport {
    /// Create an empty report sized for `episodes`
    #[must_use]
    pub fn with_capacity(episodes: usize) -> Self {
        Self {
            episode_rewards: Vec::with_capacity(episodes),
            actor_losses: Vec::new(),
            episode_steps: Vec::with_capacity(episodes),
        }
    }

    /// Record a finished episode
    pub fn push_episode(&mut self, total_reward: f64, steps: usize) {
        self.episode_rewards.push(total_reward);
        self.episode_steps.push(steps);
    }

    /// Mean reward over all episodes, 0 when nothing ran
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_reward(&self) -> f64 {
        if self.episode_rewards.is_empty() {
            0.0
        } else {
            self.episode_rewards.iter().sum::<f64>() / self.episode_rewards.len() as f64
        }
    }
}

/// Trait for agents that can be trained against an environment
#[async_trait]
pub trait Learning<E>: Send
where
    E: Environment,
{
    /// Train for `schedule.num_episodes` episodes and report the per-episode rewards
    async fn train(&mut self, env: &mut E, schedule: &TrainingSchedule) -> crate::Result<TrainingReport>;
}
