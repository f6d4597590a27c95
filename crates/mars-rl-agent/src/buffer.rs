//! On-policy rollout storage for PPO

use ndarray::{Array1, Array2};

/// Transitions collected since the last policy update
#[derive(Debug, Clone, Default)]
pub struct RolloutBuffer {
    observations: Vec<Array1<f32>>,
    actions: Vec<usize>,
    rewards: Vec<f32>,
    values: Vec<f32>,
    log_probs: Vec<f32>,
    terminals: Vec<bool>,
    advantages: Vec<f32>,
    returns: Vec<f32>,
    /// Index of the first transition of the episode in progress
    episode_start: usize,
}

impl RolloutBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one transition of the episode in progress
    pub fn push(
        &mut self,
        observation: Array1<f32>,
        action: usize,
        reward: f32,
        value: f32,
        log_prob: f32,
        terminal: bool,
    ) {
        self.observations.push(observation);
        self.actions.push(action);
        self.rewards.push(reward);
        self.values.push(value);
        self.log_probs.push(log_prob);
        self.terminals.push(terminal);
    }

    /// Close the episode in progress and compute its GAE advantages.
    ///
    /// `last_value` bootstraps the step after the final transition; pass 0
    /// when the episode reached a terminal state.
    pub fn finish_episode(&mut self, last_value: f32, gamma: f32, gae_lambda: f32) {
        let start = self.episode_start;
        let end = self.rewards.len();
        self.advantages.resize(end, 0.0);
        self.returns.resize(end, 0.0);

        let mut last_gae_lam = 0.0;
        let mut next_value = last_value;
        for i in (start..end).rev() {
            let next_non_terminal = if self.terminals[i] { 0.0 } else { 1.0 };
            let delta = self.rewards[i] + gamma * next_value * next_non_terminal - self.values[i];

            last_gae_lam = delta + gamma * gae_lambda * next_non_terminal * last_gae_lam;
            self.advantages[i] = last_gae_lam;
            self.returns[i] = last_gae_lam + self.values[i];
            next_value = self.values[i];
        }

        self.episode_start = end;
    }

    /// Whether every stored transition belongs to a finished episode
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.episode_start == self.rewards.len()
    }

    /// Number of stored transitions
    #[must_use]
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Check if buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Advantages of finished episodes
    #[must_use]
    pub fn advantages(&self) -> &[f32] {
        &self.advantages
    }

    /// Discounted returns of finished episodes
    #[must_use]
    pub fn returns(&self) -> &[f32] {
        &self.returns
    }

    /// Shift advantages to zero mean and unit variance
    #[allow(clippy::cast_precision_loss)]
    pub fn normalize_advantages(&mut self) {
        if self.advantages.is_empty() {
            return;
        }
        let n = self.advantages.len() as f32;
        let mean: f32 = self.advantages.iter().sum::<f32>() / n;
        let variance: f32 = self
            .advantages
            .iter()
            .map(|a| (a - mean).powi(2))
            .sum::<f32>()
            / n;
        let std = variance.sqrt() + 1e-8;

        for adv in &mut self.advantages {
            *adv = (*adv - mean) / std;
        }
    }

    /// Gather the transitions at `indices` into dense arrays
    #[must_use]
    pub fn batch(&self, indices: &[usize]) -> RolloutBatch {
        let batch_size = indices.len();
        let obs_dim = self.observations.first().map_or(0, Array1::len);

        let mut observations = Array2::zeros((batch_size, obs_dim));
        let mut actions = Vec::with_capacity(batch_size);
        let mut old_log_probs = Array1::zeros(batch_size);
        let mut advantages = Array1::zeros(batch_size);
        let mut returns = Array1::zeros(batch_size);

        for (i, &idx) in indices.iter().enumerate() {
            observations.row_mut(i).assign(&self.observations[idx]);
            actions.push(self.actions[idx]);
            old_log_probs[i] = self.log_probs[idx];
            advantages[i] = self.advantages[idx];
            returns[i] = self.returns[idx];
        }

        RolloutBatch {
            observations,
            actions,
            old_log_probs,
            advantages,
            returns,
        }
    }

    /// Drop all transitions
    pub fn clear(&mut self) {
        self.observations.clear();
        self.actions.clear();
        self.rewards.clear();
        self.values.clear();
        self.log_probs.clear();
        self.terminals.clear();
        self.advantages.clear();
        self.returns.clear();
        self.episode_start = 0;
    }
}

/// Batch of rollout data for training
#[derive(Debug, Clone)]
pub struct RolloutBatch {
    /// One flattened observation per row
    pub observations: Array2<f32>,
    /// Action taken in each observation
    pub actions: Vec<usize>,
    /// Log probability of each action under the policy that collected it
    pub old_log_probs: Array1<f32>,
    /// GAE advantages
    pub advantages: Array1<f32>,
    /// Value targets
    pub returns: Array1<f32>,
}
