//! Proximal Policy Optimization (PPO) agent implementation

use async_trait::async_trait;
use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use mars_rl_core::{
    AgentConfig, DiscreteAction, Environment, Learning, Observation, RLError, Result, Reward,
    TrainingReport, TrainingSchedule,
};

use crate::buffer::{RolloutBatch, RolloutBuffer};
use crate::optim::{clip_grad_norm, Adam};
use crate::policy::PolicyNetwork;
use crate::utils::{entropy, log_prob, sample_categorical, softmax};

/// PPO-specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PPOConfig {
    /// Base agent configuration
    #[serde(flatten)]
    pub base: AgentConfig,
    /// Clipping parameter for PPO
    pub clip_param: f64,
    /// Number of epochs for training
    pub ppo_epochs: usize,
    /// Number of minibatches
    pub num_minibatches: usize,
    /// Value loss coefficient
    pub value_loss_coef: f64,
    /// Entropy coefficient
    pub entropy_coef: f64,
    /// Maximum gradient norm
    pub max_grad_norm: f64,
    /// GAE lambda
    pub gae_lambda: f64,
    /// Normalize advantages
    pub normalize_advantages: bool,
}

impl Default for PPOConfig {
    fn default() -> Self {
        Self {
            base: AgentConfig::default(),
            clip_param: 0.2,
            ppo_epochs: 4,
            num_minibatches: 4,
            value_loss_coef: 0.5,
            entropy_coef: 0.01,
            max_grad_norm: 0.5,
            gae_lambda: 0.95,
            normalize_advantages: true,
        }
    }
}

impl PPOConfig {
    /// Same hyperparameters with a different learning rate
    #[must_use]
    pub fn with_learning_rate(&self, learning_rate: f64) -> Self {
        let mut config = self.clone();
        config.base.learning_rate = learning_rate;
        config
    }

    /// Reject hyperparameters PPO cannot train with
    pub fn validate(&self) -> Result<()> {
        let lr = self.base.learning_rate;
        if !(lr.is_finite() && lr > 0.0) {
            return Err(RLError::Agent(format!("learning_rate must be positive, got {lr}")));
        }
        if !(0.0..=1.0).contains(&self.base.gamma) {
            return Err(RLError::Agent(format!("gamma must be in [0, 1], got {}", self.base.gamma)));
        }
        if !(0.0..=1.0).contains(&self.gae_lambda) {
            return Err(RLError::Agent(format!("gae_lambda must be in [0, 1], got {}", self.gae_lambda)));
        }
        if !(self.clip_param > 0.0 && self.clip_param < 1.0) {
            return Err(RLError::Agent(format!("clip_param must be in (0, 1), got {}", self.clip_param)));
        }
        if self.ppo_epochs == 0 || self.num_minibatches == 0 {
            return Err(RLError::Agent("ppo_epochs and num_minibatches must be at least 1".into()));
        }
        if self.max_grad_norm <= 0.0 {
            return Err(RLError::Agent("max_grad_norm must be positive".into()));
        }
        Ok(())
    }
}

/// Action chosen by the policy together with what training needs about it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// Index of the chosen action
    pub action: usize,
    /// Log probability of the action under the current policy
    pub log_prob: f32,
    /// Value estimate of the observation
    pub value: f32,
}

/// Mean losses of one policy update
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateStats {
    /// Clipped surrogate loss
    pub policy_loss: f32,
    /// Squared value error
    pub value_loss: f32,
    /// Policy entropy
    pub entropy: f32,
    /// Transitions the update trained on
    pub samples: usize,
}

/// PPO agent over a discrete action space
pub struct PPOAgent {
    config: PPOConfig,
    policy: Box<dyn PolicyNetwork>,
    optimizer: Adam,
    buffer: RolloutBuffer,
    state_dim: usize,
    action_dim: usize,
    rng: StdRng,
    total_timesteps: usize,
}

impl std::fmt::Debug for PPOAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PPOAgent")
            .field("config", &self.config)
            .field("state_dim", &self.state_dim)
            .field("action_dim", &self.action_dim)
            .field("total_timesteps", &self.total_timesteps)
            .finish_non_exhaustive()
    }
}

impl PPOAgent {
    /// Create a new PPO agent around `policy`
    pub fn new(
        policy: Box<dyn PolicyNetwork>,
        state_dim: usize,
        action_dim: usize,
        config: PPOConfig,
        seed: Option<u64>,
    ) -> Result<Self> {
        config.validate()?;
        if policy.input_dim() != state_dim {
            return Err(RLError::DimensionMismatch {
                expected: state_dim,
                actual: policy.input_dim(),
            });
        }
        if policy.action_dim() != action_dim {
            return Err(RLError::DimensionMismatch {
                expected: action_dim,
                actual: policy.action_dim(),
            });
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let optimizer = Adam::new(policy.num_parameters(), config.base.learning_rate);

        Ok(Self {
            config,
            policy,
            optimizer,
            buffer: RolloutBuffer::new(),
            state_dim,
            action_dim,
            rng,
            total_timesteps: 0,
        })
    }

    /// Agent configuration
    #[must_use]
    pub fn config(&self) -> &PPOConfig {
        &self.config
    }

    /// Learning rate the optimizer steps with
    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        self.config.base.learning_rate
    }

    /// Current policy network
    #[must_use]
    pub fn policy(&self) -> &dyn PolicyNetwork {
        self.policy.as_ref()
    }

    /// Environment steps taken over the agent's lifetime
    #[must_use]
    pub fn total_timesteps(&self) -> usize {
        self.total_timesteps
    }

    /// Flatten an observation into the network's input layout
    #[allow(clippy::cast_possible_truncation)]
    fn features<O: Observation>(&self, observation: &O) -> Result<Array1<f32>> {
        let flat = observation.to_vec();
        if flat.len() != self.state_dim {
            return Err(RLError::DimensionMismatch {
                expected: self.state_dim,
                actual: flat.len(),
            });
        }
        Ok(flat.into_iter().map(|x| x as f32).collect())
    }

    /// Sample an action from the current policy
    pub fn act(&mut self, features: &ArrayView1<f32>) -> Result<Decision> {
        let pass = self.policy.forward(features)?;
        let probs = softmax(&pass.output.logits.view());
        let action = sample_categorical(&probs, &mut self.rng)?;
        Ok(Decision {
            action,
            log_prob: log_prob(&probs, action),
            value: pass.output.value,
        })
    }

    /// Value estimate of an observation
    pub fn value(&self, features: &ArrayView1<f32>) -> Result<f32> {
        Ok(self.policy.forward(features)?.output.value)
    }

    /// Run PPO epochs over the buffered episodes and empty the buffer
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn update(&mut self) -> Result<UpdateStats> {
        let n_samples = self.buffer.len();
        if n_samples == 0 {
            return Ok(UpdateStats::default());
        }
        if !self.buffer.is_ready() {
            return Err(RLError::Agent("rollout buffer holds an unfinished episode".into()));
        }
        if self.config.normalize_advantages {
            self.buffer.normalize_advantages();
        }

        let batch_size = (n_samples / self.config.num_minibatches).max(1);
        let max_grad_norm = self.config.max_grad_norm as f32;
        let mut indices: Vec<usize> = (0..n_samples).collect();
        let mut grad = vec![0.0_f32; self.policy.num_parameters()];
        let mut totals = UpdateStats::default();

        for _ in 0..self.config.ppo_epochs {
            indices.shuffle(&mut self.rng);

            for chunk in indices.chunks(batch_size) {
                let batch = self.buffer.batch(chunk);
                grad.fill(0.0);
                let (policy_loss, value_loss, entropy) = self.accumulate_gradients(&batch, &mut grad)?;

                let scale = 1.0 / chunk.len() as f32;
                for g in &mut grad {
                    *g *= scale;
                }
                clip_grad_norm(&mut grad, max_grad_norm);
                let step = self.optimizer.step(&grad)?;
                self.policy.apply_update(&step)?;

                totals.policy_loss += policy_loss;
                totals.value_loss += value_loss;
                totals.entropy += entropy;
                totals.samples += chunk.len();
            }
        }

        self.buffer.clear();
        let seen = totals.samples as f32;
        Ok(UpdateStats {
            policy_loss: totals.policy_loss / seen,
            value_loss: totals.value_loss / seen,
            entropy: totals.entropy / seen,
            samples: n_samples,
        })
    }

    /// Add the batch's summed loss gradients into `grad`.
    ///
    /// Returns the summed surrogate loss, squared value error and entropy.
    #[allow(clippy::cast_possible_truncation)]
    fn accumulate_gradients(&self, batch: &RolloutBatch, grad: &mut [f32]) -> Result<(f32, f32, f32)> {
        let clip = self.config.clip_param as f32;
        let value_coef = self.config.value_loss_coef as f32;
        let entropy_coef = self.config.entropy_coef as f32;

        let mut policy_loss = 0.0;
        let mut value_loss = 0.0;
        let mut total_entropy = 0.0;
        let mut d_logits = Array1::zeros(self.action_dim);

        for (i, &action) in batch.actions.iter().enumerate() {
            let pass = self.policy.forward(&batch.observations.row(i))?;
            let probs = softmax(&pass.output.logits.view());
            let advantage = batch.advantages[i];

            // PPO clip objective
            let ratio = (log_prob(&probs, action) - batch.old_log_probs[i]).exp();
            let clipped_ratio = ratio.clamp(1.0 - clip, 1.0 + clip);
            let surrogate = ratio * advantage;
            let clipped_surrogate = clipped_ratio * advantage;
            policy_loss -= surrogate.min(clipped_surrogate);

            // Only the unclipped branch carries gradient
            let surrogate_coef = if surrogate <= clipped_surrogate {
                -advantage * ratio
            } else {
                0.0
            };

            let h = entropy(&probs);
            total_entropy += h;
            for (j, p) in probs.iter().enumerate() {
                let indicator = if j == action { 1.0 } else { 0.0 };
                let d_entropy = -p * (p.max(1e-10).ln() + h);
                d_logits[j] = surrogate_coef * (indicator - p) - entropy_coef * d_entropy;
            }

            let value_error = pass.output.value - batch.returns[i];
            value_loss += value_error * value_error;

            self.policy
                .backward(&pass, &d_logits.view(), 2.0 * value_coef * value_error, grad)?;
        }

        Ok((policy_loss, value_loss, total_entropy))
    }
}

#[async_trait]
impl<E> Learning<E> for PPOAgent
where
    E: Environment<Action = DiscreteAction>,
{
    #[allow(clippy::cast_possible_truncation)]
    async fn train(&mut self, env: &mut E, schedule: &TrainingSchedule) -> Result<TrainingReport> {
        schedule.validate()?;
        let gamma = self.config.base.gamma as f32;
        let gae_lambda = self.config.gae_lambda as f32;
        let mut report = TrainingReport::with_capacity(schedule.num_episodes);

        for episode in 0..schedule.num_episodes {
            let (observation, _) = env.reset().await?;
            let mut features = self.features(&observation)?;
            let mut total_reward = Reward::default();
            let mut steps = 0;
            let mut terminal = false;

            while steps < schedule.max_timesteps {
                let decision = self.act(&features.view())?;
                let step = env.step(DiscreteAction(decision.action)).await?;
                steps += 1;

                let reward = step.reward.value();
                total_reward += step.reward;
                terminal = step.is_terminal();

                let next_features = self.features(&step.observation)?;
                self.buffer.push(
                    std::mem::replace(&mut features, next_features),
                    decision.action,
                    reward as f32,
                    decision.value,
                    decision.log_prob,
                    terminal,
                );

                if step.done {
                    break;
                }
            }

            let last_value = if terminal { 0.0 } else { self.value(&features.view())? };
            self.buffer.finish_episode(last_value, gamma, gae_lambda);
            self.total_timesteps += steps;
            report.push_episode(total_reward.value(), steps);
            debug!(episode, total_reward = total_reward.value(), steps, "episode finished");

            if (episode + 1) % schedule.update_interval == 0 {
                let stats = self.update()?;
                debug!(
                    episode,
                    policy_loss = stats.policy_loss,
                    value_loss = stats.value_loss,
                    entropy = stats.entropy,
                    samples = stats.samples,
                    "policy updated"
                );
                report.actor_losses.push(f64::from(stats.policy_loss));
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{create_policy_network, MLPConfig};
    use mars_rl_env::{MarsExplorerConfig, MarsExplorerEnv};

    fn network(input_dim: usize, output_dim: usize, seed: u64) -> Box<dyn PolicyNetwork> {
        let config = MLPConfig {
            hidden_dims: vec![16],
            ..MLPConfig::default()
        }
        .for_dims(input_dim, output_dim);
        create_policy_network(&config, &mut StdRng::seed_from_u64(seed)).unwrap()
    }

    fn small_env(seed: u64) -> MarsExplorerEnv {
        MarsExplorerEnv::with_config(MarsExplorerConfig {
            size: [7, 7],
            margins: [1, 1],
            obstacles: [1, 2],
            max_steps: 20,
            seed: Some(seed),
            ..MarsExplorerConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_rejects_mismatched_network() {
        let err = PPOAgent::new(network(10, 4, 0), 12, 4, PPOConfig::default(), Some(0)).unwrap_err();
        assert!(matches!(err, RLError::DimensionMismatch { expected: 12, actual: 10 }));

        let bad = PPOConfig::default().with_learning_rate(0.0);
        assert!(PPOAgent::new(network(10, 4, 0), 10, 4, bad, Some(0)).is_err());
    }

    #[test]
    fn test_config_json_flattens_base() {
        let config: PPOConfig =
            serde_json::from_str(r#"{"learning_rate": 0.0003, "clip_param": 0.1}"#).unwrap();
        assert!((config.base.learning_rate - 3e-4).abs() < 1e-12);
        assert!((config.clip_param - 0.1).abs() < 1e-12);
        assert_eq!(config.ppo_epochs, 4);
    }

    #[test]
    fn test_update_favours_advantaged_action() {
        let config = PPOConfig {
            entropy_coef: 0.0,
            ..PPOConfig::default().with_learning_rate(1e-2)
        };
        let mut agent = PPOAgent::new(network(2, 2, 5), 2, 2, config, Some(5)).unwrap();
        let obs = Array1::from_vec(vec![1.0_f32, -1.0]);
        let prob_of_first = |agent: &PPOAgent| {
            let pass = agent.policy().forward(&obs.view()).unwrap();
            softmax(&pass.output.logits.view())[0]
        };

        let before = prob_of_first(&agent);
        for _ in 0..5 {
            for i in 0..16 {
                let action = i % 2;
                let probs = softmax(&agent.policy().forward(&obs.view()).unwrap().output.logits.view());
                let reward = if action == 0 { 1.0 } else { -1.0 };
                agent.buffer.push(obs.clone(), action, reward, 0.0, log_prob(&probs, action), true);
                agent.buffer.finish_episode(0.0, 0.99, 0.95);
            }
            let stats = agent.update().unwrap();
            assert_eq!(stats.samples, 16);
            assert!(stats.policy_loss.is_finite());
        }
        let after = prob_of_first(&agent);

        assert!(after > before, "p(first) went from {before} to {after}");
        assert!(agent.buffer.is_empty());
    }

    #[test]
    fn test_update_refuses_unfinished_episode() {
        let mut agent = PPOAgent::new(network(2, 2, 0), 2, 2, PPOConfig::default(), Some(0)).unwrap();
        assert_eq!(agent.update().unwrap(), UpdateStats::default());

        agent.buffer.push(Array1::zeros(2), 0, 1.0, 0.0, -0.7, false);
        assert!(agent.update().is_err());
    }

    #[tokio::test]
    async fn test_train_reports_every_episode() {
        let mut env = small_env(11);
        let mut agent = PPOAgent::new(network(49, 4, 1), 49, 4, PPOConfig::default(), Some(1)).unwrap();
        let schedule = TrainingSchedule {
            num_episodes: 6,
            max_timesteps: 15,
            update_interval: 2,
        };

        let report = agent.train(&mut env, &schedule).await.unwrap();

        assert_eq!(report.episode_rewards.len(), 6);
        assert_eq!(report.episode_steps.len(), 6);
        assert!(report.episode_steps.iter().all(|&s| (1..=15).contains(&s)));
        assert_eq!(report.actor_losses.len(), schedule.expected_updates());
        assert!(report.actor_losses.iter().all(|l| l.is_finite()));
        assert!(report.episode_rewards.iter().all(|r| r.is_finite()));
        assert_eq!(agent.total_timesteps(), report.episode_steps.iter().sum::<usize>());
    }

    #[tokio::test]
    async fn test_seeded_training_is_reproducible() {
        let schedule = TrainingSchedule {
            num_episodes: 4,
            max_timesteps: 10,
            update_interval: 2,
        };

        let mut reports = Vec::new();
        for _ in 0..2 {
            let mut env = small_env(21);
            let mut agent =
                PPOAgent::new(network(49, 4, 8), 49, 4, PPOConfig::default(), Some(8)).unwrap();
            reports.push(agent.train(&mut env, &schedule).await.unwrap());
        }

        assert_eq!(reports[0], reports[1]);
    }
}
