//! Sequential learning-rate sweep

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use mars_rl_agent::{create_policy_network, MLPConfig, PPOAgent, PPOConfig};
use mars_rl_core::{DiscreteAction, Environment, Learning};

use crate::archive::ResultArchive;
use crate::config::SweepConfig;
use crate::error::{Result, SweepError};
use crate::report::SweepReporter;

/// What a factory needs to know to build the agent for one trial
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialSpec {
    /// Learning rate of this sweep point
    pub learning_rate: f64,
    /// Position of the learning rate in the sweep
    pub lr_index: usize,
    /// Trial number within the learning rate, from 0
    pub trial: usize,
    /// Flattened observation size
    pub state_dim: usize,
    /// Number of discrete actions
    pub action_dim: usize,
    /// Seed for weights and sampling, if the sweep is seeded
    pub seed: Option<u64>,
}

/// Builds a fresh, untrained agent per trial
pub trait AgentFactory<E: Environment> {
    /// Agent type produced
    type Agent: Learning<E>;

    /// Build the agent for `spec`
    fn build(&mut self, spec: &TrialSpec) -> Result<Self::Agent>;
}

/// Builds PPO agents around freshly initialized MLP policies
#[derive(Debug, Clone)]
pub struct PpoFactory {
    ppo: PPOConfig,
    network: MLPConfig,
}

impl PpoFactory {
    /// Create a factory from PPO hyperparameters and a network architecture
    #[must_use]
    pub fn new(ppo: PPOConfig, network: MLPConfig) -> Self {
        Self { ppo, network }
    }

    /// Factory for the agent settings of a sweep configuration
    #[must_use]
    pub fn from_config(config: &SweepConfig) -> Self {
        Self::new(config.agent.clone(), config.network.clone())
    }
}

impl<E> AgentFactory<E> for PpoFactory
where
    E: Environment<Action = DiscreteAction>,
{
    type Agent = PPOAgent;

    fn build(&mut self, spec: &TrialSpec) -> Result<PPOAgent> {
        let mut rng = match spec.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let network = create_policy_network(
            &self.network.for_dims(spec.state_dim, spec.action_dim),
            &mut rng,
        )?;
        let agent_seed = spec.seed.map(|_| rng.gen::<u64>());

        Ok(PPOAgent::new(
            network,
            spec.state_dim,
            spec.action_dim,
            self.ppo.with_learning_rate(spec.learning_rate),
            agent_seed,
        )?)
    }
}

/// Runs every trial of a sweep and keeps the archive on disk current
#[derive(Debug)]
pub struct SweepDriver<F> {
    config: SweepConfig,
    factory: F,
    archive: ResultArchive,
}

impl<F> SweepDriver<F> {
    /// Create a driver; fails if the configuration cannot run
    pub fn new(config: SweepConfig, factory: F) -> Result<Self> {
        config.validate()?;
        let archive = ResultArchive::new(&config.learning_rates, config.num_trials);
        Ok(Self {
            config,
            factory,
            archive,
        })
    }

    /// Sweep configuration
    #[must_use]
    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Agent factory
    #[must_use]
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Results accumulated so far
    #[must_use]
    pub fn archive(&self) -> &ResultArchive {
        &self.archive
    }

    /// Create the results and plot directories
    pub async fn bootstrap_dirs(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.results_dir).await?;
        tokio::fs::create_dir_all(&self.config.plot_dir).await?;
        Ok(())
    }

    /// Seed of the `k`-th trial of the sweep
    fn trial_seed(&self, lr_index: usize, trial: usize) -> Option<u64> {
        let k = (lr_index * self.config.num_trials + trial) as u64;
        self.config.seed.map(|seed| seed.wrapping_add(k))
    }

    /// Train every (learning rate, trial) pair in order, saving after each trial
    pub async fn run<E>(&mut self, env: &mut E) -> Result<&ResultArchive>
    where
        E: Environment,
        F: AgentFactory<E>,
    {
        let state_dim = env.observation_space().flat_dim();
        let action_dim = env.action_space().cardinality().ok_or_else(|| {
            SweepError::InvalidConfig("the environment's action space is not discrete".into())
        })?;
        let max_steps = self
            .config
            .max_steps
            .or_else(|| env.max_episode_steps())
            .ok_or_else(|| {
                SweepError::InvalidConfig(
                    "max_steps is unset and the environment has no episode limit".into(),
                )
            })?;
        let schedule = self.config.schedule(max_steps);
        let archive_path = self.config.archive_path();
        let learning_rates = self.config.learning_rates.clone();
        let num_trials = self.config.num_trials;
        let mut reporter = SweepReporter::new(&learning_rates, num_trials);

        info!(
            learning_rates = ?learning_rates,
            num_trials,
            episodes = schedule.num_episodes,
            max_steps,
            state_dim,
            action_dim,
            "Starting learning-rate sweep"
        );

        for (lr_index, &learning_rate) in learning_rates.iter().enumerate() {
            for trial in 0..num_trials {
                let spec = TrialSpec {
                    learning_rate,
                    lr_index,
                    trial,
                    state_dim,
                    action_dim,
                    seed: self.trial_seed(lr_index, trial),
                };
                let mut agent = self.factory.build(&spec)?;
                let report = agent.train(env, &schedule).await?;

                self.archive.push_trial(report.episode_rewards.clone());
                self.archive.save(&archive_path).await?;
                info!("Results saved to {}", archive_path.display());

                reporter.trial_finished(lr_index, trial, &report);
            }
        }

        reporter.sweep_finished();
        env.close().await?;
        Ok(&self.archive)
    }
}
