//! Environment traits and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Action, ActionSpace, Observation, ObservationSpace, Reward};

/// Result of a single environment step
#[derive(Debug, Clone)]
pub struct Step<O> {
    /// Observation from the environment
    pub observation: O,
    /// Reward signal
    pub reward: Reward,
    /// Whether the episode is over (terminal or truncated)
    pub done: bool,
    /// Whether the episode was cut short by a time limit
    pub truncated: bool,
    /// Additional info from the environment
    pub info: StepInfo,
}

impl<O> Step<O> {
    /// True when the episode ended in a terminal state rather than a time limit
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.done && !self.truncated
    }
}

/// Additional information from a step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepInfo {
    /// Custom fields
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl StepInfo {
    /// Insert a field, replacing any previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Look up a field
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }
}

/// Configuration for environments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Random seed
    pub seed: Option<u64>,
    /// Maximum episode steps
    pub max_steps: Option<usize>,
    /// Environment-specific parameters, merged onto the environment's defaults
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// Core environment trait
#[async_trait]
pub trait Environment: Send + Sync {
    /// Observation type
    type Observation: Observation;
    /// Action type
    type Action: Action;

    /// Get the observation space
    fn observation_space(&self) -> Box<dyn ObservationSpace<Observation = Self::Observation>>;

    /// Get the action space
    fn action_space(&self) -> Box<dyn ActionSpace<Action = Self::Action>>;

    /// Episode step cap the environment enforces on its own, if any
    fn max_episode_steps(&self) -> Option<usize> {
        None
    }

    /// Reset the environment
    async fn reset(&mut self) -> crate::Result<(Self::Observation, StepInfo)>;

    /// Take a step in the environment
    async fn step(&mut self, action: Self::Action) -> crate::Result<Step<Self::Observation>>;

    /// Render the environment (optional)
    async fn render(&self) -> crate::Result<()> {
        Ok(())
    }

    /// Close the environment
    async fn close(&mut self) -> crate::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<E> Environment for Box<E>
where
    E: Environment + ?Sized,
{
    type Observation = E::Observation;
    type Action = E::Action;

    fn observation_space(&self) -> Box<dyn ObservationSpace<Observation = Self::Observation>> {
        (**self).observation_space()
    }

    fn action_space(&self) -> Box<dyn ActionSpace<Action = Self::Action>> {
        (**self).action_space()
    }

    fn max_episode_steps(&self) -> Option<usize> {
        (**self).max_episode_steps()
    }

    async fn reset(&mut self) -> crate::Result<(Self::Observation, StepInfo)> {
        (**self).reset().await
    }

    async fn step(&mut self, action: Self::Action) -> crate::Result<Step<Self::Observation>> {
        (**self).step(action).await
    }

    async fn render(&self) -> crate::Result<()> {
        (**self).render().await
    }

    async fn close(&mut self) -> crate::Result<()> {
        (**self).close().await
    }
}
