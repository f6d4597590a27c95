//! Action representations and action spaces

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Marker trait for actions in an RL environment
pub trait Action: Clone + Debug + Send + Sync {}

/// Trait for defining action spaces
pub trait ActionSpace: Send + Sync {
    /// The type of actions in this space
    type Action: Action;

    /// Sample a random action from the space
    fn sample(&self, rng: &mut dyn RngCore) -> Self::Action;

    /// Check if an action is valid within this space
    fn contains(&self, action: &Self::Action) -> bool;

    /// Number of distinct actions, if the space is discrete
    fn cardinality(&self) -> Option<usize>;
}

/// Discrete action (index into a discrete action space)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscreteAction(pub usize);

impl Action for DiscreteAction {}

/// Discrete action space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscreteSpace {
    /// Number of discrete actions
    pub n: usize,
}

impl DiscreteSpace {
    /// Create a new discrete action space
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

impl ActionSpace for DiscreteSpace {
    type Action = DiscreteAction;

    fn sample(&self, rng: &mut dyn RngCore) -> Self::Action {
        DiscreteAction(rng.gen_range(0..self.n))
    }

    fn contains(&self, action: &Self::Action) -> bool {
        action.0 < self.n
    }

    fn cardinality(&self) -> Option<usize> {
        Some(self.n)
    }
}
