//! Reinforcement learning agents for the Mars explorer sweep
//!
//! This crate provides:
//! - An actor-critic MLP policy network with manual backpropagation
//! - An Adam optimizer with global gradient-norm clipping
//! - A rollout buffer with Generalized Advantage Estimation
//! - Proximal Policy Optimization (PPO) implementing [`mars_rl_core::Learning`]

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod buffer;
pub mod optim;
pub mod policy;
pub mod ppo;
pub mod utils;

// Re-export agents
pub use ppo::{PPOAgent, PPOConfig, UpdateStats};

// Re-export training components
pub use buffer::{RolloutBatch, RolloutBuffer};
pub use optim::{clip_grad_norm, Adam};

// Re-export policy components
pub use policy::{create_policy_network, Activation, ForwardPass, MLPConfig, MLPPolicy, PolicyNetwork};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{create_policy_network, MLPConfig, PPOAgent, PPOConfig, PolicyNetwork};
    pub use mars_rl_core::prelude::*;
}
