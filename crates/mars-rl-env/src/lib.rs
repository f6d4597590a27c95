//! Reinforcement learning environments for the Mars explorer sweep
//!
//! This crate provides:
//! - [`MarsExplorerEnv`], a grid world where a rover maps unknown terrain with a lidar
//! - A registry so drivers can build environments by id ([`make_env`])

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod mars;
pub mod registry;

// Re-export environments
pub use mars::{Cell, MarsExplorerConfig, MarsExplorerEnv};
pub use registry::{list_envs, make_env, register_env, EnvRegistry, GridEnvironment, MARS_EXPLORER_ID};

// Re-export core types
pub use mars_rl_core::{
    Action, ActionSpace, DiscreteAction, Environment, EnvironmentConfig, GridObservation,
    Observation, ObservationSpace, Reward, Step,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{make_env, MarsExplorerConfig, MarsExplorerEnv, MARS_EXPLORER_ID};
    pub use mars_rl_core::prelude::*;
}
