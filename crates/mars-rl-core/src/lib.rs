//! Core reinforcement learning traits and types for the Mars explorer sweep
//!
//! This crate provides the foundational abstractions shared by the
//! environment, agent and sweep crates: spaces, observations, rewards,
//! the async [`Environment`] trait and the [`Learning`] trait that a
//! trainable agent exposes to the sweep driver.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod agent;
pub mod environment;
pub mod error;
pub mod observation;
pub mod reward;

// Re-export core traits and types
pub use action::{Action, ActionSpace, DiscreteAction, DiscreteSpace};
pub use agent::{AgentConfig, Learning, TrainingReport, TrainingSchedule};
pub use environment::{Environment, EnvironmentConfig, Step, StepInfo};
pub use error::{RLError, Result};
pub use observation::{BoxObservationSpace, GridObservation, Observation, ObservationSpace};
pub use reward::Reward;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Action, ActionSpace, DiscreteAction, Environment, Learning, Observation,
        ObservationSpace, Result, Reward, Step, TrainingReport, TrainingSchedule,
    };
}
