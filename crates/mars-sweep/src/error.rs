//! Error types for the learning-rate sweep

use thiserror::Error;

use mars_rl_core::RLError;

/// Result type alias for sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Errors raised while running a sweep or plotting its results
#[derive(Error, Debug)]
pub enum SweepError {
    /// Sweep configuration cannot be run
    #[error("Invalid sweep configuration: {0}")]
    InvalidConfig(String),

    /// Trials of one learning rate have different episode counts
    #[error("Learning rate group {group} mixes curve lengths: expected {expected}, got {actual}")]
    RaggedGroup {
        /// Index of the learning rate group
        group: usize,
        /// Length of the group's first curve
        expected: usize,
        /// Length of the offending curve
        actual: usize,
    },

    /// There is nothing to draw
    #[error("No learning curves to plot")]
    EmptyPlot,

    /// Plot backend failure
    #[error("Plot error: {0}")]
    Plot(String),

    /// Archive (de)serialization failure
    #[error("Archive error: {0}")]
    Archive(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment or agent failure
    #[error(transparent)]
    Rl(#[from] RLError),
}
