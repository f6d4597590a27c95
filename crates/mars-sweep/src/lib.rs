//! PPO learning-rate sweep on the Mars explorer grid world
//!
//! The sweep trains a fresh PPO agent for every (learning rate, trial)
//! pair, rewrites the JSON result archive after each trial and finally
//! averages each learning rate's reward curves into a comparison plot.
//!
//! ```no_run
//! use mars_sweep::{plot_archive, PpoFactory, SweepConfig, SweepDriver};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = SweepConfig::default();
//! let mut env = mars_rl_env::make_env(&config.env_id, &config.environment)?;
//! let mut driver = SweepDriver::new(config.clone(), PpoFactory::from_config(&config))?;
//! driver.bootstrap_dirs().await?;
//! driver.run(&mut env).await?;
//! plot_archive(&config.archive_path(), &config.learning_rates, config.num_trials, &config.plot_path()).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod config;
pub mod driver;
pub mod error;
pub mod plot;
pub mod report;

pub use archive::ResultArchive;
pub use config::SweepConfig;
pub use driver::{AgentFactory, PpoFactory, SweepDriver, TrialSpec};
pub use error::{Result, SweepError};
pub use plot::{
    format_scientific, group_trials, learning_curves, mean_curve, plot_archive,
    render_learning_curves, LearningCurve,
};
pub use report::SweepReporter;
