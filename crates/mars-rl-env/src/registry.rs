//! Environment registry for creating environments by id

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use mars_rl_core::{DiscreteAction, Environment, EnvironmentConfig, GridObservation, RLError, Result};

use crate::mars::MarsExplorerEnv;

/// Id of the built-in Mars explorer environment
pub const MARS_EXPLORER_ID: &str = "mars-explorer-v1";

/// Type-erased grid environment with discrete actions
pub type GridEnvironment = dyn Environment<Observation = GridObservation, Action = DiscreteAction>;

type EnvConstructor = Arc<dyn Fn(&EnvironmentConfig) -> Result<Box<GridEnvironment>> + Send + Sync>;

lazy_static::lazy_static! {
    static ref REGISTRY: Mutex<EnvRegistry> = Mutex::new(EnvRegistry::with_builtin());
}

/// Maps environment ids to constructors
pub struct EnvRegistry {
    /// Registered environments
    envs: HashMap<String, EnvConstructor>,
}

impl EnvRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            envs: HashMap::new(),
        }
    }

    /// Create a registry holding the built-in environments
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(MARS_EXPLORER_ID, |config| {
            Ok(Box::new(MarsExplorerEnv::new(config)?) as Box<GridEnvironment>)
        });
        registry
    }

    /// Register an environment, replacing any previous constructor for `name`
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&EnvironmentConfig) -> Result<Box<GridEnvironment>> + Send + Sync + 'static,
    {
        self.envs.insert(name.into(), Arc::new(constructor));
    }

    /// Create an environment by name
    pub fn make(&self, name: &str, config: &EnvironmentConfig) -> Result<Box<GridEnvironment>> {
        self.constructor(name)?(config)
    }

    fn constructor(&self, name: &str) -> Result<EnvConstructor> {
        self.envs
            .get(name)
            .cloned()
            .ok_or_else(|| RLError::Environment(format!("Unknown environment: {name}")))
    }

    /// List registered environments, sorted
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.envs.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for EnvRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> RLError {
    RLError::Environment("environment registry lock poisoned".into())
}

/// Register an environment globally
pub fn register_env<F>(name: impl Into<String>, constructor: F) -> Result<()>
where
    F: Fn(&EnvironmentConfig) -> Result<Box<GridEnvironment>> + Send + Sync + 'static,
{
    REGISTRY.lock().map_err(|_| poisoned())?.register(name, constructor);
    Ok(())
}

/// Create an environment by name.
///
/// The registry lock is released before the constructor runs, so constructors
/// may themselves call [`make_env`] or [`register_env`].
pub fn make_env(name: &str, config: &EnvironmentConfig) -> Result<Box<GridEnvironment>> {
    let constructor = REGISTRY.lock().map_err(|_| poisoned())?.constructor(name)?;
    constructor(config)
}

/// List all registered environments
pub fn list_envs() -> Result<Vec<String>> {
    Ok(REGISTRY.lock().map_err(|_| poisoned())?.list())
}
