//! Mars explorer grid world
//!
//! A rover starts in a corner of an unknown map and has to uncover as much of
//! the terrain as possible with a short-range lidar. The observation is the
//! rover's current knowledge of the map; the reward is the number of cells
//! each move reveals, minus a movement cost. Driving off the map or into a
//! rock ends the episode with a large penalty, and mapping almost all free
//! ground ends it with a bonus.

use async_trait::async_trait;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use mars_rl_core::{
    ActionSpace, BoxObservationSpace, DiscreteAction, DiscreteSpace, Environment,
    EnvironmentConfig, GridObservation, ObservationSpace, RLError, Result, Reward, Step, StepInfo,
};

/// Observation value of a cell the rover has not seen yet
pub const UNKNOWN_VALUE: f64 = 0.0;
/// Observation value of explored free ground
pub const FREE_VALUE: f64 = 0.3;
/// Observation value of the rover's own cell
pub const ROVER_VALUE: f64 = 0.6;
/// Observation value of an explored obstacle
pub const OBSTACLE_VALUE: f64 = 1.0;

/// Number of discrete moves: up, down, left, right
pub const NUM_ACTIONS: usize = 4;

/// Ground truth of a single map cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cell {
    /// Drivable ground
    Free,
    /// Rock the rover cannot enter
    Obstacle,
}

/// Mars explorer parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarsExplorerConfig {
    /// Map size as `[rows, cols]`
    pub size: [usize; 2],
    /// Rover start cell as `[row, col]`
    pub initial: [usize; 2],
    /// Keep-out half-widths around the start cell where no obstacle is placed
    pub margins: [usize; 2],
    /// Inclusive range for the number of obstacles per map
    pub obstacles: [usize; 2],
    /// Inclusive range for the side length of each rectangular obstacle
    pub obstacle_size: [usize; 2],
    /// Lidar reach, in cells
    pub lidar_range: usize,
    /// Number of lidar rays per scan
    pub lidar_channels: usize,
    /// Cost subtracted from every successful move
    pub movement_cost: f64,
    /// Reward for driving into an obstacle
    pub collision_reward: f64,
    /// Reward for driving off the map
    pub out_of_bounds_reward: f64,
    /// Bonus for reaching the exploration threshold
    pub bonus_reward: f64,
    /// Fraction of free cells that counts as fully explored
    pub exploration_threshold: f64,
    /// Episode step cap
    pub max_steps: usize,
    /// Seed for terrain generation
    pub seed: Option<u64>,
}

impl Default for MarsExplorerConfig {
    fn default() -> Self {
        Self {
            size: [21, 21],
            initial: [0, 0],
            margins: [3, 3],
            obstacles: [10, 15],
            obstacle_size: [1, 3],
            lidar_range: 6,
            lidar_channels: 32,
            movement_cost: 0.2,
            collision_reward: -400.0,
            out_of_bounds_reward: -400.0,
            bonus_reward: 400.0,
            exploration_threshold: 0.95,
            max_steps: 400,
            seed: None,
        }
    }
}

impl MarsExplorerConfig {
    /// Build a config from generic environment settings.
    ///
    /// `params` keys override the defaults one by one; unknown keys are
    /// rejected so typos do not silently fall back to defaults.
    pub fn from_env_config(config: &EnvironmentConfig) -> Result<Self> {
        let mut value = serde_json::to_value(Self::default())?;
        if let serde_json::Value::Object(ref mut fields) = value {
            for (key, param) in &config.params {
                if !fields.contains_key(key) {
                    return Err(RLError::Environment(format!(
                        "unknown Mars explorer parameter `{key}`"
                    )));
                }
                fields.insert(key.clone(), param.clone());
            }
        }

        let mut merged: Self = serde_json::from_value(value)?;
        if let Some(max_steps) = config.max_steps {
            merged.max_steps = max_steps;
        }
        if config.seed.is_some() {
            merged.seed = config.seed;
        }
        merged.validate()?;
        Ok(merged)
    }

    /// Check that the parameters describe a playable map
    pub fn validate(&self) -> Result<()> {
        let [rows, cols] = self.size;
        let invalid = |msg: String| Err(RLError::Environment(msg));

        if rows == 0 || cols == 0 {
            return invalid(format!("map size must be positive, got {rows}x{cols}"));
        }
        if self.initial[0] >= rows || self.initial[1] >= cols {
            return invalid(format!(
                "start cell {:?} is outside the {rows}x{cols} map",
                self.initial
            ));
        }
        if self.obstacles[0] > self.obstacles[1] {
            return invalid(format!("obstacle count range {:?} is inverted", self.obstacles));
        }
        if self.obstacle_size[0] == 0 || self.obstacle_size[0] > self.obstacle_size[1] {
            return invalid(format!("obstacle size range {:?} is invalid", self.obstacle_size));
        }
        if self.lidar_channels == 0 {
            return invalid("lidar needs at least one channel".into());
        }
        if !(self.exploration_threshold > 0.0 && self.exploration_threshold <= 1.0) {
            return invalid(format!(
                "exploration threshold must be in (0, 1], got {}",
                self.exploration_threshold
            ));
        }
        if self.max_steps == 0 {
            return invalid("max_steps must be at least 1".into());
        }
        Ok(())
    }
}

/// Grid-world exploration environment
pub struct MarsExplorerEnv {
    config: MarsExplorerConfig,
    terrain: Array2<Cell>,
    explored: Array2<bool>,
    position: (usize, usize),
    free_cells: usize,
    explored_free: usize,
    steps: usize,
    episode_over: bool,
    rng: StdRng,
}

impl MarsExplorerEnv {
    /// Create a new environment from generic settings
    pub fn new(config: &EnvironmentConfig) -> Result<Self> {
        Self::with_config(MarsExplorerConfig::from_env_config(config)?)
    }

    /// Create a new environment from explicit Mars explorer parameters
    pub fn with_config(config: MarsExplorerConfig) -> Result<Self> {
        config.validate()?;
        let rng = config
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let shape = (config.size[0], config.size[1]);

        Ok(Self {
            position: (config.initial[0], config.initial[1]),
            terrain: Array2::from_elem(shape, Cell::Free),
            explored: Array2::from_elem(shape, false),
            free_cells: shape.0 * shape.1,
            explored_free: 0,
            steps: 0,
            // Stepping is only legal after the first reset
            episode_over: true,
            rng,
            config,
        })
    }

    /// Active parameters
    #[must_use]
    pub fn config(&self) -> &MarsExplorerConfig {
        &self.config
    }

    /// Ground-truth terrain of the current episode
    #[must_use]
    pub fn terrain(&self) -> &Array2<Cell> {
        &self.terrain
    }

    /// Rover cell as `(row, col)`
    #[must_use]
    pub fn position(&self) -> (usize, usize) {
        self.position
    }

    /// Fraction of free cells explored so far
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn explored_ratio(&self) -> f64 {
        if self.free_cells == 0 {
            1.0
        } else {
            self.explored_free as f64 / self.free_cells as f64
        }
    }

    fn generate_terrain(&mut self) {
        let [rows, cols] = self.config.size;
        let [min_count, max_count] = self.config.obstacles;
        let [min_side, max_side] = self.config.obstacle_size;
        let [start_row, start_col] = self.config.initial;
        let [margin_rows, margin_cols] = self.config.margins;

        let keep_out_rows = start_row.saturating_sub(margin_rows)..=start_row + margin_rows;
        let keep_out_cols = start_col.saturating_sub(margin_cols)..=start_col + margin_cols;

        self.terrain.fill(Cell::Free);
        let target = self.rng.gen_range(min_count..=max_count);
        let mut placed = 0;
        let mut attempts = 0;

        while placed < target && attempts < target * 20 {
            attempts += 1;
            let height = self.rng.gen_range(min_side..=max_side);
            let width = self.rng.gen_range(min_side..=max_side);
            if height > rows || width > cols {
                continue;
            }
            let top = self.rng.gen_range(0..=rows - height);
            let left = self.rng.gen_range(0..=cols - width);
            let bottom = top + height - 1;
            let right = left + width - 1;

            let hits_keep_out = top <= *keep_out_rows.end()
                && bottom >= *keep_out_rows.start()
                && left <= *keep_out_cols.end()
                && right >= *keep_out_cols.start();
            if hits_keep_out {
                continue;
            }

            for row in top..=bottom {
                for col in left..=right {
                    self.terrain[(row, col)] = Cell::Obstacle;
                }
            }
            placed += 1;
        }

        self.free_cells = self.terrain.iter().filter(|c| **c == Cell::Free).count();
        debug!(obstacles = placed, free_cells = self.free_cells, "generated terrain");
    }

    fn mark_explored(&mut self, cell: (usize, usize)) -> bool {
        if self.explored[cell] {
            return false;
        }
        self.explored[cell] = true;
        if self.terrain[cell] == Cell::Free {
            self.explored_free += 1;
        }
        true
    }

    /// Cast the lidar from the rover and return how many cells were newly revealed
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn scan(&mut self) -> usize {
        let [rows, cols] = self.config.size;
        let (row, col) = self.position;
        let mut revealed = usize::from(self.mark_explored(self.position));

        let range = self.config.lidar_range as f64;
        let channels = self.config.lidar_channels;
        let origin = (row as f64 + 0.5, col as f64 + 0.5);

        for channel in 0..channels {
            let angle = std::f64::consts::TAU * channel as f64 / channels as f64;
            let (d_row, d_col) = (angle.sin(), angle.cos());
            let mut t = 0.5;

            while t <= range {
                let r = (origin.0 + d_row * t).floor();
                let c = (origin.1 + d_col * t).floor();
                if r < 0.0 || c < 0.0 || r >= rows as f64 || c >= cols as f64 {
                    break;
                }
                let cell = (r as usize, c as usize);
                if self.mark_explored(cell) {
                    revealed += 1;
                }
                if self.terrain[cell] == Cell::Obstacle {
                    break;
                }
                t += 0.5;
            }
        }

        revealed
    }

    fn target_cell(&self, action: DiscreteAction) -> Option<(usize, usize)> {
        let [rows, cols] = self.config.size;
        let (row, col) = self.position;
        match action.0 {
            0 => row.checked_sub(1).map(|r| (r, col)),
            1 => (row + 1 < rows).then_some((row + 1, col)),
            2 => col.checked_sub(1).map(|c| (row, c)),
            3 => (col + 1 < cols).then_some((row, col + 1)),
            _ => None,
        }
    }

    fn observation(&self) -> GridObservation {
        let [rows, cols] = self.config.size;
        let mut data = Vec::with_capacity(rows * cols);

        for ((row, col), explored) in self.explored.indexed_iter() {
            let value = if (row, col) == self.position {
                ROVER_VALUE
            } else if !*explored {
                UNKNOWN_VALUE
            } else {
                match self.terrain[(row, col)] {
                    Cell::Free => FREE_VALUE,
                    Cell::Obstacle => OBSTACLE_VALUE,
                }
            };
            data.push(value);
        }

        GridObservation { data, height: rows, width: cols }
    }

    fn ascii_map(&self) -> String {
        let mut out = String::new();
        for (row, line) in self.explored.outer_iter().enumerate() {
            for (col, explored) in line.iter().enumerate() {
                let glyph = if (row, col) == self.position {
                    'R'
                } else if !*explored {
                    '?'
                } else if self.terrain[(row, col)] == Cell::Obstacle {
                    '#'
                } else {
                    '.'
                };
                out.push(glyph);
            }
            out.push('\n');
        }
        out
    }
}

#[async_trait]
impl Environment for MarsExplorerEnv {
    type Observation = GridObservation;
    type Action = DiscreteAction;

    fn observation_space(&self) -> Box<dyn ObservationSpace<Observation = Self::Observation>> {
        Box::new(BoxObservationSpace {
            low: UNKNOWN_VALUE,
            high: OBSTACLE_VALUE,
            shape: self.config.size.to_vec(),
        })
    }

    fn action_space(&self) -> Box<dyn ActionSpace<Action = Self::Action>> {
        Box::new(DiscreteSpace::new(NUM_ACTIONS)) // 0: up, 1: down, 2: left, 3: right
    }

    fn max_episode_steps(&self) -> Option<usize> {
        Some(self.config.max_steps)
    }

    async fn reset(&mut self) -> Result<(Self::Observation, StepInfo)> {
        self.generate_terrain();
        self.explored.fill(false);
        self.explored_free = 0;
        self.position = (self.config.initial[0], self.config.initial[1]);
        self.steps = 0;
        self.episode_over = false;
        self.scan();

        let mut info = StepInfo::default();
        info.insert("explored_ratio", self.explored_ratio());
        Ok((self.observation(), info))
    }

    #[allow(clippy::cast_precision_loss)]
    async fn step(&mut self, action: Self::Action) -> Result<Step<Self::Observation>> {
        if self.episode_over {
            return Err(RLError::Environment(
                "episode is over; call reset before stepping".into(),
            ));
        }
        if action.0 >= NUM_ACTIONS {
            return Err(RLError::InvalidAction(format!("Invalid action: {}", action.0)));
        }

        self.steps += 1;
        let mut collision = false;
        let mut out_of_bounds = false;
        let mut terminal = false;

        let reward = match self.target_cell(action) {
            None => {
                out_of_bounds = true;
                terminal = true;
                self.config.out_of_bounds_reward
            }
            Some(cell) if self.terrain[cell] == Cell::Obstacle => {
                self.mark_explored(cell);
                collision = true;
                terminal = true;
                self.config.collision_reward
            }
            Some(cell) => {
                self.position = cell;
                let revealed = self.scan();
                let mut reward = revealed as f64 - self.config.movement_cost;
                if self.explored_ratio() >= self.config.exploration_threshold {
                    reward += self.config.bonus_reward;
                    terminal = true;
                }
                reward
            }
        };

        let truncated = !terminal && self.steps >= self.config.max_steps;
        let done = terminal || truncated;
        self.episode_over = done;

        let mut info = StepInfo::default();
        info.insert("explored_ratio", self.explored_ratio());
        info.insert("collision", collision);
        info.insert("out_of_bounds", out_of_bounds);
        info.insert("steps", self.steps);

        Ok(Step {
            observation: self.observation(),
            reward: Reward(reward),
            done,
            truncated,
            info,
        })
    }

    async fn render(&self) -> Result<()> {
        debug!(
            steps = self.steps,
            explored_ratio = self.explored_ratio(),
            "\n{}",
            self.ascii_map()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mars_rl_core::Observation;

    fn open_map(max_steps: usize) -> MarsExplorerEnv {
        MarsExplorerEnv::with_config(MarsExplorerConfig {
            obstacles: [0, 0],
            max_steps,
            seed: Some(11),
            ..MarsExplorerConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_spaces_and_reset() {
        let mut env = open_map(400);
        assert_eq!(env.observation_space().flat_dim(), 441);
        assert_eq!(env.action_space().cardinality(), Some(4));
        assert_eq!(env.max_episode_steps(), Some(400));

        let (obs, info) = env.reset().await.unwrap();
        assert_eq!(obs.shape(), vec![21, 21]);
        assert!(env.observation_space().contains(&obs));
        assert_eq!(obs.get(0, 0), Some(ROVER_VALUE));
        // The far corner is out of lidar range
        assert_eq!(obs.get(20, 20), Some(UNKNOWN_VALUE));
        assert!(info.get("explored_ratio").and_then(|v| v.as_f64()).unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_out_of_bounds_ends_episode() {
        let mut env = open_map(400);
        env.reset().await.unwrap();

        let step = env.step(DiscreteAction(0)).await.unwrap();
        assert_relative_eq!(step.reward.value(), -400.0);
        assert!(step.done);
        assert!(step.is_terminal());
        assert_eq!(step.info.get("out_of_bounds"), Some(&serde_json::json!(true)));
        assert_eq!(env.position(), (0, 0));
    }

    #[tokio::test]
    async fn test_collision_ends_episode() {
        let mut env = open_map(400);
        env.reset().await.unwrap();
        env.terrain[(1, 0)] = Cell::Obstacle;

        let step = env.step(DiscreteAction(1)).await.unwrap();
        assert_relative_eq!(step.reward.value(), -400.0);
        assert!(step.is_terminal());
        assert_eq!(step.info.get("collision"), Some(&serde_json::json!(true)));
        assert_eq!(step.observation.get(1, 0), Some(OBSTACLE_VALUE));
    }

    #[tokio::test]
    async fn test_moves_pay_revealed_cells_minus_cost() {
        let mut env = open_map(400);
        env.reset().await.unwrap();

        for action in [3, 3, 1, 1, 3, 1] {
            let step = env.step(DiscreteAction(action)).await.unwrap();
            assert!(step.reward.value() >= -0.2 - 1e-12);
            assert!(!step.done);
        }
        assert_eq!(env.position(), (3, 3));
    }

    #[tokio::test]
    async fn test_time_limit_truncates() {
        let mut env = open_map(3);
        env.reset().await.unwrap();

        let first = env.step(DiscreteAction(3)).await.unwrap();
        let second = env.step(DiscreteAction(2)).await.unwrap();
        let third = env.step(DiscreteAction(3)).await.unwrap();

        assert!(!first.done && !second.done);
        assert!(third.done && third.truncated);
        assert!(!third.is_terminal());
        // Revisiting already explored ground only costs the move
        assert_relative_eq!(second.reward.value(), -0.2);

        assert!(env.step(DiscreteAction(3)).await.is_err());
    }

    #[tokio::test]
    async fn test_step_before_reset_is_an_error() {
        let mut env = open_map(10);
        assert!(env.step(DiscreteAction(1)).await.is_err());
        env.reset().await.unwrap();
        assert!(matches!(
            env.step(DiscreteAction(9)).await,
            Err(RLError::InvalidAction(_))
        ));
    }

    #[tokio::test]
    async fn test_exploring_a_tiny_map_pays_the_bonus() {
        let mut env = MarsExplorerEnv::with_config(MarsExplorerConfig {
            size: [3, 3],
            obstacles: [0, 0],
            seed: Some(1),
            ..MarsExplorerConfig::default()
        })
        .unwrap();
        env.reset().await.unwrap();
        // Lidar covers the whole 3x3 map from the corner
        assert_relative_eq!(env.explored_ratio(), 1.0);

        let step = env.step(DiscreteAction(3)).await.unwrap();
        assert!(step.is_terminal());
        assert_relative_eq!(step.reward.value(), 400.0 - 0.2);
    }

    #[tokio::test]
    async fn test_terrain_respects_keep_out_and_seed() {
        let config = MarsExplorerConfig { seed: Some(42), ..MarsExplorerConfig::default() };
        let mut a = MarsExplorerEnv::with_config(config.clone()).unwrap();
        let mut b = MarsExplorerEnv::with_config(config).unwrap();

        for _ in 0..5 {
            a.reset().await.unwrap();
            b.reset().await.unwrap();
            assert_eq!(a.terrain(), b.terrain());
            for row in 0..=3 {
                for col in 0..=3 {
                    assert_eq!(a.terrain()[(row, col)], Cell::Free);
                }
            }
            assert!(a.terrain().iter().any(|c| *c == Cell::Obstacle));
        }
    }

    #[tokio::test]
    async fn test_random_rollout_stays_in_space() {
        let mut env = MarsExplorerEnv::with_config(MarsExplorerConfig {
            seed: Some(5),
            max_steps: 50,
            ..MarsExplorerConfig::default()
        })
        .unwrap();
        let space = env.observation_space();
        let actions = env.action_space();
        let mut rng = StdRng::seed_from_u64(9);

        for _ in 0..5 {
            env.reset().await.unwrap();
            let mut steps = 0;
            loop {
                let step = env.step(actions.sample(&mut rng)).await.unwrap();
                steps += 1;
                assert!(space.contains(&step.observation));
                if step.done {
                    break;
                }
            }
            assert!(steps <= 50);
            env.render().await.unwrap();
        }
    }

    #[test]
    fn test_params_merge_onto_defaults() {
        let mut config = EnvironmentConfig { seed: Some(8), max_steps: Some(100), ..Default::default() };
        config.params.insert("lidar_range".into(), serde_json::json!(4));
        config.params.insert("size".into(), serde_json::json!([10, 12]));

        let merged = MarsExplorerConfig::from_env_config(&config).unwrap();
        assert_eq!(merged.lidar_range, 4);
        assert_eq!(merged.size, [10, 12]);
        assert_eq!(merged.max_steps, 100);
        assert_eq!(merged.seed, Some(8));
        assert_relative_eq!(merged.movement_cost, 0.2);

        config.params.insert("lidar_rnage".into(), serde_json::json!(4));
        assert!(MarsExplorerConfig::from_env_config(&config).is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = MarsExplorerConfig { initial: [30, 0], ..MarsExplorerConfig::default() };
        assert!(bad.validate().is_err());
        let bad = MarsExplorerConfig { exploration_threshold: 0.0, ..MarsExplorerConfig::default() };
        assert!(bad.validate().is_err());
    }
}
