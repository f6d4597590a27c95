//! End-to-end sweep: trials, archive on disk, aggregation

use std::path::Path;

use async_trait::async_trait;

use mars_rl_agent::MLPConfig;
use mars_rl_core::{Environment, Learning, RLError, TrainingReport, TrainingSchedule};
use mars_rl_env::{MarsExplorerConfig, MarsExplorerEnv};
use mars_sweep::{
    learning_curves, AgentFactory, PpoFactory, ResultArchive, SweepConfig, SweepDriver, SweepError,
    TrialSpec,
};

/// Agent whose rewards encode which trial produced them
struct ScriptedAgent {
    spec: TrialSpec,
}

#[async_trait]
impl<E: Environment> Learning<E> for ScriptedAgent {
    #[allow(clippy::cast_precision_loss)]
    async fn train(&mut self, env: &mut E, schedule: &TrainingSchedule) -> mars_rl_core::Result<TrainingReport> {
        env.reset().await?;
        let mut report = TrainingReport::with_capacity(schedule.num_episodes);
        for episode in 0..schedule.num_episodes {
            let reward = 100.0 * self.spec.lr_index as f64 + 10.0 * self.spec.trial as f64 + episode as f64;
            report.push_episode(reward, 1);
        }
        Ok(report)
    }
}

/// Hands out scripted agents, optionally failing at one trial
struct ScriptedFactory {
    built: Vec<TrialSpec>,
    fail_at: Option<usize>,
}

impl ScriptedFactory {
    fn new(fail_at: Option<usize>) -> Self {
        Self { built: Vec::new(), fail_at }
    }
}

impl<E: Environment> AgentFactory<E> for ScriptedFactory {
    type Agent = ScriptedAgent;

    fn build(&mut self, spec: &TrialSpec) -> mars_sweep::Result<ScriptedAgent> {
        if self.fail_at == Some(self.built.len()) {
            return Err(RLError::Agent("scripted failure".into()).into());
        }
        self.built.push(*spec);
        Ok(ScriptedAgent { spec: *spec })
    }
}

fn small_env() -> MarsExplorerEnv {
    MarsExplorerEnv::with_config(MarsExplorerConfig {
        size: [7, 7],
        margins: [1, 1],
        obstacles: [1, 2],
        max_steps: 10,
        seed: Some(4),
        ..MarsExplorerConfig::default()
    })
    .unwrap()
}

fn sweep_config(root: &Path, learning_rates: Vec<f64>, num_trials: usize, episodes: usize) -> SweepConfig {
    SweepConfig {
        learning_rates,
        num_trials,
        episodes_per_trial: episodes,
        update_interval: 1,
        results_dir: root.join("training_results"),
        plot_dir: root.join("plot_figs"),
        seed: Some(42),
        network: MLPConfig {
            hidden_dims: vec![8],
            ..MLPConfig::default()
        },
        ..SweepConfig::default()
    }
}

#[tokio::test]
async fn test_archive_holds_every_trial_in_grouped_order() {
    let root = tempfile::tempdir().unwrap();
    let config = sweep_config(root.path(), vec![1e-4, 1e-3, 1e-2], 2, 4);
    let archive_path = config.archive_path();

    let mut driver = SweepDriver::new(config, ScriptedFactory::new(None)).unwrap();
    driver.bootstrap_dirs().await.unwrap();
    let mut env = small_env();
    let archive = driver.run(&mut env).await.unwrap().clone();

    assert_eq!(archive.len(), 6);
    for (k, curve) in archive.ppo_lr_results.iter().enumerate() {
        let (lr_index, trial) = (k / 2, k % 2);
        #[allow(clippy::cast_precision_loss)]
        let first = 100.0 * lr_index as f64 + 10.0 * trial as f64;
        assert_eq!(curve, &vec![first, first + 1.0, first + 2.0, first + 3.0]);
    }

    let on_disk = ResultArchive::load(&archive_path).await.unwrap();
    assert_eq!(on_disk, archive);
    assert_eq!(on_disk.learning_rates, Some(vec![1e-4, 1e-3, 1e-2]));
    assert_eq!(on_disk.num_trials, Some(2));
    assert!(root.path().join("plot_figs").is_dir());
}

#[tokio::test]
async fn test_trial_specs_carry_sweep_position_and_seed() {
    let root = tempfile::tempdir().unwrap();
    let config = sweep_config(root.path(), vec![1e-3, 3e-4], 3, 1);

    let mut driver = SweepDriver::new(config, ScriptedFactory::new(None)).unwrap();
    driver.bootstrap_dirs().await.unwrap();
    let mut env = small_env();
    driver.run(&mut env).await.unwrap();

    let expected: Vec<TrialSpec> = (0..6)
        .map(|k| TrialSpec {
            learning_rate: if k < 3 { 1e-3 } else { 3e-4 },
            lr_index: k / 3,
            trial: k % 3,
            state_dim: 49,
            action_dim: 4,
            seed: Some(42 + k as u64),
        })
        .collect();
    assert_eq!(driver.factory().built, expected);
}

#[tokio::test]
async fn test_curves_average_each_group() {
    let root = tempfile::tempdir().unwrap();
    let config = sweep_config(root.path(), vec![1e-4, 1e-2], 3, 5);
    let archive_path = config.archive_path();

    let mut driver = SweepDriver::new(config, ScriptedFactory::new(None)).unwrap();
    driver.bootstrap_dirs().await.unwrap();
    let mut env = small_env();
    driver.run(&mut env).await.unwrap();

    let archive = ResultArchive::load(&archive_path).await.unwrap();
    let curves = learning_curves(&archive, &[1e-4, 1e-2], 3).unwrap();

    assert_eq!(curves.len(), 2);
    assert_eq!(curves[0].label, "Learning Rate = 1.0e-04");
    assert_eq!(curves[1].label, "Learning Rate = 1.0e-02");
    for (i, curve) in curves.iter().enumerate() {
        assert_eq!(curve.points.len(), 5);
        for (episode, point) in curve.points.iter().enumerate() {
            // mean over trials 0..3 of 100*i + 10*t + episode
            #[allow(clippy::cast_precision_loss)]
            let expected = 100.0 * i as f64 + 10.0 + episode as f64;
            assert!((point - expected).abs() < 1e-9);
        }
    }

    // Post-processing is a pure function of the archive
    assert_eq!(learning_curves(&archive, &[1e-4, 1e-2], 3).unwrap(), curves);
}

#[tokio::test]
async fn test_failure_keeps_completed_trials_on_disk() {
    let root = tempfile::tempdir().unwrap();
    let config = sweep_config(root.path(), vec![1e-4, 1e-3], 2, 2);
    let archive_path = config.archive_path();

    let mut driver = SweepDriver::new(config, ScriptedFactory::new(Some(3))).unwrap();
    driver.bootstrap_dirs().await.unwrap();
    let mut env = small_env();
    let err = driver.run(&mut env).await.unwrap_err();
    assert!(matches!(err, SweepError::Rl(RLError::Agent(_))));

    let archive = ResultArchive::load(&archive_path).await.unwrap();
    assert_eq!(archive.len(), 3);

    // The partial last group is still averaged
    let curves = learning_curves(&archive, &[1e-4, 1e-3], 2).unwrap();
    assert_eq!(curves.len(), 2);
    assert_eq!(curves[1].points, vec![100.0, 101.0]);
}

#[tokio::test]
async fn test_short_ppo_sweep() {
    let root = tempfile::tempdir().unwrap();
    let config = sweep_config(root.path(), vec![1e-3, 1e-2], 1, 3);
    let archive_path = config.archive_path();
    let factory = PpoFactory::from_config(&config);

    let mut driver = SweepDriver::new(config, factory).unwrap();
    driver.bootstrap_dirs().await.unwrap();
    let mut env = small_env();
    driver.run(&mut env).await.unwrap();

    let archive = ResultArchive::load(&archive_path).await.unwrap();
    assert_eq!(archive.len(), 2);
    assert!(archive.ppo_lr_results.iter().all(|curve| curve.len() == 3));
    assert!(archive
        .ppo_lr_results
        .iter()
        .flatten()
        .all(|reward| reward.is_finite()));
}
