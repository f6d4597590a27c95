//! Mars explorer learning-rate sweep CLI

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mars_rl_env::make_env;
use mars_sweep::{
    learning_curves, plot_archive, render_learning_curves, PpoFactory, ResultArchive, SweepConfig,
    SweepDriver,
};

#[derive(Parser, Debug)]
#[command(name = "mars-sweep")]
#[command(about = "PPO learning-rate sweep on the Mars explorer grid world", version)]
struct Cli {
    /// JSON configuration file; flags override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full sweep, then plot it (default)
    Run(RunArgs),

    /// Re-render the plot from an existing archive
    Plot(PlotArgs),
}

#[derive(Args, Debug, Clone, Default)]
struct RunArgs {
    /// Comma-separated learning rates
    #[arg(long, value_delimiter = ',')]
    learning_rates: Option<Vec<f64>>,

    /// Trials per learning rate
    #[arg(long)]
    trials: Option<usize>,

    /// Episodes per trial
    #[arg(long)]
    episodes: Option<usize>,

    /// Per-episode step cap
    #[arg(long)]
    max_steps: Option<usize>,

    /// Policy update cadence, in episodes
    #[arg(long)]
    update_interval: Option<usize>,

    /// Base seed for agents
    #[arg(long)]
    seed: Option<u64>,

    /// Environment id
    #[arg(long = "env")]
    env_id: Option<String>,

    /// Directory for the result archive
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Directory for the plot
    #[arg(long)]
    plot_dir: Option<PathBuf>,

    /// Skip plotting after the sweep
    #[arg(long)]
    no_plot: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut SweepConfig) {
        if let Some(learning_rates) = &self.learning_rates {
            config.learning_rates.clone_from(learning_rates);
        }
        if let Some(trials) = self.trials {
            config.num_trials = trials;
        }
        if let Some(episodes) = self.episodes {
            config.episodes_per_trial = episodes;
        }
        if let Some(max_steps) = self.max_steps {
            config.max_steps = Some(max_steps);
        }
        if let Some(update_interval) = self.update_interval {
            config.update_interval = update_interval;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(env_id) = &self.env_id {
            config.env_id.clone_from(env_id);
        }
        if let Some(results_dir) = &self.results_dir {
            config.results_dir.clone_from(results_dir);
        }
        if let Some(plot_dir) = &self.plot_dir {
            config.plot_dir.clone_from(plot_dir);
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
struct PlotArgs {
    /// Archive to read (defaults to the configured archive path)
    #[arg(long)]
    archive: Option<PathBuf>,

    /// PNG to write (defaults to the configured plot path)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => SweepConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SweepConfig::default(),
    };

    match cli.command {
        None => {
            cli.run.apply(&mut config);
            run_sweep(config, cli.run.no_plot).await
        }
        Some(Commands::Run(args)) => {
            cli.run.apply(&mut config);
            args.apply(&mut config);
            run_sweep(config, cli.run.no_plot || args.no_plot).await
        }
        Some(Commands::Plot(args)) => replot(&config, args).await,
    }
}

async fn run_sweep(config: SweepConfig, no_plot: bool) -> Result<()> {
    let mut env = make_env(&config.env_id, &config.environment)
        .with_context(|| format!("Failed to create environment {}", config.env_id))?;

    let factory = PpoFactory::from_config(&config);
    let mut driver = SweepDriver::new(config, factory).context("Invalid sweep configuration")?;
    driver
        .bootstrap_dirs()
        .await
        .context("Failed to create output directories")?;
    driver.run(&mut env).await.context("Sweep aborted")?;

    if no_plot {
        return Ok(());
    }

    let config = driver.config();
    let plot_path = config.plot_path();
    plot_archive(&config.archive_path(), &config.learning_rates, config.num_trials, &plot_path)
        .await
        .context("Failed to plot results")?;
    info!("Plot written to {}", plot_path.display());
    Ok(())
}

async fn replot(config: &SweepConfig, args: PlotArgs) -> Result<()> {
    let archive_path = args.archive.unwrap_or_else(|| config.archive_path());
    let plot_path = args.output.unwrap_or_else(|| config.plot_path());

    let archive = ResultArchive::load(&archive_path)
        .await
        .with_context(|| format!("Failed to read archive {}", archive_path.display()))?;
    let learning_rates = archive
        .learning_rates
        .clone()
        .unwrap_or_else(|| config.learning_rates.clone());
    let num_trials = archive.num_trials.unwrap_or(config.num_trials);

    if let Some(parent) = plot_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let curves = learning_curves(&archive, &learning_rates, num_trials)?;
    render_learning_curves(&curves, &plot_path).context("Failed to plot results")?;
    info!(curves = curves.len(), "Plot written to {}", plot_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments_runs_default_sweep() {
        let cli = Cli::try_parse_from(["mars-sweep"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());

        let mut config = SweepConfig::default();
        cli.run.apply(&mut config);
        assert_eq!(config, SweepConfig::default());
    }

    #[test]
    fn test_run_overrides() {
        let cli = Cli::try_parse_from([
            "mars-sweep",
            "--config",
            "sweep.json",
            "run",
            "--learning-rates",
            "0.001,0.0003",
            "--trials",
            "2",
            "--episodes",
            "50",
            "--max-steps",
            "100",
            "--update-interval",
            "5",
            "--seed",
            "7",
            "--env",
            "mars-explorer-small",
            "--results-dir",
            "out/results",
            "--no-plot",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("sweep.json")));

        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run command");
        };
        let mut config = SweepConfig::default();
        args.apply(&mut config);

        assert_eq!(config.learning_rates, vec![0.001, 0.0003]);
        assert_eq!(config.num_trials, 2);
        assert_eq!(config.episodes_per_trial, 50);
        assert_eq!(config.max_steps, Some(100));
        assert_eq!(config.update_interval, 5);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.env_id, "mars-explorer-small");
        assert_eq!(config.results_dir, PathBuf::from("out/results"));
        assert_eq!(config.plot_dir, PathBuf::from("plot_figs"));
        assert!(args.no_plot);
    }

    #[test]
    fn test_top_level_overrides_without_subcommand() {
        let cli = Cli::try_parse_from(["mars-sweep", "--trials", "3"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.run.trials, Some(3));
    }

    #[test]
    fn test_plot_command() {
        let cli = Cli::try_parse_from(["mars-sweep", "plot", "--archive", "a.json", "--output", "p.png"])
            .unwrap();
        let Some(Commands::Plot(args)) = cli.command else {
            panic!("expected plot command");
        };
        assert_eq!(args.archive, Some(PathBuf::from("a.json")));
        assert_eq!(args.output, Some(PathBuf::from("p.png")));
    }
}
