//! Progress reporting for a running sweep

use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use mars_rl_core::TrainingReport;

/// Logs one line per finished trial and a summary at the end.
///
/// Each learning rate also gets a progress bar over its trials, whose message
/// carries the latest trial mean.
#[derive(Debug)]
pub struct SweepReporter {
    learning_rates: Vec<f64>,
    num_trials: usize,
    started: Instant,
    /// Mean reward of each finished trial, per learning rate
    trial_means: Vec<Vec<f64>>,
    bar: Option<(usize, ProgressBar)>,
}

fn new_group_bar(lr: f64, num_trials: u64) -> ProgressBar {
    let style = ProgressStyle::default_bar()
        .template("{prefix} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        .map_or_else(|_| ProgressStyle::default_bar(), |s| s.progress_chars("#>-"));
    let bar = ProgressBar::new(num_trials).with_style(style);
    bar.set_prefix(format!("lr {lr:e}"));
    bar
}

impl SweepReporter {
    /// Create a reporter for a sweep over `learning_rates`
    #[must_use]
    pub fn new(learning_rates: &[f64], num_trials: usize) -> Self {
        Self {
            learning_rates: learning_rates.to_vec(),
            num_trials,
            started: Instant::now(),
            trial_means: vec![Vec::with_capacity(num_trials); learning_rates.len()],
            bar: None,
        }
    }

    fn group_bar(&mut self, lr_index: usize) -> &ProgressBar {
        if matches!(&self.bar, Some((index, _)) if *index != lr_index) {
            if let Some((_, old)) = self.bar.take() {
                old.abandon();
            }
        }
        let lr = self.learning_rates.get(lr_index).copied().unwrap_or(f64::NAN);
        let num_trials = self.num_trials as u64;
        let (_, bar) = self
            .bar
            .get_or_insert_with(|| (lr_index, new_group_bar(lr, num_trials)));
        bar
    }

    /// Record a finished trial and log its mean reward. Returns that mean.
    pub fn trial_finished(&mut self, lr_index: usize, trial: usize, report: &TrainingReport) -> f64 {
        let mean = report.mean_reward();
        let lr = self.learning_rates.get(lr_index).copied().unwrap_or(f64::NAN);
        if let Some(means) = self.trial_means.get_mut(lr_index) {
            means.push(mean);
        }
        let running_mean = self.running_mean(lr_index).unwrap_or(mean);

        let num_trials = self.num_trials;
        let bar = self.group_bar(lr_index);
        bar.set_message(format!("Average Reward for learning rate: {lr} is {mean:.2}"));
        bar.inc(1);
        if trial + 1 >= num_trials {
            bar.finish();
        }

        info!(
            trial = %format!("{}/{}", trial + 1, self.num_trials),
            running_mean = %format!("{running_mean:.2}"),
            elapsed_secs = self.started.elapsed().as_secs(),
            "Average Reward for learning rate: {lr} is {mean:.2}"
        );
        mean
    }

    /// Mean over the finished trials of one learning rate
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn running_mean(&self, lr_index: usize) -> Option<f64> {
        let means = self.trial_means.get(lr_index)?;
        if means.is_empty() {
            None
        } else {
            Some(means.iter().sum::<f64>() / means.len() as f64)
        }
    }

    /// Log the per-learning-rate summary
    pub fn sweep_finished(&self) {
        for (index, lr) in self.learning_rates.iter().enumerate() {
            let trials = self.trial_means[index].len();
            match self.running_mean(index) {
                Some(mean) => info!(learning_rate = lr, trials, "Mean reward {mean:.2}"),
                None => info!(learning_rate = lr, "No finished trials"),
            }
        }
        info!(elapsed_secs = self.started.elapsed().as_secs(), "Sweep finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn report(rewards: &[f64]) -> TrainingReport {
        let mut report = TrainingReport::default();
        for r in rewards {
            report.push_episode(*r, 1);
        }
        report
    }

    #[test]
    fn test_running_mean_per_learning_rate() {
        let mut reporter = SweepReporter::new(&[1e-3, 1e-2], 2);

        assert_relative_eq!(reporter.trial_finished(0, 0, &report(&[1.0, 3.0])), 2.0);
        assert_relative_eq!(reporter.trial_finished(0, 1, &report(&[4.0])), 4.0);
        reporter.trial_finished(1, 0, &report(&[-10.0]));

        assert_relative_eq!(reporter.running_mean(0).unwrap(), 3.0);
        assert_relative_eq!(reporter.running_mean(1).unwrap(), -10.0);
        assert!(reporter.running_mean(2).is_none());
        reporter.sweep_finished();
    }

    #[test]
    fn test_progress_bar_per_learning_rate() {
        let mut reporter = SweepReporter::new(&[1e-3, 1e-2], 2);

        reporter.trial_finished(0, 0, &report(&[5.0]));
        let (index, bar) = reporter.bar.clone().unwrap();
        assert_eq!(index, 0);
        assert_eq!(bar.position(), 1);
        assert_eq!(bar.message(), "Average Reward for learning rate: 0.001 is 5.00");
        assert!(!bar.is_finished());

        reporter.trial_finished(0, 1, &report(&[7.0]));
        assert!(bar.is_finished());

        reporter.trial_finished(1, 0, &report(&[1.0]));
        let (index, next) = reporter.bar.clone().unwrap();
        assert_eq!(index, 1);
        assert_eq!(next.position(), 1);
        assert_eq!(next.length(), Some(2));
    }

    #[test]
    fn test_empty_trial_reports_zero() {
        let mut reporter = SweepReporter::new(&[1e-4], 1);
        assert_relative_eq!(reporter.trial_finished(0, 0, &TrainingReport::default()), 0.0);
    }
}
