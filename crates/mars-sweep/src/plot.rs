//! Learning-curve aggregation and the comparison plot

use std::path::Path;

use tracing::warn;

use crate::archive::ResultArchive;
use crate::error::{Result, SweepError};

/// Averaged reward curve of one learning rate
#[derive(Debug, Clone, PartialEq)]
pub struct LearningCurve {
    /// Learning rate the trials ran with
    pub learning_rate: f64,
    /// Legend label
    pub label: String,
    /// Mean reward per episode across the learning rate's trials
    pub points: Vec<f64>,
}

/// Split sweep results into per-learning-rate groups of `num_trials` curves.
///
/// A short trailing group (an interrupted sweep) is kept as is. Results past
/// `num_groups * num_trials` do not belong to any learning rate and are dropped.
#[must_use]
pub fn group_trials(results: &[Vec<f64>], num_groups: usize, num_trials: usize) -> Vec<&[Vec<f64>]> {
    if num_trials == 0 {
        return Vec::new();
    }
    let expected = num_groups * num_trials;
    if results.len() > expected {
        warn!(
            expected,
            actual = results.len(),
            "Archive holds more trials than the sweep describes, ignoring the rest"
        );
    }
    results[..results.len().min(expected)].chunks(num_trials).collect()
}

/// Element-wise mean of equally long curves
#[allow(clippy::cast_precision_loss)]
pub fn mean_curve(group_index: usize, group: &[Vec<f64>]) -> Result<Vec<f64>> {
    let Some(first) = group.first() else {
        return Ok(Vec::new());
    };
    if let Some(ragged) = group.iter().find(|curve| curve.len() != first.len()) {
        return Err(SweepError::RaggedGroup {
            group: group_index,
            expected: first.len(),
            actual: ragged.len(),
        });
    }

    let n = group.len() as f64;
    Ok((0..first.len())
        .map(|i| group.iter().map(|curve| curve[i]).sum::<f64>() / n)
        .collect())
}

/// Scientific notation with a signed two-digit exponent, e.g. `1.0e-04`
#[must_use]
pub fn format_scientific(value: f64, precision: usize) -> String {
    let formatted = format!("{value:.precision$e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exponent.abs())
        }
        None => formatted,
    }
}

/// Average every learning rate's trials into one curve
pub fn learning_curves(
    archive: &ResultArchive,
    learning_rates: &[f64],
    num_trials: usize,
) -> Result<Vec<LearningCurve>> {
    group_trials(&archive.ppo_lr_results, learning_rates.len(), num_trials)
        .into_iter()
        .zip(learning_rates)
        .enumerate()
        .map(|(index, (group, &learning_rate))| {
            if group.len() < num_trials {
                warn!(
                    learning_rate,
                    trials = group.len(),
                    expected = num_trials,
                    "Averaging an incomplete group"
                );
            }
            Ok(LearningCurve {
                learning_rate,
                label: format!("Learning Rate = {}", format_scientific(learning_rate, 1)),
                points: mean_curve(index, group)?,
            })
        })
        .collect()
}

/// Delete a previous plot; a missing file is fine
pub fn remove_existing_plot(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Replace `path` with a PNG drawing one line per curve
pub fn render_learning_curves(curves: &[LearningCurve], path: &Path) -> Result<()> {
    if curves.is_empty() {
        return Err(SweepError::EmptyPlot);
    }
    remove_existing_plot(path)?;
    draw_png(curves, path)
}

#[cfg(feature = "visualization")]
#[allow(clippy::cast_precision_loss)]
fn draw_png(curves: &[LearningCurve], path: &Path) -> Result<()> {
    use plotters::prelude::*;

    let episodes = curves.iter().map(|c| c.points.len()).max().unwrap_or(0).max(1);
    let (y_min, y_max) = y_range(curves);

    let root = BitMapBackend::new(path, (1200, 800)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("PPO Agent Performance Across Learning Rates", ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(0.0..episodes as f64, y_min..y_max)
        .map_err(plot_error)?;

    chart
        .configure_mesh()
        .x_desc("Episodes")
        .y_desc("Average Reward")
        .draw()
        .map_err(plot_error)?;

    for (index, curve) in curves.iter().enumerate() {
        let color = Palette99::pick(index).to_rgba();
        chart
            .draw_series(LineSeries::new(
                curve.points.iter().enumerate().map(|(i, y)| (i as f64, *y)),
                color.stroke_width(2),
            ))
            .map_err(plot_error)?
            .label(curve.label.clone())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    tracing::info!(path = %path.display(), curves = curves.len(), "Plot saved");
    Ok(())
}

#[cfg(not(feature = "visualization"))]
fn draw_png(curves: &[LearningCurve], path: &Path) -> Result<()> {
    warn!(
        path = %path.display(),
        curves = curves.len(),
        "Built without the visualization feature, no plot written"
    );
    Ok(())
}

#[cfg(feature = "visualization")]
fn plot_error<E: std::fmt::Display>(e: E) -> SweepError {
    SweepError::Plot(e.to_string())
}

/// Padded y-axis bounds covering every point
#[cfg(feature = "visualization")]
fn y_range(curves: &[LearningCurve]) -> (f64, f64) {
    let (lo, hi) = curves
        .iter()
        .flat_map(|c| c.points.iter().copied())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), y| (lo.min(y), hi.max(y)));
    if !(lo.is_finite() && hi.is_finite()) {
        return (0.0, 1.0);
    }
    let pad = if hi > lo { 0.05 * (hi - lo) } else { 1.0 };
    (lo - pad, hi + pad)
}

/// Reload an archive, average it and draw the comparison plot
pub async fn plot_archive(
    archive_path: &Path,
    learning_rates: &[f64],
    num_trials: usize,
    plot_path: &Path,
) -> Result<Vec<LearningCurve>> {
    let archive = ResultArchive::load(archive_path).await?;
    let curves = learning_curves(&archive, learning_rates, num_trials)?;
    render_learning_curves(&curves, plot_path)?;
    Ok(curves)
}
