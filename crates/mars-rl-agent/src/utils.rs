//! Categorical distribution helpers used by the policy

use ndarray::{Array1, ArrayView1};
use rand::Rng;
use rand_distr::{Distribution, WeightedIndex};

use mars_rl_core::{RLError, Result};

/// Floor applied to probabilities before taking logs
const PROB_FLOOR: f32 = 1e-10;

/// Numerically stable softmax over action logits
#[must_use]
pub fn softmax(logits: &ArrayView1<f32>) -> Array1<f32> {
    let max_logit = logits.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp_logits = logits.mapv(|x| (x - max_logit).exp());
    let sum_exp = exp_logits.sum();
    exp_logits / sum_exp
}

/// Draw an action index from a categorical distribution
pub fn sample_categorical<R: Rng + ?Sized>(probs: &Array1<f32>, rng: &mut R) -> Result<usize> {
    let dist = WeightedIndex::<f32>::new(probs.iter())
        .map_err(|e| RLError::Computation(format!("invalid action distribution {probs}: {e}")))?;
    Ok(dist.sample(rng))
}

/// Log probability of `action`
#[must_use]
pub fn log_prob(probs: &Array1<f32>, action: usize) -> f32 {
    probs[action].max(PROB_FLOOR).ln()
}

/// Shannon entropy of a categorical distribution, in nats
#[must_use]
pub fn entropy(probs: &Array1<f32>) -> f32 {
    -probs
        .iter()
        .filter(|p| **p > 0.0)
        .map(|p| p * p.ln())
        .sum::<f32>()
}
