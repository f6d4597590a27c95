//! Gradient-based optimization over flat parameter vectors

use mars_rl_core::{RLError, Result};

/// Adam optimizer state
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    /// First moment estimates
    m: Vec<f32>,
    /// Second moment estimates
    v: Vec<f32>,
    /// Number of steps taken
    t: i32,
}

impl Adam {
    /// Create an optimizer for `num_parameters` parameters
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(num_parameters: usize, learning_rate: f64) -> Self {
        Self {
            learning_rate: learning_rate as f32,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            m: vec![0.0; num_parameters],
            v: vec![0.0; num_parameters],
            t: 0,
        }
    }

    /// Step size
    #[must_use]
    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    /// Number of steps taken so far
    #[must_use]
    pub fn steps(&self) -> i32 {
        self.t
    }

    /// Update the moments and return the step to subtract from the parameters
    pub fn step(&mut self, grads: &[f32]) -> Result<Vec<f32>> {
        if grads.len() != self.m.len() {
            return Err(RLError::DimensionMismatch {
                expected: self.m.len(),
                actual: grads.len(),
            });
        }

        self.t = self.t.saturating_add(1);
        let bias1 = 1.0 - self.beta1.powi(self.t);
        let bias2 = 1.0 - self.beta2.powi(self.t);

        let update = grads
            .iter()
            .zip(self.m.iter_mut().zip(self.v.iter_mut()))
            .map(|(g, (m, v))| {
                *m = self.beta1 * *m + (1.0 - self.beta1) * g;
                *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
                let m_hat = *m / bias1;
                let v_hat = *v / bias2;
                self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon)
            })
            .collect();

        Ok(update)
    }
}

/// Rescale `grads` in place so their global L2 norm is at most `max_norm`.
///
/// Returns the norm before clipping.
pub fn clip_grad_norm(grads: &mut [f32], max_norm: f32) -> f32 {
    let norm = grads.iter().map(|g| g * g).sum::<f32>().sqrt();
    if norm > max_norm && norm > 0.0 {
        let scale = max_norm / norm;
        for g in grads.iter_mut() {
            *g *= scale;
        }
    }
    norm
}
