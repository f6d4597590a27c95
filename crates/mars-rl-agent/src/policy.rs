//! Neural network policies for RL agents
//!
//! The network is a small actor-critic MLP: a shared trunk of dense layers
//! feeds a policy head (one logit per discrete action) and a scalar value
//! head. Forward and backward passes are written by hand on top of
//! `ndarray`, so no autograd backend is needed.

use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use mars_rl_core::{RLError, Result};

/// Policy network trait for RL agents
pub trait PolicyNetwork: Send + Sync {
    /// Size of the flattened observation the network expects
    fn input_dim(&self) -> usize;

    /// Number of action logits the network produces
    fn action_dim(&self) -> usize;

    /// Forward pass through the network, keeping what backprop needs
    fn forward(&self, observation: &ArrayView1<f32>) -> Result<ForwardPass>;

    /// Accumulate dLoss/dParameters into `grad`, laid out like [`PolicyNetwork::parameters`]
    fn backward(
        &self,
        pass: &ForwardPass,
        d_logits: &ArrayView1<f32>,
        d_value: f32,
        grad: &mut [f32],
    ) -> Result<()>;

    /// Total number of trainable parameters
    fn num_parameters(&self) -> usize;

    /// Get current parameters
    fn parameters(&self) -> Vec<f32>;

    /// Set parameters
    fn set_parameters(&mut self, params: &[f32]) -> Result<()>;

    /// Subtract an optimizer step from the parameters
    fn apply_update(&mut self, update: &[f32]) -> Result<()>;

    /// Clone the network
    fn clone_network(&self) -> Box<dyn PolicyNetwork>;
}

/// Output from policy network
#[derive(Debug, Clone)]
pub struct PolicyOutput {
    /// Action logits
    pub logits: Array1<f32>,
    /// State value estimate
    pub value: f32,
}

/// Network output plus the layer activations of the pass
#[derive(Debug, Clone)]
pub struct ForwardPass {
    /// Logits and value
    pub output: PolicyOutput,
    /// Input of every trunk layer, then the trunk output
    activations: Vec<Array1<f32>>,
}

/// Hidden-layer nonlinearity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// Hyperbolic tangent
    #[default]
    Tanh,
    /// Rectified linear unit
    Relu,
}

impl Activation {
    fn apply(self, x: &mut Array1<f32>) {
        match self {
            Self::Tanh => x.mapv_inplace(f32::tanh),
            Self::Relu => x.mapv_inplace(|v| v.max(0.0)),
        }
    }

    /// Derivative expressed through the activated value
    fn derivative(self, activated: f32) -> f32 {
        match self {
            Self::Tanh => 1.0 - activated * activated,
            Self::Relu => {
                if activated > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// MLP (Multi-Layer Perceptron) policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MLPConfig {
    /// Input dimension
    pub input_dim: usize,
    /// Hidden layer sizes
    pub hidden_dims: Vec<usize>,
    /// Output dimension (action space)
    pub output_dim: usize,
    /// Activation function
    pub activation: Activation,
}

impl Default for MLPConfig {
    fn default() -> Self {
        Self {
            input_dim: 441,
            hidden_dims: vec![64, 64],
            output_dim: 4,
            activation: Activation::Tanh,
        }
    }
}

impl MLPConfig {
    /// Same architecture, resized for the given observation and action sizes
    #[must_use]
    pub fn for_dims(&self, input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
            ..self.clone()
        }
    }
}

/// Fully connected layer, weights stored as `(in, out)`
#[derive(Debug, Clone)]
struct Dense {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl Dense {
    /// Xavier-uniform initialization
    #[allow(clippy::cast_precision_loss)]
    fn xavier<R: Rng + ?Sized>(in_dim: usize, out_dim: usize, gain: f32, rng: &mut R) -> Self {
        let limit = gain * (6.0 / (in_dim + out_dim) as f32).sqrt();
        let dist = Uniform::new_inclusive(-limit, limit);
        Self {
            weight: Array2::from_shape_fn((in_dim, out_dim), |_| dist.sample(&mut *rng)),
            bias: Array1::zeros(out_dim),
        }
    }

    fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }

    fn forward(&self, input: &ArrayView1<f32>) -> Array1<f32> {
        input.dot(&self.weight) + &self.bias
    }

    /// Gradient of the layer input given the gradient of its output
    fn backprop(&self, delta: &ArrayView1<f32>) -> Array1<f32> {
        self.weight.dot(delta)
    }

    /// Add `input ⊗ delta` and `delta` into this layer's gradient slice
    fn accumulate(&self, input: &ArrayView1<f32>, delta: &ArrayView1<f32>, grad: &mut [f32]) {
        let out_dim = self.bias.len();
        let (weight_grad, bias_grad) = grad.split_at_mut(self.weight.len());

        for (row, x) in weight_grad.chunks_exact_mut(out_dim).zip(input.iter()) {
            // Most map cells are unknown (zero)
            if *x == 0.0 {
                continue;
            }
            for (g, d) in row.iter_mut().zip(delta.iter()) {
                *g += x * d;
            }
        }
        for (g, d) in bias_grad.iter_mut().zip(delta.iter()) {
            *g += d;
        }
    }

    fn write_parameters(&self, out: &mut Vec<f32>) {
        out.extend(self.weight.iter().copied());
        out.extend(self.bias.iter().copied());
    }

    fn read_parameters(&mut self, params: &[f32]) {
        let (weights, biases) = params.split_at(self.weight.len());
        for (w, p) in self.weight.iter_mut().zip(weights) {
            *w = *p;
        }
        for (b, p) in self.bias.iter_mut().zip(biases) {
            *b = *p;
        }
    }

    fn subtract(&mut self, update: &[f32]) {
        let (weights, biases) = update.split_at(self.weight.len());
        for (w, u) in self.weight.iter_mut().zip(weights) {
            *w -= *u;
        }
        for (b, u) in self.bias.iter_mut().zip(biases) {
            *b -= *u;
        }
    }
}

/// Pure ndarray actor-critic MLP
#[derive(Debug, Clone)]
pub struct MLPPolicy {
    config: MLPConfig,
    trunk: Vec<Dense>,
    policy_head: Dense,
    value_head: Dense,
}

impl MLPPolicy {
    /// Create a new MLP policy with freshly initialized weights
    pub fn new<R: Rng + ?Sized>(config: MLPConfig, rng: &mut R) -> Result<Self> {
        if config.input_dim == 0 || config.output_dim == 0 || config.hidden_dims.contains(&0) {
            return Err(RLError::Agent(format!(
                "policy network dimensions must be positive: {config:?}"
            )));
        }

        let mut trunk = Vec::with_capacity(config.hidden_dims.len());
        let mut prev_dim = config.input_dim;
        for &hidden_dim in &config.hidden_dims {
            trunk.push(Dense::xavier(prev_dim, hidden_dim, 1.0, rng));
            prev_dim = hidden_dim;
        }

        // Small policy head so the initial policy is close to uniform
        let policy_head = Dense::xavier(prev_dim, config.output_dim, 0.01, rng);
        let value_head = Dense::xavier(prev_dim, 1, 1.0, rng);

        Ok(Self {
            config,
            trunk,
            policy_head,
            value_head,
        })
    }

    /// Architecture of this network
    #[must_use]
    pub fn config(&self) -> &MLPConfig {
        &self.config
    }

    fn layers(&self) -> impl Iterator<Item = &Dense> {
        self.trunk.iter().chain([&self.policy_head, &self.value_head])
    }

    fn layers_mut(&mut self) -> impl Iterator<Item = &mut Dense> {
        self.trunk
            .iter_mut()
            .chain([&mut self.policy_head, &mut self.value_head])
    }

    /// Start offset of every layer's block in the flat parameter vector
    fn layer_offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.trunk.len() + 2);
        let mut offset = 0;
        for layer in self.layers() {
            offsets.push(offset);
            offset += layer.num_parameters();
        }
        offsets
    }

    fn check_flat_len(&self, len: usize) -> Result<()> {
        let expected = self.num_parameters();
        if len == expected {
            Ok(())
        } else {
            Err(RLError::DimensionMismatch { expected, actual: len })
        }
    }
}

impl PolicyNetwork for MLPPolicy {
    fn input_dim(&self) -> usize {
        self.config.input_dim
    }

    fn action_dim(&self) -> usize {
        self.config.output_dim
    }

    fn forward(&self, observation: &ArrayView1<f32>) -> Result<ForwardPass> {
        if observation.len() != self.config.input_dim {
            return Err(RLError::DimensionMismatch {
                expected: self.config.input_dim,
                actual: observation.len(),
            });
        }

        let mut activations = Vec::with_capacity(self.trunk.len() + 1);
        let mut hidden = observation.to_owned();
        for layer in &self.trunk {
            let mut next = layer.forward(&hidden.view());
            self.config.activation.apply(&mut next);
            activations.push(std::mem::replace(&mut hidden, next));
        }

        let logits = self.policy_head.forward(&hidden.view());
        let value = self.value_head.forward(&hidden.view())[0];
        activations.push(hidden);

        if !value.is_finite() || logits.iter().any(|l| !l.is_finite()) {
            return Err(RLError::Computation(
                "policy network produced a non-finite output".into(),
            ));
        }

        Ok(ForwardPass {
            output: PolicyOutput { logits, value },
            activations,
        })
    }

    fn backward(
        &self,
        pass: &ForwardPass,
        d_logits: &ArrayView1<f32>,
        d_value: f32,
        grad: &mut [f32],
    ) -> Result<()> {
        self.check_flat_len(grad.len())?;
        if d_logits.len() != self.config.output_dim {
            return Err(RLError::DimensionMismatch {
                expected: self.config.output_dim,
                actual: d_logits.len(),
            });
        }
        let n_trunk = self.trunk.len();
        if pass.activations.len() != n_trunk + 1 {
            return Err(RLError::Computation(
                "forward pass does not belong to this network".into(),
            ));
        }

        let offsets = self.layer_offsets();
        let hidden = pass.activations[n_trunk].view();
        let d_value = Array1::from_elem(1, d_value);

        let policy_start = offsets[n_trunk];
        let value_start = offsets[n_trunk + 1];
        self.policy_head.accumulate(
            &hidden,
            d_logits,
            &mut grad[policy_start..policy_start + self.policy_head.num_parameters()],
        );
        self.value_head.accumulate(
            &hidden,
            &d_value.view(),
            &mut grad[value_start..value_start + self.value_head.num_parameters()],
        );

        let mut delta = self.policy_head.backprop(d_logits) + &self.value_head.backprop(&d_value.view());
        for (k, layer) in self.trunk.iter().enumerate().rev() {
            for (d, a) in delta.iter_mut().zip(pass.activations[k + 1].iter()) {
                *d *= self.config.activation.derivative(*a);
            }
            let start = offsets[k];
            layer.accumulate(
                &pass.activations[k].view(),
                &delta.view(),
                &mut grad[start..start + layer.num_parameters()],
            );
            if k > 0 {
                delta = layer.backprop(&delta.view());
            }
        }

        Ok(())
    }

    fn num_parameters(&self) -> usize {
        self.layers().map(Dense::num_parameters).sum()
    }

    fn parameters(&self) -> Vec<f32> {
        let mut params = Vec::with_capacity(self.num_parameters());
        for layer in self.layers() {
            layer.write_parameters(&mut params);
        }
        params
    }

    fn set_parameters(&mut self, params: &[f32]) -> Result<()> {
        self.check_flat_len(params.len())?;
        let mut offset = 0;
        for layer in self.layers_mut() {
            let size = layer.num_parameters();
            layer.read_parameters(&params[offset..offset + size]);
            offset += size;
        }
        Ok(())
    }

    fn apply_update(&mut self, update: &[f32]) -> Result<()> {
        self.check_flat_len(update.len())?;
        let mut offset = 0;
        for layer in self.layers_mut() {
            let size = layer.num_parameters();
            layer.subtract(&update[offset..offset + size]);
            offset += size;
        }
        Ok(())
    }

    fn clone_network(&self) -> Box<dyn PolicyNetwork> {
        Box::new(self.clone())
    }
}

/// Create a policy network based on configuration
pub fn create_policy_network<R: Rng + ?Sized>(
    config: &MLPConfig,
    rng: &mut R,
) -> Result<Box<dyn PolicyNetwork>> {
    Ok(Box::new(MLPPolicy::new(config.clone(), rng)?))
}
