use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    layers::Layer,
    math::Matrix,
    network::error::{check_width, DimensionError, NetworkError, VectorKind},
    network::spec::ModelSpec,
};

/// Trained parameters of one model: a dense layer per adjacent pair in
/// `ModelSpec::layers`, input side first.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkWeights {
    pub layers: Vec<Layer>,
}

/// Intermediate values recorded by a forward pass, needed for backprop.
///
/// `activations[0]` is the input row; `activations[i + 1]` and
/// `pre_activations[i]` belong to layer `i`.
pub(crate) struct ForwardTrace {
    pub activations: Vec<Matrix>,
    pub pre_activations: Vec<Matrix>,
}

impl ForwardTrace {
    pub fn output(&self) -> &[f64] {
        self.activations.last().map(Matrix::as_slice).unwrap_or(&[])
    }
}

impl NetworkWeights {
    /// Allocates weights for `spec.layers` with small uniform random values.
    pub fn initialize<R: Rng + ?Sized>(spec: &ModelSpec, rng: &mut R) -> NetworkWeights {
        let layers = spec.layers
            .windows(2)
            .map(|pair| Layer::new(pair[1], pair[0], spec.activation, &mut *rng))
            .collect();
        NetworkWeights { layers }
    }

    /// Reproducible initialization from a fixed seed.
    pub fn initialize_seeded(spec: &ModelSpec, seed: u64) -> NetworkWeights {
        NetworkWeights::initialize(spec, &mut StdRng::seed_from_u64(seed))
    }

    pub fn from_layers(layers: Vec<Layer>) -> NetworkWeights {
        NetworkWeights { layers }
    }

    /// Neuron counts from input to output, in the same shape as `ModelSpec::layers`.
    pub fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.layers.len() + 1);
        if let Some(first) = self.layers.first() {
            sizes.push(first.input_size());
        }
        sizes.extend(self.layers.iter().map(Layer::size));
        sizes
    }

    pub fn input_width(&self) -> usize {
        self.layers.first().map(Layer::input_size).unwrap_or(0)
    }

    pub fn output_width(&self) -> usize {
        self.layers.last().map(Layer::size).unwrap_or(0)
    }

    /// Total number of weights and biases.
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|l| l.weights.data.len() + l.biases.data.len()).sum()
    }

    pub fn check_topology(&self, spec: &ModelSpec) -> Result<(), DimensionError> {
        let got = self.layer_sizes();
        if got == spec.layers {
            Ok(())
        } else {
            Err(DimensionError::Topology { expected: spec.layers.clone(), got })
        }
    }

    /// Computes the output activations for `input`.
    ///
    /// Fails with `DimensionMismatch` before touching any layer when the input
    /// width is wrong.
    pub fn forward(&self, input: &[f64]) -> Result<Vec<f64>, NetworkError> {
        check_width(VectorKind::Input, self.input_width(), input.len())?;
        let mut current = Matrix::row(input.to_vec());
        for layer in &self.layers {
            let (_, a) = layer.feed(&current);
            current = a;
        }
        Ok(current.into_vec())
    }

    /// Forward pass that keeps every intermediate. The caller has already
    /// validated the input width.
    pub(crate) fn trace(&self, input: &[f64]) -> ForwardTrace {
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        activations.push(Matrix::row(input.to_vec()));
        for layer in &self.layers {
            let (z, a) = layer.feed(&activations[activations.len() - 1]);
            pre_activations.push(z);
            activations.push(a);
        }
        ForwardTrace { activations, pre_activations }
    }
}
