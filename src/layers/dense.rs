use rand::Rng;

use crate::{activation::ActivationFunction, math::Matrix};

/// One fully connected layer: `a = f(x · W + b)`.
///
/// `weights` is `input_size × size`, `biases` is `1 × size`.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub weights: Matrix,
    pub biases: Matrix,
    pub activator: ActivationFunction,
}

impl Layer {
    /// Uniform initialization in `[-1/sqrt(fan_in), 1/sqrt(fan_in)]`.
    pub fn new<R: Rng + ?Sized>(
        size: usize,
        input_size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Layer {
        let range = 1.0 / (input_size.max(1) as f64).sqrt();
        let weights = Matrix::uniform(input_size, size, range, rng);
        let biases = Matrix::uniform(1, size, range, rng);

        Layer { weights, biases, activator: activation }
    }

    pub fn from_parts(weights: Matrix, biases: Matrix, activation: ActivationFunction) -> Layer {
        debug_assert_eq!(biases.rows, 1);
        debug_assert_eq!(weights.cols, biases.cols);
        Layer { weights, biases, activator: activation }
    }

    pub fn size(&self) -> usize {
        self.biases.cols
    }

    pub fn input_size(&self) -> usize {
        self.weights.rows
    }

    /// Returns `(z, a)`: the pre-activation and the activation for a `1 × input_size` row.
    pub fn feed(&self, input: &Matrix) -> (Matrix, Matrix) {
        let z = &(input * &self.weights) + &self.biases;
        let a = z.map(|x| self.activator.function(x));
        (z, a)
    }

    /// Computes `(weights_grad, biases_grad)` for one sample.
    ///
    /// `activation_grad` is ∂L/∂a for this layer, `pre_activation` the `z`
    /// recorded during the forward pass and `inputs` the row that fed it.
    pub fn compute_gradients(
        &self,
        activation_grad: &Matrix,
        pre_activation: &Matrix,
        inputs: &Matrix,
    ) -> (Matrix, Matrix) {
        // δ = ∂L/∂a ⊙ f'(z)
        let act_derivative = pre_activation.map(|x| self.activator.derivative(x));
        let layer_delta = activation_grad.hadamard(&act_derivative);

        let weights_grad = &inputs.transpose() * &layer_delta;
        (weights_grad, layer_delta)
    }

    /// Propagates this layer's delta back to ∂L/∂a of the previous layer.
    pub fn backpropagate(&self, layer_delta: &Matrix) -> Matrix {
        layer_delta * &self.weights.transpose()
    }

    pub fn apply_gradients(&mut self, weights_grad: &Matrix, biases_grad: &Matrix, lr: f64) {
        self.weights = &self.weights - &weights_grad.scale(lr);
        self.biases = &self.biases - &biases_grad.scale(lr);
    }
}
