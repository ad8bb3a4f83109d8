use std::time::Instant;

use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::cancel::CancelToken;
use crate::dataset::TrainingExample;
use crate::loss::MseLoss;
use crate::math::Matrix;
use crate::network::{NetworkError, NetworkWeights};
use crate::optim::Sgd;
use crate::train::epoch_stats::EpochStats;
use crate::train::train_config::TrainConfig;

/// Result of a completed (not cancelled) loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LoopSummary {
    pub epochs: usize,
    pub final_error: f64,
    pub reached_target: bool,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Trains `network` in place for at most `max_epochs` epochs.
///
/// After each epoch the MSE over the full dataset is evaluated; the loop
/// returns as soon as it is at or below `error_target`. Examples must already
/// be validated against the network's topology and non-empty.
///
/// A dataset error that stops being finite ends the run with
/// `NetworkError::Diverged`.
///
/// # Cancellation
/// `config.cancel` is checked before every epoch and every mini-batch. A
/// cancelled run returns `NetworkError::Cancelled` and leaves `network`
/// partially updated; callers train a copy.
pub(crate) fn train_loop<R: Rng + ?Sized>(
    network: &mut NetworkWeights,
    examples: &[TrainingExample],
    error_target: f64,
    max_epochs: usize,
    optimizer: &Sgd,
    config: &TrainConfig,
    rng: &mut R,
) -> Result<LoopSummary, NetworkError> {
    let batch_size = config.batch_size.max(1);
    let mut indices: Vec<usize> = (0..examples.len()).collect();
    let mut summary = LoopSummary {
        epochs: 0,
        final_error: dataset_error(network, examples),
        reached_target: false,
    };

    for epoch in 1..=max_epochs {
        if config.cancel.is_cancelled() {
            return Err(NetworkError::Cancelled);
        }

        let t_start = Instant::now();

        indices.shuffle(rng);
        run_one_epoch(network, examples, &indices, optimizer, batch_size, &config.cancel)?;

        let error = dataset_error(network, examples);
        summary.epochs = epoch;
        summary.final_error = error;

        let stats = EpochStats {
            epoch,
            max_epochs,
            error,
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        };
        debug!("epoch {}/{}: mse={:.6} ({} ms)", epoch, max_epochs, error, stats.elapsed_ms);

        if let Some(ref tx) = config.progress_tx {
            let _ = tx.send(stats);
        }

        if !error.is_finite() {
            return Err(NetworkError::Diverged { epoch, error });
        }

        if error <= error_target {
            summary.reached_target = true;
            break;
        }
    }

    Ok(summary)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// One pass of mini-batch backpropagation in the order given by `indices`.
fn run_one_epoch(
    network: &mut NetworkWeights,
    examples: &[TrainingExample],
    indices: &[usize],
    optimizer: &Sgd,
    batch_size: usize,
    cancel: &CancelToken,
) -> Result<(), NetworkError> {
    for batch in indices.chunks(batch_size) {
        if cancel.is_cancelled() {
            return Err(NetworkError::Cancelled);
        }

        let mut acc_grads: Vec<(Matrix, Matrix)> = network.layers.iter()
            .map(|layer| (
                Matrix::zeros(layer.weights.rows, layer.weights.cols),
                Matrix::zeros(layer.biases.rows, layer.biases.cols),
            ))
            .collect();

        for &idx in batch {
            let example = &examples[idx];
            let trace = network.trace(&example.input);

            // ∂L/∂a at the output layer.
            let mut grad = Matrix::row(MseLoss::derivative(trace.output(), &example.output));

            for i in (0..network.layers.len()).rev() {
                let layer = &network.layers[i];
                let (w_grad, b_grad) = layer.compute_gradients(
                    &grad,
                    &trace.pre_activations[i],
                    &trace.activations[i],
                );

                if i > 0 {
                    grad = layer.backpropagate(&b_grad);
                }

                acc_grads[i].0 = &acc_grads[i].0 + &w_grad;
                acc_grads[i].1 = &acc_grads[i].1 + &b_grad;
            }
        }

        let inv_batch = 1.0 / batch.len() as f64;
        for (layer, (w_acc, b_acc)) in network.layers.iter_mut().zip(acc_grads) {
            optimizer.step(layer, &w_acc.scale(inv_batch), &b_acc.scale(inv_batch));
        }
    }
    Ok(())
}

/// Mean over examples of the per-example MSE.
pub(crate) fn dataset_error(network: &NetworkWeights, examples: &[TrainingExample]) -> f64 {
    if examples.is_empty() {
        return 0.0;
    }
    let total: f64 = examples.iter()
        .map(|example| MseLoss::loss(network.trace(&example.input).output(), &example.output))
        .sum();
    total / examples.len() as f64
}
