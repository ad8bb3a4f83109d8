use rand::Rng;

use crate::{
    dataset::TrainingExample,
    network::error::{check_finite, check_width, VectorKind},
    network::{ModelSpec, NetworkError, NetworkWeights},
    optim::Sgd,
    train::loop_fn::train_loop,
    train::train_config::TrainConfig,
};

/// Weights produced by a training run plus how it ended.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainOutcome {
    pub weights: NetworkWeights,
    /// Dataset MSE after the last completed epoch.
    pub final_error: f64,
    pub epochs: usize,
    /// `true` when `final_error <= spec.error_target` stopped the run early.
    pub reached_target: bool,
}

/// Trains a copy of `weights` on `examples` and returns the new weights.
///
/// Runs at most `spec.max_epochs` epochs of backpropagation with MSE loss and
/// stops early once the dataset error reaches `spec.error_target`. The input
/// `weights` are never modified, so a failed or cancelled run leaves the
/// caller's copy authoritative.
///
/// # Errors
/// - `EmptyDataset` when `examples` is empty
/// - `DimensionMismatch` when an example or `weights` disagrees with `spec.layers`
/// - `NonFinite` when an example holds a NaN or infinite value
/// - `InvalidLearningRate` when `config.learning_rate` is not finite and positive
/// - `Diverged` when the dataset error becomes NaN or infinite
/// - `Cancelled` when `config.cancel` fires
pub fn train(
    weights: &NetworkWeights,
    spec: &ModelSpec,
    examples: &[TrainingExample],
    config: &TrainConfig,
) -> Result<TrainOutcome, NetworkError> {
    let mut rng = config.rng();
    train_with_rng(weights, spec, examples, config, &mut rng)
}

/// Same as [`train`] but draws shuffling randomness from `rng`, so a caller
/// that initialized the weights from a seeded rng can continue the stream.
pub fn train_with_rng<R: Rng + ?Sized>(
    weights: &NetworkWeights,
    spec: &ModelSpec,
    examples: &[TrainingExample],
    config: &TrainConfig,
    rng: &mut R,
) -> Result<TrainOutcome, NetworkError> {
    config.validate()?;
    validate_examples(spec, examples)?;
    weights.check_topology(spec)?;

    let mut network = weights.clone();
    let optimizer = Sgd::new(config.learning_rate);
    let summary = train_loop(
        &mut network,
        examples,
        spec.error_target,
        spec.max_epochs,
        &optimizer,
        config,
        rng,
    )?;

    Ok(TrainOutcome {
        weights: network,
        final_error: summary.final_error,
        epochs: summary.epochs,
        reached_target: summary.reached_target,
    })
}

/// Checks that there is at least one example, that every example's widths
/// match the spec's input and output layers and that all values are finite.
pub fn validate_examples(spec: &ModelSpec, examples: &[TrainingExample]) -> Result<(), NetworkError> {
    if examples.is_empty() {
        return Err(NetworkError::EmptyDataset);
    }
    for example in examples {
        check_example(spec, example)?;
    }
    Ok(())
}

pub(crate) fn check_example(spec: &ModelSpec, example: &TrainingExample) -> Result<(), NetworkError> {
    check_width(VectorKind::Input, spec.input_width(), example.input.len())?;
    check_width(VectorKind::Output, spec.output_width(), example.output.len())?;
    check_finite(VectorKind::Input, &example.input)?;
    check_finite(VectorKind::Output, &example.output)
}
