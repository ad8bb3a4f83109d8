use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::activation::ActivationFunction;

/// Stable identity of a model, used as the storage key for everything the
/// model owns. Display names never reach the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(Uuid);

impl ModelId {
    pub fn new() -> ModelId {
        ModelId(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> ModelId {
        ModelId(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ModelId {
    fn default() -> Self {
        ModelId::new()
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Reasons a `ModelSpec` is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpecError {
    #[error("model name must not be empty")]
    EmptyName,

    #[error("need at least 3 layers (input, hidden, output), got {0}")]
    TooFewLayers(usize),

    #[error("layer {0} has zero neurons")]
    ZeroWidthLayer(usize),

    #[error("error target must be a positive finite number, got {0}")]
    InvalidErrorTarget(f64),

    #[error("max epochs must be at least 1")]
    ZeroEpochs,
}

/// Topology and training targets of one named model.
///
/// Fields:
/// - `layers`       — neuron counts from input to output; at least one hidden layer
/// - `error_target` — training stops once the dataset MSE falls to this value
/// - `max_epochs`   — hard upper bound on epochs per training run
/// - `activation`   — applied in every layer; `Sigmoid` when absent from a stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub id: ModelId,
    pub name: String,
    pub layers: Vec<usize>,
    pub error_target: f64,
    pub max_epochs: usize,
    #[serde(default)]
    pub activation: ActivationFunction,
}

impl ModelSpec {
    /// Builds and validates a spec with a fresh id and the default activation.
    pub fn new(
        name: impl Into<String>,
        layers: Vec<usize>,
        error_target: f64,
        max_epochs: usize,
    ) -> Result<ModelSpec, SpecError> {
        let spec = ModelSpec {
            id: ModelId::new(),
            name: name.into(),
            layers,
            error_target,
            max_epochs,
            activation: ActivationFunction::default(),
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn with_activation(mut self, activation: ActivationFunction) -> ModelSpec {
        self.activation = activation;
        self
    }

    pub fn with_id(mut self, id: ModelId) -> ModelSpec {
        self.id = id;
        self
    }

    /// Checks every construction invariant. Specs read back from storage
    /// bypass `new`, so the registry calls this on everything it loads.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.name.trim().is_empty() {
            return Err(SpecError::EmptyName);
        }
        if self.layers.len() < 3 {
            return Err(SpecError::TooFewLayers(self.layers.len()));
        }
        if let Some(index) = self.layers.iter().position(|&size| size == 0) {
            return Err(SpecError::ZeroWidthLayer(index));
        }
        if !(self.error_target.is_finite() && self.error_target > 0.0) {
            return Err(SpecError::InvalidErrorTarget(self.error_target));
        }
        if self.max_epochs == 0 {
            return Err(SpecError::ZeroEpochs);
        }
        Ok(())
    }

    pub fn input_width(&self) -> usize {
        self.layers.first().copied().unwrap_or(0)
    }

    pub fn output_width(&self) -> usize {
        self.layers.last().copied().unwrap_or(0)
    }
}

/// Outcome of the last accepted training run, persisted alongside the spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub final_error: f64,
    pub epochs: usize,
    pub reached_target: bool,
    /// Unix time in milliseconds.
    pub trained_at_ms: u64,
    /// Checksum of the weight blob this run produced. A summary whose
    /// checksum differs from the stored blob is dropped on load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights_sha256: Option<String>,
}

impl TrainingSummary {
    pub fn now(final_error: f64, epochs: usize, reached_target: bool) -> TrainingSummary {
        let trained_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        TrainingSummary { final_error, epochs, reached_target, trained_at_ms, weights_sha256: None }
    }

    pub fn with_weights_checksum(mut self, checksum: Option<String>) -> TrainingSummary {
        self.weights_sha256 = checksum;
        self
    }
}

/// The document stored per model in the metadata store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecDocument {
    pub spec: ModelSpec,
    #[serde(default)]
    pub training: Option<TrainingSummary>,
}

impl SpecDocument {
    pub fn untrained(spec: ModelSpec) -> SpecDocument {
        SpecDocument { spec, training: None }
    }
}
