use thiserror::Error;

use crate::network::{DimensionError, NetworkError, SpecError};
use crate::storage::StorageError;

/// Failure categories of the public registry surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidSpec,
    DuplicateName,
    NotFound,
    Untrained,
    EmptyDataset,
    DimensionMismatch,
    InvalidExample,
    TrainingFailed,
    Busy,
    PersistenceFailure,
    Cancelled,
}

/// Every failure of a registry operation. Each variant names the model the
/// operation was about.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid spec for model '{model}': {source}")]
    InvalidSpec {
        model: String,
        #[source]
        source: SpecError,
    },

    #[error("model '{0}' already exists")]
    DuplicateName(String),

    #[error("model '{0}' not found")]
    NotFound(String),

    #[error("model '{0}' has no trained weights; train it first")]
    Untrained(String),

    #[error("model '{0}' has no training examples")]
    EmptyDataset(String),

    #[error("dimension mismatch for model '{model}': {source}")]
    DimensionMismatch {
        model: String,
        #[source]
        source: DimensionError,
    },

    #[error("invalid example for model '{model}': {source}")]
    InvalidExample {
        model: String,
        #[source]
        source: NetworkError,
    },

    #[error("training of model '{model}' failed: {source}")]
    TrainingFailed {
        model: String,
        #[source]
        source: NetworkError,
    },

    #[error("model '{0}' is already being trained")]
    Busy(String),

    #[error("persistence failure for model '{model}': {source}")]
    PersistenceFailure {
        model: String,
        #[source]
        source: StorageError,
    },

    #[error("operation on model '{0}' was cancelled")]
    Cancelled(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::InvalidSpec { .. } => ErrorKind::InvalidSpec,
            RegistryError::DuplicateName(_) => ErrorKind::DuplicateName,
            RegistryError::NotFound(_) => ErrorKind::NotFound,
            RegistryError::Untrained(_) => ErrorKind::Untrained,
            RegistryError::EmptyDataset(_) => ErrorKind::EmptyDataset,
            RegistryError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            RegistryError::InvalidExample { .. } => ErrorKind::InvalidExample,
            RegistryError::TrainingFailed { .. } => ErrorKind::TrainingFailed,
            RegistryError::Busy(_) => ErrorKind::Busy,
            RegistryError::PersistenceFailure { .. } => ErrorKind::PersistenceFailure,
            RegistryError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// Name of the model the failed operation targeted.
    pub fn model(&self) -> &str {
        match self {
            RegistryError::InvalidSpec { model, .. }
            | RegistryError::DimensionMismatch { model, .. }
            | RegistryError::InvalidExample { model, .. }
            | RegistryError::TrainingFailed { model, .. }
            | RegistryError::PersistenceFailure { model, .. } => model,
            RegistryError::DuplicateName(model)
            | RegistryError::NotFound(model)
            | RegistryError::Untrained(model)
            | RegistryError::EmptyDataset(model)
            | RegistryError::Busy(model)
            | RegistryError::Cancelled(model) => model,
        }
    }

    pub(crate) fn invalid_spec(model: &str, source: SpecError) -> RegistryError {
        RegistryError::InvalidSpec { model: model.to_string(), source }
    }

    pub(crate) fn dimension(model: &str, source: DimensionError) -> RegistryError {
        RegistryError::DimensionMismatch { model: model.to_string(), source }
    }

    /// Cancellation surfaces as `Cancelled`; everything else as `PersistenceFailure`.
    pub(crate) fn storage(model: &str, source: StorageError) -> RegistryError {
        match source {
            StorageError::Cancelled => RegistryError::Cancelled(model.to_string()),
            source => RegistryError::PersistenceFailure { model: model.to_string(), source },
        }
    }

    pub(crate) fn network(model: &str, source: NetworkError) -> RegistryError {
        match source {
            NetworkError::DimensionMismatch(source) => RegistryError::dimension(model, source),
            NetworkError::EmptyDataset => RegistryError::EmptyDataset(model.to_string()),
            NetworkError::Cancelled => RegistryError::Cancelled(model.to_string()),
            source @ NetworkError::NonFinite { .. } => {
                RegistryError::InvalidExample { model: model.to_string(), source }
            }
            source @ (NetworkError::InvalidLearningRate(_) | NetworkError::Diverged { .. }) => {
                RegistryError::TrainingFailed { model: model.to_string(), source }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::VectorKind;

    #[test]
    fn messages_name_the_model() {
        let err = RegistryError::Untrained("xor".into());
        assert_eq!(err.kind(), ErrorKind::Untrained);
        assert_eq!(err.model(), "xor");
        assert!(err.to_string().contains("'xor'"));

        let err = RegistryError::dimension(
            "xor",
            DimensionError::Width { kind: VectorKind::Input, expected: 2, got: 3 },
        );
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        assert!(err.to_string().contains("input width expected 2, got 3"));
    }

    #[test]
    fn storage_cancellation_maps_to_cancelled() {
        assert_eq!(RegistryError::storage("m", StorageError::Cancelled).kind(), ErrorKind::Cancelled);
        let err = RegistryError::storage("m", StorageError::Backend("down".into()));
        assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn engine_errors_keep_their_kind() {
        assert_eq!(RegistryError::network("m", NetworkError::EmptyDataset).kind(), ErrorKind::EmptyDataset);
        assert_eq!(RegistryError::network("m", NetworkError::Cancelled).kind(), ErrorKind::Cancelled);
        let err = RegistryError::network("m", NetworkError::NonFinite { kind: VectorKind::Output, index: 2 });
        assert_eq!(err.kind(), ErrorKind::InvalidExample);
        assert!(err.to_string().contains("output value at index 2 is not finite"));
        let err = RegistryError::network("m", NetworkError::Diverged { epoch: 3, error: f64::NAN });
        assert_eq!(err.kind(), ErrorKind::TrainingFailed);
        assert_eq!(err.model(), "m");
    }
}
