use std::fmt;

use thiserror::Error;

/// Which vector of a sample a width check was about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorKind {
    Input,
    Output,
}

impl fmt::Display for VectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorKind::Input => write!(f, "input"),
            VectorKind::Output => write!(f, "output"),
        }
    }
}

/// A vector or topology that disagrees with the model's layer sizes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DimensionError {
    #[error("{kind} width expected {expected}, got {got}")]
    Width { kind: VectorKind, expected: usize, got: usize },

    #[error("layer sizes expected {expected:?}, got {got:?}")]
    Topology { expected: Vec<usize>, got: Vec<usize> },
}

/// Failures raised by the network engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetworkError {
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(#[from] DimensionError),

    #[error("no training examples")]
    EmptyDataset,

    #[error("training cancelled")]
    Cancelled,

    #[error("{kind} value at index {index} is not finite")]
    NonFinite { kind: VectorKind, index: usize },

    #[error("learning rate must be finite and positive, got {0}")]
    InvalidLearningRate(f64),

    #[error("training diverged at epoch {epoch}: dataset error is {error}")]
    Diverged { epoch: usize, error: f64 },
}

pub(crate) fn check_width(kind: VectorKind, expected: usize, got: usize) -> Result<(), DimensionError> {
    if expected == got {
        Ok(())
    } else {
        Err(DimensionError::Width { kind, expected, got })
    }
}

pub(crate) fn check_finite(kind: VectorKind, values: &[f64]) -> Result<(), NetworkError> {
    match values.iter().position(|value| !value.is_finite()) {
        Some(index) => Err(NetworkError::NonFinite { kind, index }),
        None => Ok(()),
    }
}
