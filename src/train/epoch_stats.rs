use serde::{Deserialize, Serialize};

/// Per-epoch statistics emitted by the training loop when a progress channel
/// is configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Upper bound on epochs for this run (`ModelSpec::max_epochs`).
    pub max_epochs: usize,
    /// Mean-squared error over the whole dataset after this epoch's updates.
    pub error: f64,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}
