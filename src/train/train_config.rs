use std::sync::mpsc;

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::network::NetworkError;
use crate::train::epoch_stats::EpochStats;

/// Default gradient-descent step size.
pub const DEFAULT_LEARNING_RATE: f64 = 0.5;

/// Configuration for a training run.
///
/// # Fields
/// - `learning_rate` — gradient-descent step size
/// - `batch_size`    — samples per mini-batch; `1` is online SGD, anything at
///                     least the dataset size is full-batch. `0` is treated as `1`.
/// - `seed`          — seeds weight initialization and per-epoch shuffling.
///                     `None` draws a seed from OS entropy, so runs differ.
/// - `progress_tx`   — optional channel; one `EpochStats` is sent per
///                     completed epoch. A dropped receiver is ignored.
/// - `cancel`        — checked at every epoch and mini-batch boundary.
///
/// Only the first three fields are read from configuration files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub seed: Option<u64>,
    #[serde(skip)]
    pub progress_tx: Option<mpsc::Sender<EpochStats>>,
    #[serde(skip)]
    pub cancel: CancelToken,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig::new(DEFAULT_LEARNING_RATE, 1)
    }
}

impl TrainConfig {
    /// Creates a config with no seed, no progress channel and a token that never fires.
    pub fn new(learning_rate: f64, batch_size: usize) -> Self {
        TrainConfig {
            learning_rate,
            batch_size,
            seed: None,
            progress_tx: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<EpochStats>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Rejects a learning rate that is zero, negative, NaN or infinite.
    pub fn validate(&self) -> Result<(), NetworkError> {
        if self.learning_rate.is_finite() && self.learning_rate > 0.0 {
            Ok(())
        } else {
            Err(NetworkError::InvalidLearningRate(self.learning_rate))
        }
    }

    /// The random source for one run: seeded when `seed` is set.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}
