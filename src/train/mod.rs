pub mod epoch_stats;
pub mod loop_fn;
pub mod train_config;
pub mod trainer;

pub use epoch_stats::EpochStats;
pub use train_config::{TrainConfig, DEFAULT_LEARNING_RATE};
pub use trainer::{train, train_with_rng, validate_examples, TrainOutcome};

#[cfg(test)]
pub(crate) use loop_fn::dataset_error as train_loop_error;
