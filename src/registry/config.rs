use serde::{Deserialize, Serialize};

use crate::storage::FloatWidth;
use crate::train::TrainConfig;

/// What to do with the weights of a finished training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Every successful run replaces the current weights.
    #[default]
    AlwaysReplace,
    /// A run is kept only if its final error is strictly lower than the
    /// recorded error of the current weights.
    KeepBest,
}

/// Where a training run starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitPolicy {
    /// Freshly initialized weights every time.
    #[default]
    Fresh,
    /// Continue from the current weights when the model has them.
    WarmStart,
}

/// Registry-wide settings. Every field has a default, so a config file only
/// needs the keys it changes:
///
/// ```json
/// { "train": { "learning_rate": 0.3, "seed": 7 }, "retention": "keep_best" }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Hyperparameters for every training run. Its `cancel` and
    /// `progress_tx` are not read from here.
    pub train: TrainConfig,
    pub retention: RetentionPolicy,
    pub init: InitPolicy,
    /// Float precision of newly written weight blobs.
    pub weight_format: FloatWidth,
}

impl RegistryConfig {
    /// Serializes the config to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> std::io::Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }

    /// Deserializes a config from a JSON file; missing keys take their defaults.
    /// A learning rate that is not finite and positive is `InvalidData`.
    pub fn load_json(path: &str) -> std::io::Result<RegistryConfig> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let config: RegistryConfig = serde_json::from_reader(reader)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        config.train
            .validate()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::DEFAULT_LEARNING_RATE;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: RegistryConfig =
            serde_json::from_str(r#"{"train":{"seed":7},"retention":"keep_best"}"#).unwrap();
        assert_eq!(cfg.train.seed, Some(7));
        assert_eq!(cfg.train.learning_rate, DEFAULT_LEARNING_RATE);
        assert_eq!(cfg.train.batch_size, 1);
        assert_eq!(cfg.retention, RetentionPolicy::KeepBest);
        assert_eq!(cfg.init, InitPolicy::Fresh);
        assert_eq!(cfg.weight_format, FloatWidth::F64);
    }

    #[test]
    fn json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let path = path.to_str().unwrap();

        let mut cfg = RegistryConfig::default();
        cfg.init = InitPolicy::WarmStart;
        cfg.weight_format = FloatWidth::F32;
        cfg.train = cfg.train.with_seed(99);
        cfg.save_json(path).unwrap();

        let loaded = RegistryConfig::load_json(path).unwrap();
        assert_eq!(loaded.init, InitPolicy::WarmStart);
        assert_eq!(loaded.weight_format, FloatWidth::F32);
        assert_eq!(loaded.train.seed, Some(99));
    }

    #[test]
    fn bad_learning_rate_is_refused_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, r#"{"train":{"learning_rate":-1.0}}"#).unwrap();

        let err = RegistryConfig::load_json(path.to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
