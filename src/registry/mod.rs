pub mod config;
pub mod model;
pub mod registry;

pub use config::{InitPolicy, RegistryConfig, RetentionPolicy};
pub use model::{ModelInfo, ModelState, TrainReport};
pub use registry::Registry;
