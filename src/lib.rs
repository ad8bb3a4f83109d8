pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod train;
pub mod cancel;
pub mod dataset;
pub mod storage;
pub mod error;
pub mod registry;

// Convenience re-exports
pub use math::matrix::Matrix;
pub use activation::activation::ActivationFunction;
pub use layers::dense::Layer;
pub use network::network::NetworkWeights;
pub use network::spec::{ModelId, ModelSpec};
pub use loss::mse::MseLoss;
pub use optim::sgd::Sgd;
pub use train::trainer::train;
pub use train::train_config::TrainConfig;
pub use cancel::CancelToken;
pub use dataset::example::TrainingExample;
pub use storage::{FsAdapter, MemoryAdapter, PersistenceAdapter};
pub use error::{ErrorKind, RegistryError};
pub use registry::{ModelInfo, Registry, RegistryConfig, TrainReport};
