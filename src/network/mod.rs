pub mod error;
pub mod network;
pub mod spec;

pub use error::{DimensionError, NetworkError, VectorKind};
pub use network::NetworkWeights;
pub use spec::{ModelId, ModelSpec, SpecDocument, SpecError, TrainingSummary};
