pub mod example;
pub mod store;

pub use example::TrainingExample;
pub use store::{DatasetStore, ExampleSet};
