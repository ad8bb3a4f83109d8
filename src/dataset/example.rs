use serde::{Deserialize, Serialize};

/// One recorded input/output pair for a model.
///
/// `raw_data` is opaque provenance (the original document, a file name,
/// whatever the caller wants to keep) and never reaches the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub input: Vec<f64>,
    pub output: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<serde_json::Value>,
}

impl TrainingExample {
    pub fn new(input: Vec<f64>, output: Vec<f64>) -> TrainingExample {
        TrainingExample { input, output, raw_data: None }
    }

    pub fn with_raw_data(mut self, raw_data: serde_json::Value) -> TrainingExample {
        self.raw_data = Some(raw_data);
        self
    }
}
