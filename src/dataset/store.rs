use std::sync::Arc;

use log::debug;

use crate::cancel::CancelToken;
use crate::dataset::example::TrainingExample;
use crate::error::{RegistryError, Result};
use crate::network::ModelSpec;
use crate::storage::PersistenceAdapter;
use crate::train::trainer::check_example;

/// Per-model, append-only example collections on top of a persistence adapter.
#[derive(Clone)]
pub struct DatasetStore {
    adapter: Arc<dyn PersistenceAdapter>,
}

/// A snapshot of one model's examples in insertion order.
///
/// Cheap to clone; every call to [`ExampleSet::iter`] starts from the first example.
#[derive(Debug, Clone)]
pub struct ExampleSet {
    examples: Arc<[TrainingExample]>,
}

impl ExampleSet {
    pub fn iter(&self) -> std::slice::Iter<'_, TrainingExample> {
        self.examples.iter()
    }

    pub fn as_slice(&self) -> &[TrainingExample] {
        &self.examples
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

impl<'a> IntoIterator for &'a ExampleSet {
    type Item = &'a TrainingExample;
    type IntoIter = std::slice::Iter<'a, TrainingExample>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl DatasetStore {
    pub fn new(adapter: Arc<dyn PersistenceAdapter>) -> DatasetStore {
        DatasetStore { adapter }
    }

    /// Validates `example` against `spec` and appends it durably. No dedup.
    pub fn append(&self, spec: &ModelSpec, example: TrainingExample, cancel: &CancelToken) -> Result<()> {
        check_example(spec, &example).map_err(|e| RegistryError::network(&spec.name, e))?;
        self.adapter
            .append_example(spec.id, &example, cancel)
            .map_err(|e| RegistryError::storage(&spec.name, e))?;
        debug!("appended example to '{}'", spec.name);
        Ok(())
    }

    /// Every example recorded for `spec`; empty if none.
    pub fn all(&self, spec: &ModelSpec, cancel: &CancelToken) -> Result<ExampleSet> {
        let examples = self.adapter
            .get_examples(spec.id, cancel)
            .map_err(|e| RegistryError::storage(&spec.name, e))?;
        Ok(ExampleSet { examples: examples.into() })
    }

    pub fn count(&self, spec: &ModelSpec, cancel: &CancelToken) -> Result<usize> {
        Ok(self.all(spec, cancel)?.len())
    }

    /// Drops every example of `spec`. Idempotent.
    pub fn clear(&self, spec: &ModelSpec, cancel: &CancelToken) -> Result<()> {
        self.adapter
            .clear_examples(spec.id, cancel)
            .map_err(|e| RegistryError::storage(&spec.name, e))?;
        debug!("cleared examples of '{}'", spec.name);
        Ok(())
    }
}
