use std::collections::HashMap;

use parking_lot::RwLock;

use crate::cancel::CancelToken;
use crate::dataset::TrainingExample;
use crate::network::{ModelId, SpecDocument};
use crate::storage::adapter::{check_cancel, PersistenceAdapter, SpecRecord, StorageResult};

/// In-process adapter backed by hash maps. Nothing survives the process;
/// intended for tests and for embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    specs: RwLock<HashMap<ModelId, SpecDocument>>,
    weights: RwLock<HashMap<ModelId, Vec<u8>>>,
    examples: RwLock<HashMap<ModelId, Vec<TrainingExample>>>,
}

impl MemoryAdapter {
    pub fn new() -> MemoryAdapter {
        MemoryAdapter::default()
    }
}

impl PersistenceAdapter for MemoryAdapter {
    fn get_all_specs(&self, cancel: &CancelToken) -> StorageResult<Vec<SpecRecord>> {
        check_cancel(cancel)?;
        let mut docs: Vec<SpecDocument> = self.specs.read().values().cloned().collect();
        docs.sort_by(|a, b| a.spec.name.cmp(&b.spec.name));
        Ok(docs.into_iter().map(Ok).collect())
    }

    fn put_spec(&self, doc: &SpecDocument, cancel: &CancelToken) -> StorageResult<()> {
        check_cancel(cancel)?;
        self.specs.write().insert(doc.spec.id, doc.clone());
        Ok(())
    }

    fn get_weights(&self, id: ModelId, cancel: &CancelToken) -> StorageResult<Option<Vec<u8>>> {
        check_cancel(cancel)?;
        Ok(self.weights.read().get(&id).cloned())
    }

    fn put_weights(&self, id: ModelId, blob: &[u8], cancel: &CancelToken) -> StorageResult<()> {
        check_cancel(cancel)?;
        self.weights.write().insert(id, blob.to_vec());
        Ok(())
    }

    fn delete_weights(&self, id: ModelId, cancel: &CancelToken) -> StorageResult<()> {
        check_cancel(cancel)?;
        self.weights.write().remove(&id);
        Ok(())
    }

    fn delete_model(&self, id: ModelId, cancel: &CancelToken) -> StorageResult<()> {
        check_cancel(cancel)?;
        self.weights.write().remove(&id);
        self.examples.write().remove(&id);
        self.specs.write().remove(&id);
        Ok(())
    }

    fn append_example(&self, id: ModelId, example: &TrainingExample, cancel: &CancelToken) -> StorageResult<()> {
        check_cancel(cancel)?;
        self.examples.write().entry(id).or_default().push(example.clone());
        Ok(())
    }

    fn get_examples(&self, id: ModelId, cancel: &CancelToken) -> StorageResult<Vec<TrainingExample>> {
        check_cancel(cancel)?;
        Ok(self.examples.read().get(&id).cloned().unwrap_or_default())
    }

    fn clear_examples(&self, id: ModelId, cancel: &CancelToken) -> StorageResult<()> {
        check_cancel(cancel)?;
        self.examples.write().remove(&id);
        Ok(())
    }
}
