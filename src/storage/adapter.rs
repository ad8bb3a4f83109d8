use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cancel::CancelToken;
use crate::dataset::TrainingExample;
use crate::network::{ModelId, SpecDocument};

/// Failures reported by a persistence backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("backend error: {0}")]
    Backend(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

impl StorageError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> StorageError + '_ {
        move |source| StorageError::Io { path: path.to_path_buf(), source }
    }
}

/// A stored spec document that could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct CorruptRecord {
    /// Backend-specific location of the record (file name, document key).
    pub key: String,
    pub reason: String,
}

/// One entry returned by [`PersistenceAdapter::get_all_specs`].
pub type SpecRecord = std::result::Result<SpecDocument, CorruptRecord>;

/// Document store for specs and examples plus a blob store for weights.
///
/// Every call is keyed by the model's stable [`ModelId`] and takes a
/// [`CancelToken`]; implementations must check it before doing I/O and
/// return [`StorageError::Cancelled`] when it has fired. `put_weights` must
/// replace the previous blob atomically: a reader sees either the old blob,
/// the new one or none.
pub trait PersistenceAdapter: Send + Sync {
    /// Lists every stored spec document. Undecodable documents are reported
    /// individually; only a failure to enumerate at all is an `Err`.
    fn get_all_specs(&self, cancel: &CancelToken) -> StorageResult<Vec<SpecRecord>>;

    fn put_spec(&self, doc: &SpecDocument, cancel: &CancelToken) -> StorageResult<()>;

    fn get_weights(&self, id: ModelId, cancel: &CancelToken) -> StorageResult<Option<Vec<u8>>>;

    fn put_weights(&self, id: ModelId, blob: &[u8], cancel: &CancelToken) -> StorageResult<()>;

    /// Removes the weight blob only. Idempotent.
    fn delete_weights(&self, id: ModelId, cancel: &CancelToken) -> StorageResult<()>;

    /// Removes spec, weights and examples. Idempotent.
    fn delete_model(&self, id: ModelId, cancel: &CancelToken) -> StorageResult<()>;

    fn append_example(&self, id: ModelId, example: &TrainingExample, cancel: &CancelToken) -> StorageResult<()>;

    /// All examples in insertion order.
    fn get_examples(&self, id: ModelId, cancel: &CancelToken) -> StorageResult<Vec<TrainingExample>>;

    /// Idempotent.
    fn clear_examples(&self, id: ModelId, cancel: &CancelToken) -> StorageResult<()>;
}

pub(crate) fn check_cancel(cancel: &CancelToken) -> StorageResult<()> {
    if cancel.is_cancelled() {
        Err(StorageError::Cancelled)
    } else {
        Ok(())
    }
}
