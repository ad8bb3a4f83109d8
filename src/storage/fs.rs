use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::cancel::CancelToken;
use crate::dataset::TrainingExample;
use crate::network::{ModelId, SpecDocument};
use crate::storage::adapter::{
    check_cancel, CorruptRecord, PersistenceAdapter, SpecRecord, StorageError, StorageResult,
};
use crate::storage::atomic::{atomic_write, remove_if_exists, TEMP_PREFIX};

const MODELS_DIR: &str = "models";
const WEIGHTS_DIR: &str = "weights";
const EXAMPLES_DIR: &str = "examples";

/// Directory-backed adapter.
///
/// ```text
/// <root>/models/<id>.json      spec documents, replaced atomically
/// <root>/weights/<id>.fnnw     weight blobs, replaced atomically
/// <root>/examples/<id>.jsonl   one example per line, append-only
/// ```
#[derive(Debug, Clone)]
pub struct FsAdapter {
    root: PathBuf,
}

impl FsAdapter {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<FsAdapter> {
        let root = root.into();
        for dir in [MODELS_DIR, WEIGHTS_DIR, EXAMPLES_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path).map_err(StorageError::io(&path))?;
        }
        Ok(FsAdapter { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn spec_path(&self, id: ModelId) -> PathBuf {
        self.root.join(MODELS_DIR).join(format!("{id}.json"))
    }

    fn weights_path(&self, id: ModelId) -> PathBuf {
        self.root.join(WEIGHTS_DIR).join(format!("{id}.fnnw"))
    }

    fn examples_path(&self, id: ModelId) -> PathBuf {
        self.root.join(EXAMPLES_DIR).join(format!("{id}.jsonl"))
    }

    fn read_spec(path: &Path) -> Result<SpecDocument, String> {
        let bytes = fs::read(path).map_err(|e| e.to_string())?;
        let doc: SpecDocument = serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if doc.spec.id.to_string() != stem {
            return Err(format!("document id {} does not match file name", doc.spec.id));
        }
        Ok(doc)
    }
}

impl PersistenceAdapter for FsAdapter {
    fn get_all_specs(&self, cancel: &CancelToken) -> StorageResult<Vec<SpecRecord>> {
        check_cancel(cancel)?;
        let dir = self.root.join(MODELS_DIR);
        let mut paths = Vec::new();
        for entry in fs::read_dir(&dir).map_err(StorageError::io(&dir))? {
            let path = entry.map_err(StorageError::io(&dir))?.path();
            let name = path.file_name().and_then(|s| s.to_str()).unwrap_or_default();
            if name.starts_with(TEMP_PREFIX) || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            paths.push(path);
        }
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            check_cancel(cancel)?;
            let record = FsAdapter::read_spec(&path).map_err(|reason| CorruptRecord {
                key: path.display().to_string(),
                reason,
            });
            records.push(record);
        }
        Ok(records)
    }

    fn put_spec(&self, doc: &SpecDocument, cancel: &CancelToken) -> StorageResult<()> {
        check_cancel(cancel)?;
        let path = self.spec_path(doc.spec.id);
        let bytes = serde_json::to_vec_pretty(doc)?;
        atomic_write(&path, &bytes).map_err(StorageError::io(&path))
    }

    fn get_weights(&self, id: ModelId, cancel: &CancelToken) -> StorageResult<Option<Vec<u8>>> {
        check_cancel(cancel)?;
        let path = self.weights_path(id);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io { path, source: e }),
        }
    }

    fn put_weights(&self, id: ModelId, blob: &[u8], cancel: &CancelToken) -> StorageResult<()> {
        check_cancel(cancel)?;
        let path = self.weights_path(id);
        debug!("writing {} byte weight blob to {}", blob.len(), path.display());
        atomic_write(&path, blob).map_err(StorageError::io(&path))
    }

    fn delete_weights(&self, id: ModelId, cancel: &CancelToken) -> StorageResult<()> {
        check_cancel(cancel)?;
        let path = self.weights_path(id);
        remove_if_exists(&path).map_err(StorageError::io(&path))
    }

    fn delete_model(&self, id: ModelId, cancel: &CancelToken) -> StorageResult<()> {
        check_cancel(cancel)?;
        // Spec goes last: an interrupted delete leaves a loadable model, not orphans.
        for path in [self.weights_path(id), self.examples_path(id), self.spec_path(id)] {
            remove_if_exists(&path).map_err(StorageError::io(&path))?;
        }
        Ok(())
    }

    fn append_example(&self, id: ModelId, example: &TrainingExample, cancel: &CancelToken) -> StorageResult<()> {
        check_cancel(cancel)?;
        let path = self.examples_path(id);
        let mut line = serde_json::to_vec(example)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(StorageError::io(&path))?;
        file.write_all(&line).map_err(StorageError::io(&path))?;
        file.sync_data().map_err(StorageError::io(&path))
    }

    fn get_examples(&self, id: ModelId, cancel: &CancelToken) -> StorageResult<Vec<TrainingExample>> {
        check_cancel(cancel)?;
        let path = self.examples_path(id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io { path, source: e }),
        };

        let complete = content.ends_with('\n');
        let lines: Vec<&str> = content.lines().collect();
        let mut examples = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TrainingExample>(line) {
                Ok(example) => examples.push(example),
                // A crash mid-append leaves an unterminated last line.
                Err(_) if !complete && index + 1 == lines.len() => {
                    warn!("ignoring torn trailing example line in {}", path.display());
                }
                Err(e) => {
                    return Err(StorageError::Corrupt {
                        key: format!("{}:{}", path.display(), index + 1),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(examples)
    }

    fn clear_examples(&self, id: ModelId, cancel: &CancelToken) -> StorageResult<()> {
        check_cancel(cancel)?;
        let path = self.examples_path(id);
        remove_if_exists(&path).map_err(StorageError::io(&path))
    }
}
