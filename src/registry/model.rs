use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::Serialize;

use crate::activation::ActivationFunction;
use crate::network::{ModelId, NetworkWeights, SpecDocument, TrainingSummary};

/// Lifecycle state reported for a registered model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    /// Spec known, no weights yet (or weights invalidated).
    Loaded,
    /// Weights available for `run`.
    Trained,
}

/// Read-only view of a model, as returned by `list_models` and `info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub id: ModelId,
    pub name: String,
    pub layers: Vec<usize>,
    pub error_target: f64,
    pub max_epochs: usize,
    pub activation: ActivationFunction,
    pub state: ModelState,
    pub training: Option<TrainingSummary>,
}

/// What a `train` call did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainReport {
    pub model: String,
    pub final_error: f64,
    pub epochs: usize,
    pub reached_target: bool,
    /// `false` when the retention policy kept the previous weights.
    pub replaced: bool,
}

/// Spec document and weights that are swapped together.
#[derive(Debug, Clone)]
pub(crate) struct ModelSnapshot {
    pub doc: SpecDocument,
    pub weights: Option<Arc<NetworkWeights>>,
}

impl ModelSnapshot {
    pub fn info(&self) -> ModelInfo {
        let spec = &self.doc.spec;
        ModelInfo {
            id: spec.id,
            name: spec.name.clone(),
            layers: spec.layers.clone(),
            error_target: spec.error_target,
            max_epochs: spec.max_epochs,
            activation: spec.activation,
            state: if self.weights.is_some() { ModelState::Trained } else { ModelState::Loaded },
            training: self.doc.training.clone(),
        }
    }
}

/// A registered model.
///
/// `train_lock` serializes every operation that rewrites the model (train,
/// respecify, remove); `state` is only held long enough to clone or swap.
/// `examples_lock` is shared by appends and taken exclusively by respecify
/// and remove, so appends never wait for a training run.
#[derive(Debug)]
pub(crate) struct ModelEntry {
    train_lock: Mutex<()>,
    examples_lock: RwLock<()>,
    state: RwLock<ModelSnapshot>,
    removed: AtomicBool,
}

impl ModelEntry {
    pub fn new(doc: SpecDocument, weights: Option<NetworkWeights>) -> ModelEntry {
        ModelEntry {
            train_lock: Mutex::new(()),
            examples_lock: RwLock::new(()),
            state: RwLock::new(ModelSnapshot { doc, weights: weights.map(Arc::new) }),
            removed: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> ModelSnapshot {
        self.state.read().clone()
    }

    pub fn replace(&self, snapshot: ModelSnapshot) {
        *self.state.write() = snapshot;
    }

    pub fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.train_lock.lock()
    }

    pub fn try_lock_writer(&self) -> Option<MutexGuard<'_, ()>> {
        self.train_lock.try_lock()
    }

    pub fn lock_appends(&self) -> RwLockReadGuard<'_, ()> {
        self.examples_lock.read()
    }

    pub fn block_appends(&self) -> RwLockWriteGuard<'_, ()> {
        self.examples_lock.write()
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    pub fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }
}
