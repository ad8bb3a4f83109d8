pub mod adapter;
mod atomic;
pub mod blob;
pub mod fs;
pub mod memory;

pub use adapter::{CorruptRecord, PersistenceAdapter, SpecRecord, StorageError, StorageResult};
pub use blob::{BlobError, FloatWidth};
pub use fs::FsAdapter;
pub use memory::MemoryAdapter;
