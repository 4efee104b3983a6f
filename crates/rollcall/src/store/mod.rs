//! Persistence seams: loading and publishing the dataset, storing snapshots.
//!
//! The engine only needs two crash-safe primitives ("load current" and
//! "publish new") plus an append-only snapshot area. [`FileStore`] keeps
//! everything as JSON under one directory; [`MemoryStore`] keeps bytes in
//! memory and can inject failures for tests.

mod file;
mod memory;

pub use file::{history_directory, FileStore, DATASET_FILE_NAME};
pub use memory::MemoryStore;

use crate::dataset::Dataset;
use crate::error::Result;
use crate::snapshot::SnapshotHandle;

/// Atomic access to the current dataset.
pub trait DatasetStore: Send + Sync {
    /// Load the current dataset, or `None` if nothing was ever published.
    fn load(&self) -> Result<Option<Dataset>>;

    /// Replace the current dataset. Either fully succeeds or leaves the
    /// previous version readable.
    fn publish(&self, dataset: &Dataset) -> Result<()>;
}

/// Append-only storage for snapshot bytes.
pub trait SnapshotStore: Send + Sync {
    /// Store bytes under a new handle. Must refuse to overwrite.
    fn write_snapshot(&self, handle: &SnapshotHandle, bytes: &[u8]) -> Result<()>;

    /// All stored handles, in any order.
    fn list_snapshots(&self) -> Result<Vec<SnapshotHandle>>;

    /// Bytes stored for a handle.
    fn read_snapshot(&self, handle: &SnapshotHandle) -> Result<Vec<u8>>;

    /// Delete a snapshot (explicit retention only).
    fn delete_snapshot(&self, handle: &SnapshotHandle) -> Result<()>;
}
