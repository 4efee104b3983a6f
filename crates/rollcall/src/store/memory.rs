//! In-memory store for tests and embedding.

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::dataset::Dataset;
use crate::error::{Result, RollcallError};
use crate::snapshot::SnapshotHandle;

use super::{DatasetStore, SnapshotStore};

/// Keeps the published dataset and snapshots as serialized bytes in memory.
///
/// Failures can be switched on to exercise the engine's atomicity.
#[derive(Debug, Default)]
pub struct MemoryStore {
    current: Mutex<Option<Vec<u8>>>,
    snapshots: Mutex<BTreeMap<u64, (SnapshotHandle, Vec<u8>)>>,
    fail_publish: AtomicBool,
    fail_snapshots: AtomicBool,
    publish_count: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a published dataset.
    pub fn with_dataset(dataset: &Dataset) -> Result<Self> {
        let store = Self::new();
        store.publish(dataset)?;
        store.publish_count.store(0, Ordering::SeqCst);
        Ok(store)
    }

    /// Make every publish fail until switched off.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Make every snapshot write fail until switched off.
    pub fn fail_snapshots(&self, fail: bool) {
        self.fail_snapshots.store(fail, Ordering::SeqCst);
    }

    /// Number of successful publishes.
    pub fn publish_count(&self) -> usize {
        self.publish_count.load(Ordering::SeqCst)
    }
}

fn injected(what: &str) -> RollcallError {
    RollcallError::storage(
        format!("memory://{}", what),
        io::Error::other("injected storage failure"),
    )
}

impl DatasetStore for MemoryStore {
    fn load(&self) -> Result<Option<Dataset>> {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        match current.as_ref() {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    fn publish(&self, dataset: &Dataset) -> Result<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(injected("dataset"));
        }
        let bytes = serde_json::to_vec(dataset)?;
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes);
        self.publish_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl SnapshotStore for MemoryStore {
    fn write_snapshot(&self, handle: &SnapshotHandle, bytes: &[u8]) -> Result<()> {
        if self.fail_snapshots.load(Ordering::SeqCst) {
            return Err(injected("snapshots"));
        }
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        if snapshots.contains_key(&handle.id) {
            return Err(RollcallError::storage(
                format!("memory://snapshots/{}", handle.key()),
                io::Error::new(io::ErrorKind::AlreadyExists, "snapshot already exists"),
            ));
        }
        snapshots.insert(handle.id, (handle.clone(), bytes.to_vec()));
        Ok(())
    }

    fn list_snapshots(&self) -> Result<Vec<SnapshotHandle>> {
        let snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(snapshots.values().map(|(h, _)| h.clone()).collect())
    }

    fn read_snapshot(&self, handle: &SnapshotHandle) -> Result<Vec<u8>> {
        let snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots
            .get(&handle.id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| RollcallError::NotFound(format!("snapshot {}", handle.id)))
    }

    fn delete_snapshot(&self, handle: &SnapshotHandle) -> Result<()> {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots
            .remove(&handle.id)
            .map(|_| ())
            .ok_or_else(|| RollcallError::NotFound(format!("snapshot {}", handle.id)))
    }
}
