//! Snapshot manager - immutable point-in-time copies of the dataset.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::dataset::Dataset;
use crate::error::{Result, RollcallError};
use crate::store::SnapshotStore;

/// Handle to one stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHandle {
    /// Monotonically increasing snapshot number.
    pub id: u64,

    /// When the snapshot was taken; strictly increasing across handles.
    pub taken_at: DateTime<Utc>,

    /// Operation that requested the snapshot.
    pub reason: String,

    /// SHA-256 of the stored bytes.
    pub digest: String,

    /// Records in the dataset at the time.
    pub record_count: usize,

    /// Size of the stored bytes.
    pub size_bytes: u64,
}

impl SnapshotHandle {
    /// Storage key; sorts chronologically.
    pub fn key(&self) -> String {
        format!("{}-{:06}", self.taken_at.format("%Y-%m-%dT%H-%M-%S%.3fZ"), self.id)
    }
}

/// Takes, lists, and restores dataset snapshots.
///
/// Snapshots are never overwritten and never removed automatically; only
/// [`SnapshotManager::prune`] deletes them, on explicit request.
pub struct SnapshotManager {
    store: Arc<dyn SnapshotStore>,
    next_id: u64,
    last_taken: Option<DateTime<Utc>>,
}

impl SnapshotManager {
    /// Open a manager over `store`, continuing its numbering.
    pub fn open(store: Arc<dyn SnapshotStore>) -> Result<Self> {
        let existing = store.list_snapshots()?;
        let next_id = existing.iter().map(|h| h.id).max().map_or(1, |id| id + 1);
        let last_taken = existing.iter().map(|h| h.taken_at).max();

        Ok(Self {
            store,
            next_id,
            last_taken,
        })
    }

    /// Store an immutable copy of `dataset`.
    ///
    /// Fails only when storage fails; callers must not mutate anything when
    /// this returns an error.
    pub fn snapshot(&mut self, dataset: &Dataset, reason: &str) -> Result<SnapshotHandle> {
        let bytes = serde_json::to_vec_pretty(dataset)?;

        let mut taken_at = Utc::now();
        if let Some(last) = self.last_taken {
            if taken_at <= last {
                taken_at = last + Duration::milliseconds(1);
            }
        }

        let handle = SnapshotHandle {
            id: self.next_id,
            taken_at,
            reason: reason.to_string(),
            digest: digest(&bytes),
            record_count: dataset.records.len(),
            size_bytes: bytes.len() as u64,
        };

        self.store.write_snapshot(&handle, &bytes)?;

        self.next_id += 1;
        self.last_taken = Some(taken_at);
        debug!(id = handle.id, key = %handle.key(), reason, "snapshot taken");
        Ok(handle)
    }

    /// All snapshots, newest first.
    pub fn list(&self) -> Result<Vec<SnapshotHandle>> {
        Self::list_in(self.store.as_ref())
    }

    /// All snapshots in `store`, newest first. Needs no manager, so readers
    /// can list without waiting on the writer.
    pub fn list_in(store: &dyn SnapshotStore) -> Result<Vec<SnapshotHandle>> {
        let mut handles = store.list_snapshots()?;
        handles.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(handles)
    }

    /// Most recent snapshot, if any.
    pub fn latest(&self) -> Result<Option<SnapshotHandle>> {
        Ok(self.list()?.into_iter().next())
    }

    /// Look up a snapshot by id.
    pub fn find(&self, id: u64) -> Result<SnapshotHandle> {
        self.list()?
            .into_iter()
            .find(|h| h.id == id)
            .ok_or_else(|| RollcallError::NotFound(format!("snapshot {}", id)))
    }

    /// Read back a snapshot, verifying it is byte-for-byte what was stored.
    pub fn restore(&self, handle: &SnapshotHandle) -> Result<Dataset> {
        let bytes = self.store.read_snapshot(handle)?;
        let actual = digest(&bytes);
        if actual != handle.digest {
            return Err(RollcallError::SnapshotCorrupt {
                id: handle.id,
                expected: handle.digest.clone(),
                actual,
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Delete all but the newest `keep` snapshots. Returns what was removed.
    pub fn prune(&mut self, keep: usize) -> Result<Vec<SnapshotHandle>> {
        let handles = self.list()?;
        let doomed: Vec<SnapshotHandle> = handles.into_iter().skip(keep).collect();
        for handle in &doomed {
            self.store.delete_snapshot(handle)?;
        }
        if !doomed.is_empty() {
            info!(removed = doomed.len(), kept = keep, "pruned snapshots");
        }
        Ok(doomed)
    }
}

/// SHA-256 digest in `sha256:<hex>` form.
fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}
