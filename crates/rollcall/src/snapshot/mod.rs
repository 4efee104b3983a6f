//! Snapshot Manager: snapshot-before-mutate discipline.
//!
//! Every mutating engine operation takes a snapshot of the published dataset
//! before touching anything. Snapshots are stored through a
//! [`SnapshotStore`](crate::store::SnapshotStore) and verified by digest when
//! restored.
//!
//! ```text
//! data/
//! ├── dataset.json                                   # Current version
//! └── dataset.history/
//!     ├── 2024-12-30T10-00-00.000Z-000001.json        # Snapshot bytes
//!     └── 2024-12-30T10-00-00.000Z-000001.meta.json   # SnapshotHandle
//! ```

mod manager;

pub use manager::{SnapshotHandle, SnapshotManager};
