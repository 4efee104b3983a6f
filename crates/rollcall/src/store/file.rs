//! JSON file store: `dataset.json` plus a `.history` snapshot directory.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::dataset::Dataset;
use crate::error::{Result, RollcallError};
use crate::snapshot::SnapshotHandle;

use super::{DatasetStore, SnapshotStore};

/// File name of the published dataset inside the store root.
pub const DATASET_FILE_NAME: &str = "dataset.json";

/// Stores the dataset and its snapshots under one directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| RollcallError::storage(&root, e))?;
        }
        Ok(Self { root })
    }

    /// Store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the published dataset.
    pub fn dataset_path(&self) -> PathBuf {
        self.root.join(DATASET_FILE_NAME)
    }

    /// Directory holding snapshots.
    pub fn history_dir(&self) -> PathBuf {
        history_directory(&self.dataset_path())
    }

    fn snapshot_paths(&self, handle: &SnapshotHandle) -> (PathBuf, PathBuf) {
        let dir = self.history_dir();
        let key = handle.key();
        (
            dir.join(format!("{}.json", key)),
            dir.join(format!("{}.meta.json", key)),
        )
    }
}

impl DatasetStore for FileStore {
    fn load(&self) -> Result<Option<Dataset>> {
        let path = self.dataset_path();
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(&path).map_err(|e| RollcallError::storage(&path, e))?;
        let dataset: Dataset = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            RollcallError::Config(format!("Failed to parse dataset '{}': {}", path.display(), e))
        })?;
        Ok(Some(dataset))
    }

    fn publish(&self, dataset: &Dataset) -> Result<()> {
        let path = self.dataset_path();
        let bytes = serde_json::to_vec_pretty(dataset)?;
        write_atomic(&path, &bytes)?;
        debug!(path = %path.display(), records = dataset.records.len(), "published dataset");
        Ok(())
    }
}

impl SnapshotStore for FileStore {
    fn write_snapshot(&self, handle: &SnapshotHandle, bytes: &[u8]) -> Result<()> {
        let dir = self.history_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| RollcallError::storage(&dir, e))?;
        }

        let (data_path, meta_path) = self.snapshot_paths(handle);
        write_new(&data_path, bytes)?;
        // Meta last and whole: listing readers see complete snapshots only
        let meta = serde_json::to_vec_pretty(handle)?;
        write_atomic(&meta_path, &meta)
    }

    fn list_snapshots(&self) -> Result<Vec<SnapshotHandle>> {
        let dir = self.history_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir).map_err(|e| RollcallError::storage(&dir, e))?;
        let mut handles = Vec::new();
        for entry in entries.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            let is_meta = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".meta.json"));
            if !is_meta {
                continue;
            }
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                // Pruned since the directory was read
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(RollcallError::storage(&path, e)),
            };
            handles.push(serde_json::from_slice(&bytes)?);
        }
        Ok(handles)
    }

    fn read_snapshot(&self, handle: &SnapshotHandle) -> Result<Vec<u8>> {
        let (data_path, _) = self.snapshot_paths(handle);
        fs::read(&data_path).map_err(|e| RollcallError::storage(&data_path, e))
    }

    fn delete_snapshot(&self, handle: &SnapshotHandle) -> Result<()> {
        let (data_path, meta_path) = self.snapshot_paths(handle);
        // Meta first: a snapshot without meta is invisible to list_snapshots
        fs::remove_file(&meta_path).map_err(|e| RollcallError::storage(&meta_path, e))?;
        fs::remove_file(&data_path).map_err(|e| RollcallError::storage(&data_path, e))
    }
}

/// Get the history directory for a dataset file.
pub fn history_directory(path: &Path) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let parent = path.parent().unwrap_or(Path::new("."));

    parent.join(format!("{}.history", stem))
}

/// Write through a temp file, fsync, then rename over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("json.tmp");
    let mut file = File::create(&temp_path).map_err(|e| RollcallError::storage(&temp_path, e))?;
    file.write_all(bytes)
        .map_err(|e| RollcallError::storage(&temp_path, e))?;
    file.sync_all()
        .map_err(|e| RollcallError::storage(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| RollcallError::storage(path, e))
}

/// Write a file that must not exist yet.
fn write_new(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| RollcallError::storage(path, e))?;
    file.write_all(bytes)
        .map_err(|e| RollcallError::storage(path, e))?;
    file.sync_all().map_err(|e| RollcallError::storage(path, e))
}
