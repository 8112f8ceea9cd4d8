//! Durable single-device snapshot of the last known state document.

use std::{
    fs,
    io::ErrorKind,
    path::PathBuf,
    sync::Mutex,
};

use crate::dao::storage::{StorageError, StorageResult};

/// Single-key durable store holding the serialized [`StateDocument`] so a
/// client survives a restart with its last known state.
///
/// [`StateDocument`]: crate::state::document::StateDocument
pub trait SnapshotStore: Send + Sync {
    /// Load the stored snapshot, or `None` when nothing was persisted yet.
    fn load(&self) -> StorageResult<Option<String>>;

    /// Persist a snapshot, replacing any previous one.
    fn save(&self, payload: &str) -> StorageResult<()>;
}

/// Snapshot store backed by a single JSON file on disk.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    /// Store snapshots at `path`, creating parent directories on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> StorageResult<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::unavailable(
                format!("failed to read snapshot at {}", self.path.display()),
                err,
            )),
        }
    }

    fn save(&self, payload: &str) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                StorageError::unavailable(
                    format!("failed to create snapshot directory {}", parent.display()),
                    err,
                )
            })?;
        }

        fs::write(&self.path, payload).map_err(|err| {
            StorageError::unavailable(
                format!("failed to write snapshot at {}", self.path.display()),
                err,
            )
        })
    }
}

/// In-memory snapshot store for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    slot: Mutex<Option<String>>,
}

impl MemorySnapshotStore {
    /// Fresh store with no snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot contents, if any.
    pub fn contents(&self) -> Option<String> {
        self.slot.lock().expect("snapshot lock poisoned").clone()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> StorageResult<Option<String>> {
        Ok(self.slot.lock().expect("snapshot lock poisoned").clone())
    }

    fn save(&self, payload: &str) -> StorageResult<()> {
        *self.slot.lock().expect("snapshot lock poisoned") = Some(payload.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trips_and_reports_missing() {
        let path = std::env::temp_dir()
            .join("buzzroom-tests")
            .join(format!("snapshot-{}.json", uuid::Uuid::new_v4()));
        let store = FileSnapshotStore::new(&path);

        assert!(store.load().unwrap().is_none());
        store.save("{\"stateVersion\":1}").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("{\"stateVersion\":1}"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn memory_store_replaces_previous_snapshot() {
        let store = MemorySnapshotStore::new();
        store.save("a").unwrap();
        store.save("b").unwrap();
        assert_eq!(store.contents().as_deref(), Some("b"));
    }
}
