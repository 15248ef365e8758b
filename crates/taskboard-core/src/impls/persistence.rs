//! BoardPersistence implementations.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::domain::StoreError;
use crate::ports::{BoardPersistence, PersistedBoard};

/// Process-local persistence. Used by tests and throwaway sessions.
///
/// `fail_writes(true)` makes every `save` fail with a storage error, which is
/// how tests simulate a full persistence medium.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    board: Mutex<PersistedBoard>,
    fail_writes: AtomicBool,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_board(board: PersistedBoard) -> Self {
        Self {
            board: Mutex::new(board),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Last successfully saved document.
    pub fn snapshot(&self) -> PersistedBoard {
        self.board
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl BoardPersistence for MemoryPersistence {
    fn load(&self) -> Result<PersistedBoard, StoreError> {
        Ok(self.snapshot())
    }

    async fn save(&self, board: &PersistedBoard) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("persistence quota exceeded".to_string()));
        }
        *self.board.lock().unwrap_or_else(PoisonError::into_inner) = board.clone();
        Ok(())
    }
}

/// A single JSON document on disk: `{ "tasks": [...], "seeded": bool, "highWater": n }`.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// failed save never truncates the previous document. Saves use `tokio::fs`
/// so they never block the runtime while the store holds its lock.
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl BoardPersistence for JsonFilePersistence {
    fn load(&self) -> Result<PersistedBoard, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<PersistedBoard>(&contents) {
                Ok(board) => {
                    tracing::debug!(path = ?self.path, tasks = board.tasks.len(), "Loaded board");
                    Ok(board)
                }
                Err(e) => {
                    tracing::error!(
                        path = ?self.path,
                        error = %e,
                        "Failed to parse board JSON, starting fresh"
                    );
                    Ok(PersistedBoard::default())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = ?self.path, "Board file not found, starting fresh");
                Ok(PersistedBoard::default())
            }
            Err(e) => Err(StoreError::Storage(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn save(&self, board: &PersistedBoard) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(board)
            .map_err(|e| StoreError::Storage(format!("failed to serialize board: {e}")))?;

        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, json).await.map_err(|e| {
            StoreError::Storage(format!("failed to write {}: {e}", tmp_path.display()))
        })?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            StoreError::Storage(format!(
                "failed to rename {} to {}: {e}",
                tmp_path.display(),
                self.path.display()
            ))
        })?;

        tracing::debug!(path = ?self.path, tasks = board.tasks.len(), "Persisted board");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Column, TaskDraft, TaskId};
    use chrono::Utc;

    fn board() -> PersistedBoard {
        PersistedBoard {
            tasks: vec![
                TaskDraft::new("Persist me", "some description", Column::Review)
                    .into_task(TaskId::new(1), Utc::now()),
            ],
            seeded: true,
            high_water: Some(TaskId::new(3)),
        }
    }

    #[tokio::test]
    async fn json_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.json");

        JsonFilePersistence::new(&path).save(&board()).await.unwrap();
        let loaded = JsonFilePersistence::new(&path).load().unwrap();

        assert_eq!(loaded, board());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn documents_without_high_water_still_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.json");
        fs::write(&path, r#"{ "tasks": [], "seeded": true }"#).unwrap();

        let loaded = JsonFilePersistence::new(&path).load().unwrap();
        assert!(loaded.seeded);
        assert_eq!(loaded.high_water, None);
    }

    #[test]
    fn missing_file_loads_as_unseeded() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = JsonFilePersistence::new(dir.path().join("absent.json"))
            .load()
            .unwrap();
        assert_eq!(loaded, PersistedBoard::default());
    }

    #[test]
    fn corrupted_file_loads_as_unseeded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.json");
        fs::write(&path, "{ not json").unwrap();

        let loaded = JsonFilePersistence::new(&path).load().unwrap();
        assert!(!loaded.seeded);
        assert!(loaded.tasks.is_empty());
    }

    #[tokio::test]
    async fn unwritable_location_is_a_storage_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("board.json");
        let err = JsonFilePersistence::new(path).save(&board()).await.unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
    }

    #[tokio::test]
    async fn memory_persistence_can_refuse_writes() {
        let persistence = MemoryPersistence::new();
        persistence.fail_writes(true);
        assert!(persistence.save(&board()).await.is_err());
        assert_eq!(persistence.snapshot(), PersistedBoard::default());
    }
}
