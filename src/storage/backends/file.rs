//! File-based storage backend
//!
//! The whole store is one JSON snapshot. A mutation runs against a copy of
//! the state, the copy is written to `state.json.tmp` and renamed over
//! `state.json`, and only then replaces the in-memory state. A crash at any
//! point leaves either the old or the new snapshot on disk.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::StateBacked;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::state::StoreState;

const STATE_FILE: &str = "state.json";

/// File-based storage backend
pub struct FileBackend {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl FileBackend {
    /// Open (or create) the store under `base_dir`
    pub async fn new(base_dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(base_dir).await?;
        let path = base_dir.join(STATE_FILE);

        let state = if fs::try_exists(&path).await? {
            let data = fs::read(&path).await?;
            let state: StoreState =
                serde_json::from_slice(&data).map_err(|e| StorageError::CorruptSnapshot {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            info!("Loaded storage snapshot from {}", path.display());
            state
        } else {
            debug!("No snapshot at {}, starting empty", path.display());
            StoreState::default()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Location of the snapshot file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, state: &StoreState) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(state)?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &json).await?;
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl StateBacked for FileBackend {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    async fn read<T, F>(&self, f: F) -> T
    where
        T: Send,
        F: FnOnce(&StoreState) -> T + Send,
    {
        let state = self.state.lock().await;
        f(&state)
    }

    async fn mutate<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send,
        F: FnOnce(&mut StoreState) -> StorageResult<T> + Send,
    {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let value = f(&mut next)?;
        self.persist(&next).await?;
        *state = next;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BatchStatus, CycleId};
    use crate::storage::traits::{BatchStorage, CycleStorage, SelectionStorage};
    use crate::storage::types::WriteGuard;
    use crate::testing::fixtures::{sample_batch, sample_cycle, sealed_selection};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let backend = FileBackend::new(dir.path()).await.unwrap();
            backend.save_cycle(&sample_cycle("c1")).await.unwrap();
            backend.activate_cycle(&CycleId::from("c1")).await.unwrap();
        }

        let reopened = FileBackend::new(dir.path()).await.unwrap();
        let active = reopened.active_cycle().await.unwrap().unwrap();
        assert_eq!(active.id.as_str(), "c1");
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_failed_mutation_is_not_persisted() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path()).await.unwrap();
        let selection = backend
            .store_selection(sealed_selection("c1", 2), WriteGuard::version(0))
            .await
            .unwrap();
        let (batch, chunks) = sample_batch("c1", &selection);
        backend
            .insert_batch(batch.clone(), chunks.clone(), selection.version)
            .await
            .unwrap();

        let (dupe, dupe_chunks) = sample_batch("c1", &selection);
        assert!(backend
            .insert_batch(dupe.clone(), dupe_chunks, selection.version)
            .await
            .unwrap_err()
            .is_conflict());

        let reopened = FileBackend::new(dir.path()).await.unwrap();
        assert!(reopened.load_batch(&dupe.id).await.unwrap().is_none());
        let stored = reopened.load_batch(&batch.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BatchStatus::Created);
        assert_eq!(reopened.load_chunks(&batch.id).await.unwrap(), chunks);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("state.json"), b"{not json").unwrap();

        let err = FileBackend::new(dir.path()).await.err().unwrap();
        assert!(matches!(err, StorageError::CorruptSnapshot { .. }));
    }
}
