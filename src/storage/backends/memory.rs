//! In-memory storage backend for testing

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::StateBacked;
use crate::storage::error::StorageResult;
use crate::storage::state::StoreState;

/// In-memory storage backend for testing
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<StoreState>>,
}

impl MemoryBackend {
    /// Create an empty memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory backend seeded with existing state
    pub fn with_state(state: StoreState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }
}

#[async_trait]
impl StateBacked for MemoryBackend {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn read<T, F>(&self, f: F) -> T
    where
        T: Send,
        F: FnOnce(&StoreState) -> T + Send,
    {
        let state = self.state.read().await;
        f(&state)
    }

    async fn mutate<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send,
        F: FnOnce(&mut StoreState) -> StorageResult<T> + Send,
    {
        let mut state = self.state.write().await;
        f(&mut state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CycleId;
    use crate::storage::traits::{CycleStorage, UnifiedStorage};
    use crate::testing::fixtures::sample_cycle;

    #[tokio::test]
    async fn test_clones_share_state() {
        let backend = MemoryBackend::new();
        let other = backend.clone();

        backend.save_cycle(&sample_cycle("c1")).await.unwrap();

        let loaded = other.load_cycle(&CycleId::from("c1")).await.unwrap();
        assert!(loaded.is_some());
    }

    #[tokio::test]
    async fn test_health_check() {
        let backend = MemoryBackend::new();
        let health = backend.health_check().await.unwrap();
        assert!(health.healthy);
        assert_eq!(health.backend_type, "memory");
    }
}
