//! Storage factory for creating storage instances

use std::sync::Arc;
use tracing::info;

use super::backends::{FileBackend, MemoryBackend};
use super::config::{BackendType, StorageConfig};
use super::error::StorageResult;
use super::traits::UnifiedStorage;

/// Factory for creating storage instances
pub struct StorageFactory;

impl StorageFactory {
    /// Create storage from explicit configuration
    pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn UnifiedStorage>> {
        match config.backend {
            BackendType::File => {
                let base_dir = config.resolved_base_dir();
                let backend = FileBackend::new(&base_dir).await?;
                info!("Using file storage at {}", backend.path().display());
                Ok(Arc::new(backend))
            }
            BackendType::Memory => {
                info!("Using in-memory storage; nothing will be persisted");
                Ok(Arc::new(MemoryBackend::new()))
            }
        }
    }

    /// Create in-memory storage for testing
    pub fn memory() -> Arc<dyn UnifiedStorage> {
        Arc::new(MemoryBackend::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_factory_builds_each_backend() {
        let memory = StorageFactory::from_config(&StorageConfig::memory())
            .await
            .unwrap();
        assert_eq!(memory.health_check().await.unwrap().backend_type, "memory");

        let dir = TempDir::new().unwrap();
        let file = StorageFactory::from_config(&StorageConfig::file(dir.path()))
            .await
            .unwrap();
        let health = file.health_check().await.unwrap();
        assert!(health.healthy);
        assert_eq!(health.backend_type, "file");
        assert!(dir.path().join("state.json").exists());
    }
}
