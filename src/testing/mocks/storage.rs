//! Storage wrapper that injects batch write failures

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::model::{BatchChunk, BatchId, BatchStatus, CycleId, PayoutBatch};
use crate::storage::{
    BatchFilter, BatchStorage, CycleStorage, HealthStatus, SelectionStorage, StorageError,
    StorageResult, UnifiedStorage,
};

/// Delegates to an inner backend; the first `n` chunk writes fail with a
/// retryable `Unavailable` error
pub struct FlakyStorage {
    inner: Arc<dyn UnifiedStorage>,
    batches: FlakyBatchStorage,
}

impl FlakyStorage {
    pub fn failing_chunk_writes(inner: Arc<dyn UnifiedStorage>, n: u32) -> Self {
        Self {
            inner: inner.clone(),
            batches: FlakyBatchStorage {
                inner,
                remaining_failures: AtomicU32::new(n),
            },
        }
    }

    /// Injected failures not yet consumed
    pub fn remaining_failures(&self) -> u32 {
        self.batches.remaining_failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UnifiedStorage for FlakyStorage {
    fn cycle_storage(&self) -> &dyn CycleStorage {
        self.inner.cycle_storage()
    }

    fn selection_storage(&self) -> &dyn SelectionStorage {
        self.inner.selection_storage()
    }

    fn batch_storage(&self) -> &dyn BatchStorage {
        &self.batches
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        self.inner.health_check().await
    }
}

struct FlakyBatchStorage {
    inner: Arc<dyn UnifiedStorage>,
    remaining_failures: AtomicU32,
}

#[async_trait]
impl BatchStorage for FlakyBatchStorage {
    async fn insert_batch(
        &self,
        batch: PayoutBatch,
        chunks: Vec<BatchChunk>,
        selection_version: u64,
    ) -> StorageResult<()> {
        self.inner
            .batch_storage()
            .insert_batch(batch, chunks, selection_version)
            .await
    }

    async fn load_batch(&self, id: &BatchId) -> StorageResult<Option<PayoutBatch>> {
        self.inner.batch_storage().load_batch(id).await
    }

    async fn load_chunks(&self, id: &BatchId) -> StorageResult<Vec<BatchChunk>> {
        self.inner.batch_storage().load_chunks(id).await
    }

    async fn save_chunk(&self, chunk: &BatchChunk) -> StorageResult<()> {
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StorageError::unavailable("injected chunk write failure"));
        }
        self.inner.batch_storage().save_chunk(chunk).await
    }

    async fn transition_batch(
        &self,
        id: &BatchId,
        to: BatchStatus,
        error: Option<String>,
    ) -> StorageResult<PayoutBatch> {
        self.inner.batch_storage().transition_batch(id, to, error).await
    }

    async fn active_batch(&self, cycle_id: &CycleId) -> StorageResult<Option<PayoutBatch>> {
        self.inner.batch_storage().active_batch(cycle_id).await
    }

    async fn latest_batch(&self, cycle_id: &CycleId) -> StorageResult<Option<PayoutBatch>> {
        self.inner.batch_storage().latest_batch(cycle_id).await
    }

    async fn list_batches(&self, filter: BatchFilter) -> StorageResult<Vec<PayoutBatch>> {
        self.inner.batch_storage().list_batches(filter).await
    }
}
