//! Storage backend implementations
//!
//! Both backends keep a [`StoreState`] behind one lock and differ only in
//! whether a mutation is flushed to disk. The storage traits are implemented
//! once, on top of [`StateBacked`].

pub mod file;
pub mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

use async_trait::async_trait;
use std::time::Instant;

use super::error::StorageResult;
use super::state::StoreState;
use super::traits::{BatchStorage, CycleStorage, SelectionStorage, UnifiedStorage};
use super::types::{BatchFilter, HealthStatus, PaidWinner, WriteGuard};
use crate::model::{
    BatchChunk, BatchId, BatchStatus, Cycle, CycleId, CycleSelection, EligibleMember,
    PayoutBatch,
};

/// Access to the locked state of a backend
#[async_trait]
pub trait StateBacked: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Run a read-only closure against the state
    async fn read<T, F>(&self, f: F) -> T
    where
        T: Send,
        F: FnOnce(&StoreState) -> T + Send;

    /// Run a mutation. `StoreState` operations check their conditions before
    /// writing, so a failed mutation leaves the state untouched.
    async fn mutate<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send,
        F: FnOnce(&mut StoreState) -> StorageResult<T> + Send;
}

#[async_trait]
impl<B: StateBacked> UnifiedStorage for B {
    fn cycle_storage(&self) -> &dyn CycleStorage {
        self
    }

    fn selection_storage(&self) -> &dyn SelectionStorage {
        self
    }

    fn batch_storage(&self) -> &dyn BatchStorage {
        self
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let started = Instant::now();
        let mut errors = Vec::new();
        // A no-op mutation exercises the write path (and the flush for file storage)
        if let Err(e) = self.mutate(|_| Ok(())).await {
            errors.push(e.to_string());
        }
        Ok(HealthStatus {
            healthy: errors.is_empty(),
            backend_type: self.backend_name().to_string(),
            latency_ms: started.elapsed().as_millis() as u64,
            errors,
        })
    }
}

#[async_trait]
impl<B: StateBacked> CycleStorage for B {
    async fn save_cycle(&self, cycle: &Cycle) -> StorageResult<()> {
        let cycle = cycle.clone();
        self.mutate(move |s| {
            s.save_cycle(&cycle);
            Ok(())
        })
        .await
    }

    async fn load_cycle(&self, id: &CycleId) -> StorageResult<Option<Cycle>> {
        Ok(self.read(|s| s.load_cycle(id)).await)
    }

    async fn active_cycle(&self) -> StorageResult<Option<Cycle>> {
        Ok(self.read(|s| s.active_cycle()).await)
    }

    async fn activate_cycle(&self, id: &CycleId) -> StorageResult<Cycle> {
        self.mutate(|s| s.activate_cycle(id)).await
    }

    async fn list_cycles(&self) -> StorageResult<Vec<Cycle>> {
        Ok(self.read(|s| s.list_cycles()).await)
    }

    async fn save_roster(
        &self,
        cycle_id: &CycleId,
        members: Vec<EligibleMember>,
    ) -> StorageResult<()> {
        self.mutate(move |s| {
            s.save_roster(cycle_id, members);
            Ok(())
        })
        .await
    }

    async fn load_roster(&self, cycle_id: &CycleId) -> StorageResult<Vec<EligibleMember>> {
        Ok(self.read(|s| s.load_roster(cycle_id)).await)
    }
}

#[async_trait]
impl<B: StateBacked> SelectionStorage for B {
    async fn load_selection(&self, cycle_id: &CycleId) -> StorageResult<Option<CycleSelection>> {
        Ok(self.read(|s| s.load_selection(cycle_id)).await)
    }

    async fn store_selection(
        &self,
        selection: CycleSelection,
        guard: WriteGuard,
    ) -> StorageResult<CycleSelection> {
        self.mutate(move |s| s.store_selection(selection, guard)).await
    }

    async fn record_payouts(&self, cycle_id: &CycleId, paid: &[PaidWinner]) -> StorageResult<()> {
        self.mutate(|s| s.record_payouts(cycle_id, paid)).await
    }
}

#[async_trait]
impl<B: StateBacked> BatchStorage for B {
    async fn insert_batch(
        &self,
        batch: PayoutBatch,
        chunks: Vec<BatchChunk>,
        selection_version: u64,
    ) -> StorageResult<()> {
        self.mutate(move |s| s.insert_batch(batch, chunks, selection_version))
            .await
    }

    async fn load_batch(&self, id: &BatchId) -> StorageResult<Option<PayoutBatch>> {
        Ok(self.read(|s| s.load_batch(id)).await)
    }

    async fn load_chunks(&self, id: &BatchId) -> StorageResult<Vec<BatchChunk>> {
        Ok(self.read(|s| s.load_chunks(id)).await)
    }

    async fn save_chunk(&self, chunk: &BatchChunk) -> StorageResult<()> {
        self.mutate(|s| s.save_chunk(chunk)).await
    }

    async fn transition_batch(
        &self,
        id: &BatchId,
        to: BatchStatus,
        error: Option<String>,
    ) -> StorageResult<PayoutBatch> {
        self.mutate(move |s| s.transition_batch(id, to, error)).await
    }

    async fn active_batch(&self, cycle_id: &CycleId) -> StorageResult<Option<PayoutBatch>> {
        Ok(self.read(|s| s.active_batch(cycle_id)).await)
    }

    async fn latest_batch(&self, cycle_id: &CycleId) -> StorageResult<Option<PayoutBatch>> {
        Ok(self.read(|s| s.latest_batch(cycle_id)).await)
    }

    async fn list_batches(&self, filter: BatchFilter) -> StorageResult<Vec<PayoutBatch>> {
        Ok(self.read(move |s| s.list_batches(&filter)).await)
    }
}
