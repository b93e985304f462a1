//! Core trait definitions for the storage abstraction layer

use async_trait::async_trait;

use super::error::StorageResult;
use super::types::*;
use crate::model::{
    BatchChunk, BatchId, BatchStatus, Cycle, CycleId, CycleSelection, EligibleMember,
    PayoutBatch,
};

/// Unified storage interface providing access to all storage subsystems
#[async_trait]
pub trait UnifiedStorage: Send + Sync {
    /// Get the cycle storage implementation
    fn cycle_storage(&self) -> &dyn CycleStorage;

    /// Get the selection storage implementation
    fn selection_storage(&self) -> &dyn SelectionStorage;

    /// Get the batch storage implementation
    fn batch_storage(&self) -> &dyn BatchStorage;

    /// Check the health of the storage backend
    async fn health_check(&self) -> StorageResult<HealthStatus>;
}

/// Cycle configuration and the per-cycle member roster
#[async_trait]
pub trait CycleStorage: Send + Sync {
    /// Insert or replace a cycle. The active flag is preserved for existing cycles.
    async fn save_cycle(&self, cycle: &Cycle) -> StorageResult<()>;

    /// Load a cycle by ID
    async fn load_cycle(&self, id: &CycleId) -> StorageResult<Option<Cycle>>;

    /// The single active cycle, if any
    async fn active_cycle(&self) -> StorageResult<Option<Cycle>>;

    /// Make `id` the active cycle and deactivate every other cycle
    async fn activate_cycle(&self, id: &CycleId) -> StorageResult<Cycle>;

    /// List all cycles, oldest first
    async fn list_cycles(&self) -> StorageResult<Vec<Cycle>>;

    /// Replace the roster for a cycle
    async fn save_roster(&self, cycle_id: &CycleId, members: Vec<EligibleMember>)
        -> StorageResult<()>;

    /// Load the roster for a cycle (empty when never imported)
    async fn load_roster(&self, cycle_id: &CycleId) -> StorageResult<Vec<EligibleMember>>;
}

/// Winner sets and their lifecycle state
#[async_trait]
pub trait SelectionStorage: Send + Sync {
    /// Load the selection of a cycle
    async fn load_selection(&self, cycle_id: &CycleId) -> StorageResult<Option<CycleSelection>>;

    /// Compare-and-swap write. Fails with `Conflict` when the stored version
    /// differs from `guard.expected_version`, or when `guard.require_idle` is set
    /// and the cycle has a non-terminal batch. Returns the stored selection with
    /// its new version.
    async fn store_selection(
        &self,
        selection: CycleSelection,
        guard: WriteGuard,
    ) -> StorageResult<CycleSelection>;

    /// Mark winners as processed. Used only by the disbursement pipeline and
    /// deliberately bypasses the seal gate.
    async fn record_payouts(&self, cycle_id: &CycleId, paid: &[PaidWinner]) -> StorageResult<()>;
}

/// Disbursement batches and their chunks
#[async_trait]
pub trait BatchStorage: Send + Sync {
    /// Conditional insert of a batch with all of its chunks. Fails with
    /// `Conflict` when the cycle already has a non-terminal batch or the
    /// selection version moved past `selection_version`.
    async fn insert_batch(
        &self,
        batch: PayoutBatch,
        chunks: Vec<BatchChunk>,
        selection_version: u64,
    ) -> StorageResult<()>;

    /// Load a batch by ID
    async fn load_batch(&self, id: &BatchId) -> StorageResult<Option<PayoutBatch>>;

    /// Load all chunks of a batch ordered by index
    async fn load_chunks(&self, id: &BatchId) -> StorageResult<Vec<BatchChunk>>;

    /// Replace one chunk
    async fn save_chunk(&self, chunk: &BatchChunk) -> StorageResult<()>;

    /// Move a batch forward. Fails with `Conflict` if the transition is not
    /// allowed from the stored status.
    async fn transition_batch(
        &self,
        id: &BatchId,
        to: BatchStatus,
        error: Option<String>,
    ) -> StorageResult<PayoutBatch>;

    /// The non-terminal batch of a cycle, if any
    async fn active_batch(&self, cycle_id: &CycleId) -> StorageResult<Option<PayoutBatch>>;

    /// The most recently created batch of a cycle
    async fn latest_batch(&self, cycle_id: &CycleId) -> StorageResult<Option<PayoutBatch>>;

    /// List batches matching filter, oldest first
    async fn list_batches(&self, filter: BatchFilter) -> StorageResult<Vec<PayoutBatch>>;
}
