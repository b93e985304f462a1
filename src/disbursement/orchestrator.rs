//! Creation and inspection of disbursement batches
//!
//! The orchestrator keeps no state between requests. A batch is prepared
//! from the stored selection and inserted with a single conditional write
//! that fails when the cycle already has a batch in flight or the selection
//! changed after it was read.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::worker::BatchWorker;
use crate::config::{DisbursementConfig, RetryPolicy};
use crate::core::chunking::{build_chunks, ChunkInfo};
use crate::core::eligibility::{eligible_winners, resolve_targets};
use crate::core::payout::checked_total;
use crate::core::seal::{check_transition, SelectionEvent, TransitionContext};
use crate::error::{PayoutError, PayoutResult};
use crate::model::{
    BatchId, BatchOrigin, BatchStatus, BatchStatusView, BatchSummary, CycleId, CycleSelection,
    DisbursementMode, FailedItemView, ItemOutcome, PayoutBatch, WinnerRecord,
};
use crate::providers::{DestinationValidator, DisbursementProvider};
use crate::storage::{BatchFilter, UnifiedStorage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibleCount {
    pub cycle_id: CycleId,
    pub eligible_count: usize,
    /// Sum of the eligible payouts, minor units
    pub total_amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBatchResult {
    pub batch_id: BatchId,
    pub total_eligible: usize,
    pub chunk_info: ChunkInfo,
}

pub struct DisbursementOrchestrator {
    pub(super) storage: Arc<dyn UnifiedStorage>,
    provider: Arc<dyn DisbursementProvider>,
    validator: Arc<dyn DestinationValidator>,
    pub(super) config: DisbursementConfig,
    worker: BatchWorker,
    live_workers: Arc<RwLock<HashSet<BatchId>>>,
}

impl DisbursementOrchestrator {
    pub fn new(
        storage: Arc<dyn UnifiedStorage>,
        provider: Arc<dyn DisbursementProvider>,
        validator: Arc<dyn DestinationValidator>,
        config: DisbursementConfig,
    ) -> Self {
        let worker = BatchWorker::new(storage.clone(), provider.clone(), config.clone());
        Self {
            storage,
            provider,
            validator,
            config,
            worker,
            live_workers: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Winners a batch in `All` mode would pay right now
    pub async fn get_eligible_count(&self, cycle_id: &CycleId) -> PayoutResult<EligibleCount> {
        let selection = self.load_selection(cycle_id).await?;
        let eligible = eligible_winners(&selection);
        Ok(EligibleCount {
            cycle_id: cycle_id.clone(),
            eligible_count: eligible.len(),
            total_amount: checked_total("total_amount", eligible.iter().map(|w| w.payout_final))?,
        })
    }

    /// Validate and persist a new batch. The batch is not started.
    pub async fn create_batch(
        &self,
        cycle_id: &CycleId,
        mode: DisbursementMode,
        actor: &str,
    ) -> PayoutResult<CreateBatchResult> {
        self.check_rate_limit(cycle_id).await?;
        let selection = self.load_selection(cycle_id).await?;
        let targets: Vec<WinnerRecord> = resolve_targets(&selection, &mode)
            .into_iter()
            .cloned()
            .collect();
        self.insert_batch(&selection, targets, mode, BatchOrigin::Initial, actor)
            .await
    }

    /// Shared tail of batch creation and retry: transition check, target
    /// validation, provider health and the conditional insert
    pub(super) async fn insert_batch(
        &self,
        selection: &CycleSelection,
        targets: Vec<WinnerRecord>,
        mode: DisbursementMode,
        origin: BatchOrigin,
        actor: &str,
    ) -> PayoutResult<CreateBatchResult> {
        let cycle_id = &selection.cycle_id;
        let ctx = TransitionContext {
            winner_count: selection.live_winners().count(),
            processed_count: selection.processed_count(),
            batch_in_flight: false,
            allow_unsealed_disbursement: self.config.allow_unsealed_disbursement,
        };
        check_transition(cycle_id, selection.state, SelectionEvent::Disburse, &ctx)?;

        if targets.is_empty() {
            return Err(PayoutError::NoEligibleWinners(cycle_id.clone()));
        }

        let destinations: Vec<String> = targets
            .iter()
            .filter_map(|w| w.destination.clone())
            .collect();
        let report = self.validator.validate(&destinations).await;
        if !report.is_clean() {
            warn!(
                "Refusing batch for cycle {}: {} invalid and {} disposable destinations",
                cycle_id,
                report.invalid_emails.len(),
                report.disposable_emails.len()
            );
            return Err(PayoutError::ValidationError(report));
        }

        self.provider.health_check().await.map_err(|e| {
            warn!("Provider {} failed its health check: {}", self.provider.name(), e);
            PayoutError::ProviderUnavailable(e.to_string())
        })?;

        let batch_id = BatchId::generate();
        let chunk_info = ChunkInfo::new(targets.len(), self.config.chunk_size);
        let chunks = build_chunks(&batch_id, &targets, chunk_info.chunk_size);
        let batch = PayoutBatch {
            id: batch_id.clone(),
            cycle_id: cycle_id.clone(),
            mode,
            origin,
            currency: self.config.currency.clone(),
            total_items: targets.len(),
            chunk_count: chunks.len(),
            chunk_size: chunk_info.chunk_size,
            status: BatchStatus::Created,
            created_at: Utc::now(),
            created_by: actor.to_string(),
            started_at: None,
            completed_at: None,
            error: None,
        };

        self.storage
            .batch_storage()
            .insert_batch(batch, chunks, selection.version)
            .await?;
        info!(
            "Created batch {} for cycle {} by {}: {} payouts in {} chunks",
            batch_id, cycle_id, actor, chunk_info.total_items, chunk_info.total_chunks
        );

        Ok(CreateBatchResult {
            batch_id,
            total_eligible: chunk_info.total_items,
            chunk_info,
        })
    }

    /// Run a batch on a background task. Worker failures that may clear on
    /// their own re-drive the batch with backoff; a batch that already has a
    /// live worker is not started twice.
    pub fn start_batch(&self, batch_id: &BatchId) -> JoinHandle<PayoutResult<PayoutBatch>> {
        let worker = self.worker.clone();
        let live_workers = self.live_workers.clone();
        let policy = self.config.retry.clone();
        let batch_id = batch_id.clone();
        tokio::spawn(async move {
            if !live_workers.write().await.insert(batch_id.clone()) {
                debug!("Batch {} already has a live worker", batch_id);
                return worker.current(&batch_id).await;
            }
            let result = drive_batch(&worker, &batch_id, &policy).await;
            live_workers.write().await.remove(&batch_id);
            if let Err(e) = &result {
                error!("Worker for batch {} stopped: {}", batch_id, e);
            }
            result
        })
    }

    /// Run a batch to completion on the current task
    pub async fn run_batch(&self, batch_id: &BatchId) -> PayoutResult<PayoutBatch> {
        self.worker.run(batch_id).await
    }

    /// Restart the worker of a batch that is not terminal. Returns `None`
    /// when the batch is already settled or a worker is running it.
    pub async fn resume_batch(
        &self,
        batch_id: &BatchId,
    ) -> PayoutResult<Option<JoinHandle<PayoutResult<PayoutBatch>>>> {
        let batch = self.load_batch(batch_id).await?;
        if batch.status.is_terminal() || self.has_live_worker(batch_id).await {
            return Ok(None);
        }
        info!("Resuming batch {} of cycle {}", batch.id, batch.cycle_id);
        Ok(Some(self.start_batch(batch_id)))
    }

    /// Restart workers for every batch that is not terminal and has no live
    /// worker, e.g. after a restart of the process or a worker that gave up
    pub async fn resume_incomplete_batches(
        &self,
    ) -> PayoutResult<Vec<JoinHandle<PayoutResult<PayoutBatch>>>> {
        let batches = self
            .storage
            .batch_storage()
            .list_batches(BatchFilter::in_flight())
            .await?;
        let mut handles = Vec::new();
        for batch in batches {
            if !self.has_live_worker(&batch.id).await {
                handles.push(self.start_batch(&batch.id));
            }
        }
        if !handles.is_empty() {
            info!("Resuming {} incomplete batch(es)", handles.len());
        }
        Ok(handles)
    }

    pub async fn has_live_worker(&self, batch_id: &BatchId) -> bool {
        self.live_workers.read().await.contains(batch_id)
    }

    pub async fn get_active_batch(&self, cycle_id: &CycleId) -> PayoutResult<Option<BatchStatusView>> {
        let batches = self.storage.batch_storage();
        match batches.active_batch(cycle_id).await? {
            Some(batch) => {
                let chunks = batches.load_chunks(&batch.id).await?;
                Ok(Some(BatchStatusView::from_parts(&batch, &chunks)))
            }
            None => Ok(None),
        }
    }

    pub async fn get_batch_status(&self, batch_id: &BatchId) -> PayoutResult<BatchStatusView> {
        let batch = self.load_batch(batch_id).await?;
        let chunks = self.storage.batch_storage().load_chunks(batch_id).await?;
        Ok(BatchStatusView::from_parts(&batch, &chunks))
    }

    /// Totals and failures of a batch
    pub async fn get_batch_summary(&self, batch_id: &BatchId) -> PayoutResult<BatchSummary> {
        let batch = self.load_batch(batch_id).await?;
        let chunks = self.storage.batch_storage().load_chunks(batch_id).await?;

        let mut summary = BatchSummary {
            batch_id: batch.id.clone(),
            cycle_id: batch.cycle_id.clone(),
            status: batch.status,
            currency: batch.currency.clone(),
            processed_count: 0,
            failed_count: 0,
            total_amount: 0,
            failed_amount: 0,
            completed_at: batch.completed_at,
            failures: Vec::new(),
        };
        let mut paid = Vec::new();
        let mut unpaid = Vec::new();
        for item in chunks.iter().flat_map(|c| c.items.iter()) {
            match &item.outcome {
                ItemOutcome::Success { .. } => {
                    summary.processed_count += 1;
                    paid.push(item.amount);
                }
                ItemOutcome::Failed { error } => {
                    summary.failed_count += 1;
                    unpaid.push(item.amount);
                    summary.failures.push(FailedItemView {
                        winner_id: item.winner_id.clone(),
                        user_id: item.user_id.clone(),
                        destination: item.destination.clone(),
                        amount: item.amount,
                        error: error.clone(),
                    });
                }
                ItemOutcome::Pending => {}
            }
        }
        summary.total_amount = checked_total("total_amount", paid)?;
        summary.failed_amount = checked_total("failed_amount", unpaid)?;
        Ok(summary)
    }

    /// Batches of a cycle, oldest first
    pub async fn list_batches(&self, cycle_id: &CycleId) -> PayoutResult<Vec<PayoutBatch>> {
        Ok(self
            .storage
            .batch_storage()
            .list_batches(BatchFilter::for_cycle(cycle_id.clone()))
            .await?)
    }

    pub(super) async fn load_batch(&self, batch_id: &BatchId) -> PayoutResult<PayoutBatch> {
        self.storage
            .batch_storage()
            .load_batch(batch_id)
            .await?
            .ok_or_else(|| PayoutError::BatchNotFound(batch_id.clone()))
    }

    /// The cycle's selection; the cycle itself must exist
    pub(super) async fn load_selection(&self, cycle_id: &CycleId) -> PayoutResult<CycleSelection> {
        if self
            .storage
            .cycle_storage()
            .load_cycle(cycle_id)
            .await?
            .is_none()
        {
            return Err(PayoutError::InvalidCycle(format!("cycle {} not found", cycle_id)));
        }
        Ok(self
            .storage
            .selection_storage()
            .load_selection(cycle_id)
            .await?
            .unwrap_or_else(|| CycleSelection::empty(cycle_id.clone())))
    }

    async fn check_rate_limit(&self, cycle_id: &CycleId) -> PayoutResult<()> {
        let interval = self.config.min_batch_interval;
        if interval.is_zero() {
            return Ok(());
        }
        let Some(latest) = self.storage.batch_storage().latest_batch(cycle_id).await? else {
            return Ok(());
        };
        let elapsed = (Utc::now() - latest.created_at).to_std().unwrap_or_default();
        if elapsed < interval {
            let retry_after = interval - elapsed;
            debug!(
                "Rate limited batch creation for cycle {}; retry after {:?}",
                cycle_id, retry_after
            );
            return Err(PayoutError::RateLimited { retry_after });
        }
        Ok(())
    }
}

/// Run the worker until the batch settles, re-driving it after failures
/// that may clear on their own: retryable storage errors and lost chunk tasks
async fn drive_batch(
    worker: &BatchWorker,
    batch_id: &BatchId,
    policy: &RetryPolicy,
) -> PayoutResult<PayoutBatch> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match worker.run(batch_id).await {
            Ok(batch) => return Ok(batch),
            Err(e) if can_redrive(&e) && attempt < policy.max_attempts => {
                let delay = policy.next_delay(attempt, None);
                warn!(
                    "Worker for batch {} was interrupted (attempt {}/{}): {}; re-driving in {:?}",
                    batch_id, attempt, policy.max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn can_redrive(error: &PayoutError) -> bool {
    error.is_transient() || matches!(error, PayoutError::ConcurrencyConflict(_))
}
