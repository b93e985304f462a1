//! Batch worker: drives the chunks of one batch through the provider
//!
//! Chunks run concurrently up to `max_parallel_chunks`. Every state change
//! is written to storage before the next step, so a worker that dies at any
//! point can be restarted on the same batch:
//!
//! - finished chunks are skipped
//! - items with an outcome are never resubmitted
//! - a chunk left in `submitting` is resubmitted with the same idempotency
//!   keys, and the provider answers already-paid items with their original
//!   outcome

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::DisbursementConfig;
use crate::error::{PayoutError, PayoutResult};
use crate::model::{BatchChunk, BatchId, BatchStatus, ChunkStatus, ItemOutcome, PayoutBatch};
use crate::providers::{ChunkSubmission, DisbursementProvider, ItemReceipt, ProviderError};
use crate::storage::{PaidWinner, UnifiedStorage};

#[derive(Clone)]
pub struct BatchWorker {
    storage: Arc<dyn UnifiedStorage>,
    provider: Arc<dyn DisbursementProvider>,
    config: DisbursementConfig,
}

impl BatchWorker {
    pub fn new(
        storage: Arc<dyn UnifiedStorage>,
        provider: Arc<dyn DisbursementProvider>,
        config: DisbursementConfig,
    ) -> Self {
        Self {
            storage,
            provider,
            config,
        }
    }

    /// The stored batch, as it is now
    pub async fn current(&self, batch_id: &BatchId) -> PayoutResult<PayoutBatch> {
        self.storage
            .batch_storage()
            .load_batch(batch_id)
            .await?
            .ok_or_else(|| PayoutError::BatchNotFound(batch_id.clone()))
    }

    /// Run a batch to a terminal status and return it
    pub async fn run(&self, batch_id: &BatchId) -> PayoutResult<PayoutBatch> {
        let batches = self.storage.batch_storage();
        let mut batch = self.current(batch_id).await?;

        if batch.status.is_terminal() {
            debug!("Batch {} is already {}", batch_id, batch.status);
            return Ok(batch);
        }
        if batch.status == BatchStatus::Created {
            batch = batches
                .transition_batch(batch_id, BatchStatus::Processing, None)
                .await?;
            info!(
                "Processing batch {} for cycle {}: {} payouts in {} chunks",
                batch.id, batch.cycle_id, batch.total_items, batch.chunk_count
            );
        } else {
            info!("Resuming batch {} for cycle {}", batch.id, batch.cycle_id);
        }

        let chunks = batches.load_chunks(batch_id).await?;
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_chunks.max(1)));
        let batch = Arc::new(batch);
        let mut handles = Vec::new();

        for chunk in chunks.into_iter().filter(|c| !c.status.is_finished()) {
            let worker = self.clone();
            let batch = batch.clone();
            let sem = semaphore.clone();
            handles.push(tokio::spawn(async move {
                worker.execute_chunk_with_permit(sem, batch, chunk).await
            }));
        }

        // A storage failure leaves the batch in `processing` for the next resume
        let mut interrupted = None;
        for handle in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(PayoutError::ConcurrencyConflict(format!(
                    "chunk task failed: {}",
                    e
                ))),
            };
            if let Err(e) = outcome {
                error!("Chunk of batch {} was interrupted: {}", batch.id, e);
                interrupted.get_or_insert(e);
            }
        }
        if let Some(e) = interrupted {
            return Err(e);
        }

        self.finalize(&batch).await
    }

    async fn execute_chunk_with_permit(
        self,
        semaphore: Arc<Semaphore>,
        batch: Arc<PayoutBatch>,
        chunk: BatchChunk,
    ) -> PayoutResult<BatchChunk> {
        let _permit = semaphore
            .acquire()
            .await
            .map_err(|e| PayoutError::ConcurrencyConflict(e.to_string()))?;
        self.execute_chunk(&batch, chunk).await
    }

    /// Submit the pending items of one chunk, retrying transient failures
    pub async fn execute_chunk(
        &self,
        batch: &PayoutBatch,
        mut chunk: BatchChunk,
    ) -> PayoutResult<BatchChunk> {
        if chunk.status.is_finished() {
            return Ok(chunk);
        }

        let retry = &self.config.retry;
        let mut attempt = 0;
        while chunk.pending_items().next().is_some() {
            attempt += 1;
            chunk.status = ChunkStatus::Submitting;
            chunk.attempts += 1;
            chunk.updated_at = Utc::now();
            self.storage.batch_storage().save_chunk(&chunk).await?;

            let submission = ChunkSubmission::pending(&chunk, &batch.currency);
            debug!(
                "Submitting chunk {} of batch {} (attempt {}, {} items)",
                chunk.index,
                batch.id,
                attempt,
                submission.items.len()
            );

            let error = match self.submit(&submission).await {
                Ok(receipts) => {
                    let missing = self.apply_receipts(batch, &mut chunk, receipts).await?;
                    if missing == 0 {
                        break;
                    }
                    ProviderError::Transient(format!(
                        "provider returned no outcome for {} item(s)",
                        missing
                    ))
                }
                Err(e) => e,
            };

            chunk.last_error = Some(error.to_string());
            if error.is_retryable() && attempt < retry.max_attempts {
                let delay = retry.next_delay(attempt, error.retry_after());
                warn!(
                    "Chunk {} of batch {} failed (attempt {}/{}): {}; retrying in {:?}",
                    chunk.index, batch.id, attempt, retry.max_attempts, error, delay
                );
                chunk.updated_at = Utc::now();
                self.storage.batch_storage().save_chunk(&chunk).await?;
                tokio::time::sleep(delay).await;
                continue;
            }

            warn!(
                "Chunk {} of batch {} failed after {} attempt(s): {}",
                chunk.index, batch.id, attempt, error
            );
            return self.fail_chunk(chunk, &error).await;
        }

        chunk.status = ChunkStatus::Completed;
        chunk.updated_at = Utc::now();
        self.storage.batch_storage().save_chunk(&chunk).await?;
        debug!(
            "Chunk {} of batch {} completed: {} paid, {} failed",
            chunk.index,
            batch.id,
            chunk.succeeded(),
            chunk.failed()
        );
        Ok(chunk)
    }

    async fn submit(&self, submission: &ChunkSubmission) -> Result<Vec<ItemReceipt>, ProviderError> {
        let timeout = self.config.provider_timeout;
        match tokio::time::timeout(timeout, self.provider.submit(submission)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Transient(format!(
                "provider call timed out after {:?}",
                timeout
            ))),
        }
    }

    /// Record outcomes on the chunk. Winners are marked processed before the
    /// chunk is written. Returns how many pending items got no receipt.
    async fn apply_receipts(
        &self,
        batch: &PayoutBatch,
        chunk: &mut BatchChunk,
        receipts: Vec<ItemReceipt>,
    ) -> PayoutResult<usize> {
        let mut paid = Vec::new();
        let mut missing = 0;
        for item in chunk
            .items
            .iter_mut()
            .filter(|i| matches!(i.outcome, ItemOutcome::Pending))
        {
            match receipts
                .iter()
                .find(|r| r.idempotency_key == item.idempotency_key)
            {
                Some(receipt) => {
                    if let ItemOutcome::Success { reference } = &receipt.outcome {
                        paid.push(PaidWinner {
                            winner_id: item.winner_id.clone(),
                            reference: reference.clone(),
                        });
                    }
                    item.outcome = receipt.outcome.clone();
                }
                None => missing += 1,
            }
        }

        if !paid.is_empty() {
            self.storage
                .selection_storage()
                .record_payouts(&batch.cycle_id, &paid)
                .await?;
        }
        chunk.updated_at = Utc::now();
        self.storage.batch_storage().save_chunk(chunk).await?;
        Ok(missing)
    }

    async fn fail_chunk(&self, mut chunk: BatchChunk, error: &ProviderError) -> PayoutResult<BatchChunk> {
        let message = error.to_string();
        for item in chunk
            .items
            .iter_mut()
            .filter(|i| matches!(i.outcome, ItemOutcome::Pending))
        {
            item.outcome = ItemOutcome::Failed {
                error: message.clone(),
            };
        }
        chunk.status = ChunkStatus::Failed;
        chunk.last_error = Some(message);
        chunk.updated_at = Utc::now();
        self.storage.batch_storage().save_chunk(&chunk).await?;
        Ok(chunk)
    }

    /// Settle the batch from its stored chunks
    async fn finalize(&self, batch: &PayoutBatch) -> PayoutResult<PayoutBatch> {
        let chunks = self.storage.batch_storage().load_chunks(&batch.id).await?;

        // Idempotent; covers a worker that died between marking winners and
        // writing the chunk
        let paid: Vec<PaidWinner> = chunks
            .iter()
            .flat_map(|c| c.items.iter())
            .filter_map(|item| match &item.outcome {
                ItemOutcome::Success { reference } => Some(PaidWinner {
                    winner_id: item.winner_id.clone(),
                    reference: reference.clone(),
                }),
                _ => None,
            })
            .collect();
        if !paid.is_empty() {
            self.storage
                .selection_storage()
                .record_payouts(&batch.cycle_id, &paid)
                .await?;
        }

        let failed_chunks = chunks.iter().filter(|c| c.status == ChunkStatus::Failed).count();
        let failed_items: usize = chunks.iter().map(BatchChunk::failed).sum();
        let (status, error) = if failed_chunks == 0 && failed_items == 0 {
            (BatchStatus::Completed, None)
        } else {
            (
                BatchStatus::Failed,
                Some(format!(
                    "{} of {} payouts failed ({} chunk(s) failed)",
                    failed_items, batch.total_items, failed_chunks
                )),
            )
        };

        let settled = self
            .storage
            .batch_storage()
            .transition_batch(&batch.id, status, error)
            .await?;
        match settled.status {
            BatchStatus::Completed => info!(
                "Batch {} completed: {} payouts sent",
                settled.id, paid.len()
            ),
            _ => warn!(
                "Batch {} failed: {}",
                settled.id,
                settled.error.as_deref().unwrap_or("unknown error")
            ),
        }
        Ok(settled)
    }
}
