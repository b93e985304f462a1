//! Follow-up batches for the failed items of a finished batch

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

use super::orchestrator::{CreateBatchResult, DisbursementOrchestrator};
use crate::error::{PayoutError, PayoutResult};
use crate::model::{BatchId, BatchOrigin, DisbursementMode, WinnerId, WinnerRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryResult {
    pub batch_id: BatchId,
    pub retry_of: BatchId,
    pub retried_items: usize,
    /// Failed items left out because the winner was paid or removed since
    pub skipped_items: usize,
}

impl DisbursementOrchestrator {
    /// Create a new batch over the failed items of `batch_id`. The source
    /// batch is left untouched.
    pub async fn retry_failed(&self, batch_id: &BatchId, actor: &str) -> PayoutResult<RetryResult> {
        let source = self.load_batch(batch_id).await?;
        if !source.status.is_terminal() {
            return Err(PayoutError::BatchInProgress(batch_id.clone()));
        }

        let chunks = self.storage.batch_storage().load_chunks(batch_id).await?;
        let mut seen = HashSet::new();
        let failed: Vec<WinnerId> = chunks
            .iter()
            .flat_map(|c| c.items.iter())
            .filter(|item| item.outcome.is_failed())
            .map(|item| item.winner_id.clone())
            .filter(|id| seen.insert(id.clone()))
            .collect();
        if failed.is_empty() {
            return Err(PayoutError::NoFailedItems(batch_id.clone()));
        }

        let selection = self.load_selection(&source.cycle_id).await?;
        let targets: Vec<WinnerRecord> = failed
            .iter()
            .filter_map(|id| selection.winner(id))
            .filter(|w| w.is_disbursable())
            .cloned()
            .collect();
        if targets.is_empty() {
            return Err(PayoutError::NoFailedItems(batch_id.clone()));
        }

        let skipped_items = failed.len() - targets.len();
        let ids = targets.iter().map(|w| w.id.clone()).collect();
        let CreateBatchResult { batch_id: new_id, total_eligible, .. } = self
            .insert_batch(
                &selection,
                targets,
                DisbursementMode::Selected(ids),
                BatchOrigin::RetryOf(batch_id.clone()),
                actor,
            )
            .await?;

        info!(
            "Batch {} retries {} failed payout(s) of batch {} ({} skipped)",
            new_id, total_eligible, batch_id, skipped_items
        );
        Ok(RetryResult {
            batch_id: new_id,
            retry_of: batch_id.clone(),
            retried_items: total_eligible,
            skipped_items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::ErrorKind;
    use crate::model::{BatchStatus, CycleId, PayoutStatus};
    use crate::providers::EmailDestinationValidator;
    use crate::storage::{StorageFactory, UnifiedStorage, WriteGuard};
    use crate::testing::fixtures::stored_sealed_selection;
    use crate::testing::mocks::ScriptedProvider;
    use std::sync::Arc;

    async fn failed_batch(
        provider: &ScriptedProvider,
    ) -> (DisbursementOrchestrator, Arc<dyn UnifiedStorage>, BatchId) {
        let storage = StorageFactory::memory();
        stored_sealed_selection(storage.as_ref(), "c1", 4).await;
        let orchestrator = DisbursementOrchestrator::new(
            storage.clone(),
            Arc::new(provider.clone()),
            Arc::new(EmailDestinationValidator::new()),
            EngineConfig::for_tests().disbursement,
        );
        let created = orchestrator
            .create_batch(&CycleId::from("c1"), DisbursementMode::All, "admin")
            .await
            .unwrap();
        let settled = orchestrator.run_batch(&created.batch_id).await.unwrap();
        assert_eq!(settled.status, BatchStatus::Failed);
        (orchestrator, storage, created.batch_id)
    }

    fn provider() -> ScriptedProvider {
        ScriptedProvider::builder()
            .with_failing_destination("u02@example.com", "declined")
            .with_failing_destination("u03@example.com", "declined")
            .build()
    }

    #[tokio::test]
    async fn test_retry_covers_exactly_the_failed_winners() {
        let provider = provider();
        let (orchestrator, _, source) = failed_batch(&provider).await;
        provider.heal_destination("u02@example.com");
        provider.heal_destination("u03@example.com");

        let retry = orchestrator.retry_failed(&source, "admin").await.unwrap();
        assert_eq!(retry.retried_items, 2);
        assert_eq!(retry.skipped_items, 0);

        let settled = orchestrator.run_batch(&retry.batch_id).await.unwrap();
        assert_eq!(settled.status, BatchStatus::Completed);
        assert_eq!(settled.origin, BatchOrigin::RetryOf(source.clone()));

        let original = orchestrator.get_batch_summary(&source).await.unwrap();
        assert_eq!(original.status, BatchStatus::Failed);
        assert_eq!(original.failed_count, 2);
    }

    #[tokio::test]
    async fn test_removed_winners_are_skipped() {
        let provider = provider();
        let (orchestrator, storage, source) = failed_batch(&provider).await;

        let cycle = CycleId::from("c1");
        let mut selection = storage
            .selection_storage()
            .load_selection(&cycle)
            .await
            .unwrap()
            .unwrap();
        selection.winners[1].payout_status = PayoutStatus::Removed;
        storage
            .selection_storage()
            .store_selection(selection.clone(), WriteGuard::version(selection.version))
            .await
            .unwrap();

        let retry = orchestrator.retry_failed(&source, "admin").await.unwrap();
        assert_eq!(retry.retried_items, 1);
        assert_eq!(retry.skipped_items, 1);
    }

    #[tokio::test]
    async fn test_retry_guards() {
        let (orchestrator, _, source) = failed_batch(&provider()).await;
        let retry = orchestrator.retry_failed(&source, "admin").await.unwrap();

        let err = orchestrator.retry_failed(&retry.batch_id, "admin").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BatchInProgress);

        orchestrator.run_batch(&retry.batch_id).await.unwrap();
        let err = orchestrator
            .retry_failed(&BatchId::from("missing"), "admin")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BatchNotFound);
    }

    #[tokio::test]
    async fn test_nothing_to_retry() {
        let storage = StorageFactory::memory();
        stored_sealed_selection(storage.as_ref(), "c1", 2).await;
        let orchestrator = DisbursementOrchestrator::new(
            storage,
            Arc::new(ScriptedProvider::new()),
            Arc::new(EmailDestinationValidator::new()),
            EngineConfig::for_tests().disbursement,
        );
        let created = orchestrator
            .create_batch(&CycleId::from("c1"), DisbursementMode::All, "admin")
            .await
            .unwrap();
        orchestrator.run_batch(&created.batch_id).await.unwrap();

        let err = orchestrator
            .retry_failed(&created.batch_id, "admin")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoFailedItems);
    }
}
