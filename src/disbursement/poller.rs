//! Caller-side batch status poller
//!
//! Storage is the only source of truth; the poller re-reads the batch on
//! every tick and derives progress from it. The loop ends when the batch is
//! terminal, when the stop signal is raised, or when the optional cap on
//! consecutive fetch errors is reached. Terminal side effects fire at most
//! once per batch per poller.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::orchestrator::DisbursementOrchestrator;
use crate::config::PollerConfig;
use crate::core::progress::ProcessingProgress;
use crate::error::{PayoutError, PayoutResult};
use crate::model::{BatchId, BatchStatusView, BatchSummary, CycleId};

/// Where the poller reads batch state from
#[async_trait]
pub trait BatchStatusSource: Send + Sync {
    async fn active_batch(&self, cycle_id: &CycleId) -> PayoutResult<Option<BatchStatusView>>;

    /// The most recent batch of a cycle, terminal or not
    async fn latest_batch(&self, cycle_id: &CycleId) -> PayoutResult<Option<BatchStatusView>>;

    async fn batch_status(&self, batch_id: &BatchId) -> PayoutResult<BatchStatusView>;

    async fn batch_summary(&self, batch_id: &BatchId) -> PayoutResult<BatchSummary>;
}

#[async_trait]
impl BatchStatusSource for DisbursementOrchestrator {
    async fn active_batch(&self, cycle_id: &CycleId) -> PayoutResult<Option<BatchStatusView>> {
        self.get_active_batch(cycle_id).await
    }

    async fn latest_batch(&self, cycle_id: &CycleId) -> PayoutResult<Option<BatchStatusView>> {
        match self.storage.batch_storage().latest_batch(cycle_id).await? {
            Some(batch) => Ok(Some(self.get_batch_status(&batch.id).await?)),
            None => Ok(None),
        }
    }

    async fn batch_status(&self, batch_id: &BatchId) -> PayoutResult<BatchStatusView> {
        self.get_batch_status(batch_id).await
    }

    async fn batch_summary(&self, batch_id: &BatchId) -> PayoutResult<BatchSummary> {
        self.get_batch_summary(batch_id).await
    }
}

/// Receives what the poller sees
pub trait PollObserver: Send + Sync {
    fn on_progress(&self, _progress: &ProcessingProgress) {}

    fn on_error(&self, _error: &PayoutError, _consecutive: u32) {}

    /// Called once when the batch reaches a terminal status. `summary` is
    /// `None` when it could not be fetched.
    fn on_terminal(&self, view: &BatchStatusView, summary: Option<&BatchSummary>);
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Finished(BatchStatusView),
    Stopped,
    GaveUp { consecutive_errors: u32, last_error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    /// The cycle never had a batch
    NoActiveBatch,
    /// The latest batch had already finished; reported without polling
    AlreadyFinished(BatchSummary),
    /// An in-flight batch was found and polled
    Resumed { batch_id: BatchId, outcome: PollOutcome },
}

pub struct BatchPoller {
    source: Arc<dyn BatchStatusSource>,
    config: PollerConfig,
    handled: Mutex<HashSet<BatchId>>,
}

impl BatchPoller {
    pub fn new(source: Arc<dyn BatchStatusSource>, config: PollerConfig) -> Self {
        Self {
            source,
            config,
            handled: Mutex::new(HashSet::new()),
        }
    }

    /// Poll `batch_id` until it is terminal or `stop` becomes true
    pub async fn poll(
        &self,
        batch_id: &BatchId,
        observer: &dyn PollObserver,
        mut stop: watch::Receiver<bool>,
    ) -> PollOutcome {
        let mut consecutive_errors = 0u32;
        let mut last_percent = 0u8;

        loop {
            if *stop.borrow() {
                debug!("Polling of batch {} stopped", batch_id);
                return PollOutcome::Stopped;
            }

            let wait = match self.source.batch_status(batch_id).await {
                Ok(view) => {
                    consecutive_errors = 0;
                    let mut progress = ProcessingProgress::from_status(&view);
                    if !view.status.is_terminal() {
                        progress.percent = progress.percent.max(last_percent);
                    }
                    last_percent = progress.percent;
                    observer.on_progress(&progress);

                    if view.status.is_terminal() {
                        self.fire_terminal(&view, observer).await;
                        return PollOutcome::Finished(view);
                    }
                    self.config.interval
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(
                        "Failed to fetch status of batch {} ({} in a row): {}",
                        batch_id, consecutive_errors, e
                    );
                    observer.on_error(&e, consecutive_errors);
                    if let Some(max) = self.config.max_consecutive_errors {
                        if consecutive_errors >= max {
                            return PollOutcome::GaveUp {
                                consecutive_errors,
                                last_error: e.to_string(),
                            };
                        }
                    }
                    self.config.error_interval
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = stop_requested(&mut stop) => {
                    debug!("Polling of batch {} stopped", batch_id);
                    return PollOutcome::Stopped;
                }
            }
        }
    }

    /// Pick up the disbursement of a cycle after a reload
    pub async fn resume(
        &self,
        cycle_id: &CycleId,
        observer: &dyn PollObserver,
        stop: watch::Receiver<bool>,
    ) -> PayoutResult<ResumeOutcome> {
        if let Some(active) = self.source.active_batch(cycle_id).await? {
            info!(
                "Resuming progress of batch {} for cycle {}",
                active.batch_id, cycle_id
            );
            let outcome = self.poll(&active.batch_id, observer, stop).await;
            return Ok(ResumeOutcome::Resumed {
                batch_id: active.batch_id,
                outcome,
            });
        }

        match self.source.latest_batch(cycle_id).await? {
            Some(latest) if latest.status.is_terminal() => {
                let summary = self.source.batch_summary(&latest.batch_id).await?;
                if self.mark_handled(&latest.batch_id) {
                    observer.on_terminal(&latest, Some(&summary));
                }
                Ok(ResumeOutcome::AlreadyFinished(summary))
            }
            Some(latest) => {
                // Started between the two reads
                let outcome = self.poll(&latest.batch_id, observer, stop).await;
                Ok(ResumeOutcome::Resumed {
                    batch_id: latest.batch_id,
                    outcome,
                })
            }
            None => Ok(ResumeOutcome::NoActiveBatch),
        }
    }

    async fn fire_terminal(&self, view: &BatchStatusView, observer: &dyn PollObserver) {
        if !self.mark_handled(&view.batch_id) {
            return;
        }
        let summary = match self.source.batch_summary(&view.batch_id).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!("Failed to fetch summary of batch {}: {}", view.batch_id, e);
                None
            }
        };
        observer.on_terminal(view, summary.as_ref());
    }

    /// True the first time a batch is seen terminal
    fn mark_handled(&self, batch_id: &BatchId) -> bool {
        match self.handled.lock() {
            Ok(mut handled) => handled.insert(batch_id.clone()),
            Err(poisoned) => poisoned.into_inner().insert(batch_id.clone()),
        }
    }
}

/// Resolves once `stop` is set; never when the sender is gone
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}
