//! Progress projection of a batch, recomputed on every poll

use serde::{Deserialize, Serialize};

use crate::model::{BatchId, BatchStatus, BatchStatusView};

/// Lower bound shown once a batch exists, so a started batch never reads 0%
pub const MIN_ACTIVE_PERCENT: u8 = 10;
/// Upper bound while the batch is not completed
pub const MAX_ACTIVE_PERCENT: u8 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingPhase {
    Idle,
    Initializing,
    Validation,
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingProgress {
    pub phase: ProcessingPhase,
    pub percent: u8,
    pub message: String,
    pub batch_id: Option<BatchId>,
    pub completed_chunks: usize,
    pub total_chunks: usize,
    pub processed_items: usize,
    pub failed_items: usize,
    pub total_items: usize,
}

/// `clamp(floor(completed / total * 100), 10, 99)` until the batch is
/// completed, then 100
pub fn progress_percent(status: BatchStatus, completed_chunks: usize, total_chunks: usize) -> u8 {
    if status == BatchStatus::Completed {
        return 100;
    }
    let raw = if total_chunks == 0 {
        0
    } else {
        (completed_chunks.min(total_chunks) * 100 / total_chunks) as u8
    };
    raw.clamp(MIN_ACTIVE_PERCENT, MAX_ACTIVE_PERCENT)
}

impl ProcessingProgress {
    pub fn idle() -> Self {
        Self::phase(ProcessingPhase::Idle, 0, "No disbursement in progress")
    }

    /// Progress before a batch exists, e.g. while a request is validated
    pub fn phase(phase: ProcessingPhase, percent: u8, message: impl Into<String>) -> Self {
        Self {
            phase,
            percent,
            message: message.into(),
            batch_id: None,
            completed_chunks: 0,
            total_chunks: 0,
            processed_items: 0,
            failed_items: 0,
            total_items: 0,
        }
    }

    pub fn from_status(view: &BatchStatusView) -> Self {
        let (phase, message) = match view.status {
            BatchStatus::Created => (
                ProcessingPhase::Initializing,
                "Batch created, waiting for the worker".to_string(),
            ),
            BatchStatus::Processing => (
                ProcessingPhase::Processing,
                format!(
                    "Processed {} of {} chunks",
                    view.completed_chunks, view.total_chunks
                ),
            ),
            BatchStatus::Completed => (
                ProcessingPhase::Completed,
                format!("Paid {} of {} winners", view.processed_items, view.total_items),
            ),
            BatchStatus::Failed => (
                ProcessingPhase::Error,
                view.error.clone().unwrap_or_else(|| {
                    format!(
                        "{} of {} payouts failed",
                        view.failed_items, view.total_items
                    )
                }),
            ),
        };
        Self {
            phase,
            percent: progress_percent(view.status, view.completed_chunks, view.total_chunks),
            message,
            batch_id: Some(view.batch_id.clone()),
            completed_chunks: view.completed_chunks,
            total_chunks: view.total_chunks,
            processed_items: view.processed_items,
            failed_items: view.failed_items,
            total_items: view.total_items,
        }
    }
}
