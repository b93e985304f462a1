//! Chunked, resumable disbursement of sealed selections
//!
//! - [`orchestrator`]: validates and creates batches, reports on them
//! - [`worker`]: runs a batch's chunks against the provider
//! - [`poller`]: caller-side loop that follows a batch to the end
//! - [`retry_failed`]: follow-up batches for failed payouts

pub mod orchestrator;
pub mod poller;
pub mod retry_failed;
pub mod worker;

pub use orchestrator::{CreateBatchResult, DisbursementOrchestrator, EligibleCount};
pub use poller::{BatchPoller, BatchStatusSource, PollObserver, PollOutcome, ResumeOutcome};
pub use retry_failed::RetryResult;
pub use worker::BatchWorker;
