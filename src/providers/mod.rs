//! Collaborators the engine talks to through traits
//!
//! - [`MemberSource`]: the accrual service that reports eligible members
//! - [`DestinationValidator`]: payout destination checks before a batch
//! - [`DisbursementProvider`]: the payment processor that moves money

pub mod http;
pub mod roster;
pub mod validation;

pub use http::HttpDisbursementProvider;
pub use roster::StoredMemberSource;
pub use validation::{DestinationReport, EmailDestinationValidator};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::error::PayoutResult;
use crate::model::{BatchChunk, BatchId, Cycle, EligibleMember, ItemOutcome, UserId, WinnerId};

/// Source of the members eligible for selection in a cycle
#[async_trait]
pub trait MemberSource: Send + Sync {
    async fn eligible_members(&self, cycle: &Cycle) -> PayoutResult<Vec<EligibleMember>>;
}

/// Checks payout destinations before money is sent
#[async_trait]
pub trait DestinationValidator: Send + Sync {
    async fn validate(&self, destinations: &[String]) -> DestinationReport;
}

/// Failure of a whole provider call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Transient provider failure: {0}")]
    Transient(String),

    #[error("Provider rate limited the request")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The provider refused the request; resubmitting will not help
    #[error("Provider rejected the request: {0}")]
    Rejected(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::Rejected(_))
    }

    /// Delay the provider asked for, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// One payout as sent to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutInstruction {
    pub idempotency_key: String,
    pub winner_id: WinnerId,
    pub user_id: UserId,
    pub destination: String,
    /// Minor units
    pub amount: i64,
}

/// The pending items of one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSubmission {
    pub batch_id: BatchId,
    pub chunk_index: usize,
    pub currency: String,
    pub items: Vec<PayoutInstruction>,
}

impl ChunkSubmission {
    /// Build a submission from the items of `chunk` that have no outcome yet
    pub fn pending(chunk: &BatchChunk, currency: &str) -> Self {
        Self {
            batch_id: chunk.batch_id.clone(),
            chunk_index: chunk.index,
            currency: currency.to_string(),
            items: chunk
                .pending_items()
                .map(|item| PayoutInstruction {
                    idempotency_key: item.idempotency_key.clone(),
                    winner_id: item.winner_id.clone(),
                    user_id: item.user_id.clone(),
                    destination: item.destination.clone(),
                    amount: item.amount,
                })
                .collect(),
        }
    }
}

/// Provider verdict for one item, matched by idempotency key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReceipt {
    pub idempotency_key: String,
    pub outcome: ItemOutcome,
}

/// The external payment processor
#[async_trait]
pub trait DisbursementProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn health_check(&self) -> Result<(), ProviderError>;

    /// Submit a chunk. Items the provider already saw under the same
    /// idempotency key must be answered with their original outcome.
    async fn submit(&self, submission: &ChunkSubmission) -> Result<Vec<ItemReceipt>, ProviderError>;
}
