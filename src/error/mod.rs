//! Error taxonomy for selection, sealing and disbursement
//!
//! Every error carries a numeric code from [`ErrorCode`], a machine readable
//! [`ErrorKind`], and where the caller can act on it, structured remediation
//! data so a client can offer a specific next step.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod codes;

pub use codes::{describe_error_code, ErrorCode};

use crate::model::{BatchId, CycleId, SelectionState, UserId, WinnerId};
use crate::providers::validation::DestinationReport;
use crate::storage::StorageError;

pub type PayoutResult<T> = Result<T, PayoutError>;

/// The unified error type for the engine
#[derive(Error, Debug)]
pub enum PayoutError {
    #[error("[E{code:04}] Invalid request: {0}", code = ErrorCode::INVALID_REQUEST)]
    InvalidRequest(String),

    #[error("[E{code:04}] Invalid cycle: {0}", code = ErrorCode::INVALID_CYCLE)]
    InvalidCycle(String),

    #[error("[E{code:04}] Invalid selection mode: {0}", code = ErrorCode::INVALID_MODE)]
    InvalidMode(String),

    #[error("[E{code:04}] Invalid percentage: {0} (expected 0-100)", code = ErrorCode::INVALID_PERCENTAGE)]
    InvalidPercentage(f64),

    #[error("[E{code:04}] Invalid amount for {field}: {value}", code = ErrorCode::INVALID_AMOUNT)]
    InvalidAmount { field: String, value: i64 },

    #[error(
        "[E{code:04}] Cannot {event} a selection in state {from}: {reason}",
        code = ErrorCode::INVALID_TRANSITION
    )]
    InvalidTransition {
        from: SelectionState,
        event: String,
        reason: String,
    },

    #[error(
        "[E{code:04}] Seal confirmation incomplete, missing: {list}",
        code = ErrorCode::CONFIRMATION_REQUIRED,
        list = .missing.join(", ")
    )]
    ConfirmationRequired { missing: Vec<String> },

    #[error(
        "[E{code:04}] {count} member(s) are not eligible in this cycle",
        code = ErrorCode::INELIGIBLE_MEMBERS,
        count = .user_ids.len()
    )]
    IneligibleMembers { user_ids: Vec<UserId> },

    #[error("[E{code:04}] Winner not found: {0}", code = ErrorCode::WINNER_NOT_FOUND)]
    WinnerNotFound(WinnerId),

    #[error("[E{code:04}] Selection for cycle {0} is sealed", code = ErrorCode::SELECTION_SEALED)]
    SelectionSealed(CycleId),

    #[error(
        "[E{code:04}] Selection for cycle {cycle_id} is {state}, not sealed",
        code = ErrorCode::SELECTION_NOT_SEALED
    )]
    SelectionNotSealed {
        cycle_id: CycleId,
        state: SelectionState,
    },

    #[error(
        "[E{code:04}] {processed} payout(s) already processed for cycle {cycle_id}",
        code = ErrorCode::PAYOUTS_ALREADY_PROCESSED
    )]
    PayoutsAlreadyProcessed { cycle_id: CycleId, processed: usize },

    #[error("[E{code:04}] No eligible winners for cycle {0}", code = ErrorCode::NO_ELIGIBLE_WINNERS)]
    NoEligibleWinners(CycleId),

    #[error("[E{code:04}] Concurrency conflict: {0}", code = ErrorCode::CONCURRENCY_CONFLICT)]
    ConcurrencyConflict(String),

    #[error(
        "[E{code:04}] Destination validation failed: {invalid} invalid, {disposable} disposable",
        code = ErrorCode::VALIDATION_FAILED,
        invalid = .0.invalid_emails.len(),
        disposable = .0.disposable_emails.len()
    )]
    ValidationError(DestinationReport),

    #[error(
        "[E{code:04}] Rate limited, retry after {secs}s",
        code = ErrorCode::RATE_LIMITED,
        secs = .retry_after.as_secs()
    )]
    RateLimited { retry_after: Duration },

    #[error("[E{code:04}] Provider unavailable: {0}", code = ErrorCode::PROVIDER_UNAVAILABLE)]
    ProviderUnavailable(String),

    #[error("[E{code:04}] Batch not found: {0}", code = ErrorCode::BATCH_NOT_FOUND)]
    BatchNotFound(BatchId),

    #[error("[E{code:04}] Batch {0} is still in progress", code = ErrorCode::BATCH_IN_PROGRESS)]
    BatchInProgress(BatchId),

    #[error("[E{code:04}] Batch {0} has no failed items", code = ErrorCode::NO_FAILED_ITEMS)]
    NoFailedItems(BatchId),

    /// A remote engine could not be reached or answered with an error
    #[error("[E{code:04}] Status endpoint error: {0}", code = ErrorCode::STATUS_UNAVAILABLE)]
    StatusUnavailable(String),

    #[error("[E{code:04}] Storage error: {0}", code = ErrorCode::STORAGE_GENERIC)]
    Storage(#[source] StorageError),

    #[error("[E{code:04}] Configuration error: {0}", code = ErrorCode::CONFIG_INVALID)]
    Config(String),
}

/// Machine-readable error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    InvalidCycle,
    InvalidMode,
    InvalidPercentage,
    InvalidAmount,
    InvalidTransition,
    ConfirmationRequired,
    IneligibleMembers,
    WinnerNotFound,
    SelectionSealed,
    SelectionNotSealed,
    PayoutsAlreadyProcessed,
    NoEligibleWinners,
    ConcurrencyConflict,
    ValidationError,
    RateLimited,
    ProviderUnavailable,
    BatchNotFound,
    BatchInProgress,
    NoFailedItems,
    StatusUnavailable,
    Storage,
    Config,
}

/// Structured data a caller can use to fix the request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remediation {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_emails: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disposable_emails: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ineligible_user_ids: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_confirmations: Vec<String>,
}

/// Wire form of an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<Remediation>,
}

impl PayoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::InvalidCycle(_) => ErrorKind::InvalidCycle,
            Self::InvalidMode(_) => ErrorKind::InvalidMode,
            Self::InvalidPercentage(_) => ErrorKind::InvalidPercentage,
            Self::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::ConfirmationRequired { .. } => ErrorKind::ConfirmationRequired,
            Self::IneligibleMembers { .. } => ErrorKind::IneligibleMembers,
            Self::WinnerNotFound(_) => ErrorKind::WinnerNotFound,
            Self::SelectionSealed(_) => ErrorKind::SelectionSealed,
            Self::SelectionNotSealed { .. } => ErrorKind::SelectionNotSealed,
            Self::PayoutsAlreadyProcessed { .. } => ErrorKind::PayoutsAlreadyProcessed,
            Self::NoEligibleWinners(_) => ErrorKind::NoEligibleWinners,
            Self::ConcurrencyConflict(_) => ErrorKind::ConcurrencyConflict,
            Self::ValidationError(_) => ErrorKind::ValidationError,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            Self::BatchNotFound(_) => ErrorKind::BatchNotFound,
            Self::BatchInProgress(_) => ErrorKind::BatchInProgress,
            Self::NoFailedItems(_) => ErrorKind::NoFailedItems,
            Self::StatusUnavailable(_) => ErrorKind::StatusUnavailable,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    pub fn code(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidRequest => ErrorCode::INVALID_REQUEST,
            ErrorKind::InvalidCycle => ErrorCode::INVALID_CYCLE,
            ErrorKind::InvalidMode => ErrorCode::INVALID_MODE,
            ErrorKind::InvalidPercentage => ErrorCode::INVALID_PERCENTAGE,
            ErrorKind::InvalidAmount => ErrorCode::INVALID_AMOUNT,
            ErrorKind::InvalidTransition => ErrorCode::INVALID_TRANSITION,
            ErrorKind::ConfirmationRequired => ErrorCode::CONFIRMATION_REQUIRED,
            ErrorKind::IneligibleMembers => ErrorCode::INELIGIBLE_MEMBERS,
            ErrorKind::WinnerNotFound => ErrorCode::WINNER_NOT_FOUND,
            ErrorKind::SelectionSealed => ErrorCode::SELECTION_SEALED,
            ErrorKind::SelectionNotSealed => ErrorCode::SELECTION_NOT_SEALED,
            ErrorKind::PayoutsAlreadyProcessed => ErrorCode::PAYOUTS_ALREADY_PROCESSED,
            ErrorKind::NoEligibleWinners => ErrorCode::NO_ELIGIBLE_WINNERS,
            ErrorKind::ConcurrencyConflict => ErrorCode::CONCURRENCY_CONFLICT,
            ErrorKind::ValidationError => ErrorCode::VALIDATION_FAILED,
            ErrorKind::RateLimited => ErrorCode::RATE_LIMITED,
            ErrorKind::ProviderUnavailable => ErrorCode::PROVIDER_UNAVAILABLE,
            ErrorKind::BatchNotFound => ErrorCode::BATCH_NOT_FOUND,
            ErrorKind::BatchInProgress => ErrorCode::BATCH_IN_PROGRESS,
            ErrorKind::NoFailedItems => ErrorCode::NO_FAILED_ITEMS,
            ErrorKind::StatusUnavailable => ErrorCode::STATUS_UNAVAILABLE,
            ErrorKind::Storage => ErrorCode::STORAGE_GENERIC,
            ErrorKind::Config => ErrorCode::CONFIG_INVALID,
        }
    }

    /// HTTP status a transport layer should answer with
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidRequest
            | ErrorKind::InvalidMode
            | ErrorKind::InvalidPercentage
            | ErrorKind::InvalidAmount
            | ErrorKind::InvalidTransition
            | ErrorKind::ConfirmationRequired
            | ErrorKind::IneligibleMembers
            | ErrorKind::NoEligibleWinners
            | ErrorKind::NoFailedItems => 400,
            ErrorKind::InvalidCycle | ErrorKind::WinnerNotFound | ErrorKind::BatchNotFound => 404,
            ErrorKind::ConcurrencyConflict
            | ErrorKind::SelectionSealed
            | ErrorKind::SelectionNotSealed
            | ErrorKind::PayoutsAlreadyProcessed
            | ErrorKind::BatchInProgress => 409,
            ErrorKind::ValidationError => 422,
            ErrorKind::RateLimited => 429,
            ErrorKind::ProviderUnavailable => 503,
            ErrorKind::StatusUnavailable => 502,
            ErrorKind::Storage | ErrorKind::Config => 500,
        }
    }

    /// Retrying the same call later may succeed without any other change
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::ProviderUnavailable(_)
            | Self::StatusUnavailable(_) => true,
            Self::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::ValidationError(report) => Some(Remediation {
                invalid_emails: report.invalid_emails.clone(),
                disposable_emails: report.disposable_emails.clone(),
                ..Default::default()
            }),
            Self::RateLimited { retry_after } => Some(Remediation {
                retry_after: Some(retry_after.as_secs().max(1)),
                ..Default::default()
            }),
            Self::IneligibleMembers { user_ids } => Some(Remediation {
                ineligible_user_ids: user_ids.clone(),
                ..Default::default()
            }),
            Self::ConfirmationRequired { missing } => Some(Remediation {
                missing_confirmations: missing.clone(),
                ..Default::default()
            }),
            _ => None,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind(),
            code: self.code(),
            message: self.to_string(),
            remediation: self.remediation(),
        }
    }
}

/// Storage conflicts surface as concurrency conflicts; everything else stays a
/// storage failure
impl From<StorageError> for PayoutError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(msg) => PayoutError::ConcurrencyConflict(msg),
            other => PayoutError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code() {
        let err = PayoutError::NoEligibleWinners(CycleId::from("2026-q3"));
        assert_eq!(
            err.to_string(),
            "[E4001] No eligible winners for cycle 2026-q3"
        );
    }

    #[test]
    fn test_display_of_derived_arguments() {
        let err = PayoutError::ConfirmationRequired {
            missing: vec!["confirmed_final".into(), "understood_irreversible".into()],
        };
        assert_eq!(
            err.to_string(),
            "[E3002] Seal confirmation incomplete, missing: confirmed_final, understood_irreversible"
        );

        let err = PayoutError::ValidationError(DestinationReport {
            invalid_emails: vec!["broken".into()],
            disposable_emails: vec!["a@yopmail.com".into(), "b@yopmail.com".into()],
        });
        assert_eq!(
            err.to_string(),
            "[E4003] Destination validation failed: 1 invalid, 2 disposable"
        );

        let err = PayoutError::RateLimited {
            retry_after: Duration::from_secs(42),
        };
        assert_eq!(err.to_string(), "[E4004] Rate limited, retry after 42s");

        let err = PayoutError::InvalidAmount {
            field: "payout_override".into(),
            value: -5,
        };
        assert_eq!(
            err.to_string(),
            "[E2002] Invalid amount for payout_override: -5"
        );
        assert_eq!(
            PayoutError::InvalidMode("lottery".into()).to_string(),
            "[E1002] Invalid selection mode: lottery"
        );
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            PayoutError::ConcurrencyConflict("batch".into()).http_status(),
            409
        );
        assert_eq!(
            PayoutError::ValidationError(DestinationReport::default()).http_status(),
            422
        );
        assert_eq!(
            PayoutError::RateLimited {
                retry_after: Duration::from_secs(4)
            }
            .http_status(),
            429
        );
        assert_eq!(
            PayoutError::ProviderUnavailable("down".into()).http_status(),
            503
        );
        assert_eq!(PayoutError::InvalidMode("x".into()).http_status(), 400);
    }

    #[test]
    fn test_validation_error_carries_diagnostics() {
        let report = DestinationReport {
            invalid_emails: vec!["not-an-email".into()],
            disposable_emails: vec!["a@mailinator.com".into()],
        };
        let body = PayoutError::ValidationError(report).to_body();
        assert_eq!(body.kind, ErrorKind::ValidationError);
        let remediation = body.remediation.unwrap();
        assert_eq!(remediation.invalid_emails, vec!["not-an-email"]);
        assert_eq!(remediation.disposable_emails, vec!["a@mailinator.com"]);
    }

    #[test]
    fn test_rate_limited_reports_retry_after() {
        let body = PayoutError::RateLimited {
            retry_after: Duration::from_millis(1500),
        }
        .to_body();
        assert_eq!(body.remediation.unwrap().retry_after, Some(1));
    }

    #[test]
    fn test_storage_conflict_becomes_concurrency_conflict() {
        let err: PayoutError = StorageError::conflict("active batch exists").into();
        assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);

        let err: PayoutError = StorageError::unavailable("disk").into();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.is_transient());
    }
}
