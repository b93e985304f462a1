/// Error code registry for cyclepay
///
/// Error codes are organized by category:
/// - 1000-1999: Request and selection errors
/// - 2000-2999: Payout amount errors
/// - 3000-3999: Seal state machine errors
/// - 4000-4999: Disbursement errors
/// - 5000-5999: Storage errors
/// - 9000-9999: Configuration and other errors
#[allow(dead_code)]
pub struct ErrorCode;

impl ErrorCode {
    // Request and selection errors (1000-1999)
    pub const INVALID_REQUEST: u16 = 1000;
    pub const INVALID_CYCLE: u16 = 1001;
    pub const INVALID_MODE: u16 = 1002;
    pub const INELIGIBLE_MEMBERS: u16 = 1003;
    pub const WINNER_NOT_FOUND: u16 = 1004;

    // Payout amount errors (2000-2999)
    pub const INVALID_PERCENTAGE: u16 = 2001;
    pub const INVALID_AMOUNT: u16 = 2002;

    // Seal state machine errors (3000-3999)
    pub const INVALID_TRANSITION: u16 = 3001;
    pub const CONFIRMATION_REQUIRED: u16 = 3002;
    pub const SELECTION_SEALED: u16 = 3003;
    pub const SELECTION_NOT_SEALED: u16 = 3004;
    pub const PAYOUTS_ALREADY_PROCESSED: u16 = 3005;

    // Disbursement errors (4000-4999)
    pub const NO_ELIGIBLE_WINNERS: u16 = 4001;
    pub const CONCURRENCY_CONFLICT: u16 = 4002;
    pub const VALIDATION_FAILED: u16 = 4003;
    pub const RATE_LIMITED: u16 = 4004;
    pub const PROVIDER_UNAVAILABLE: u16 = 4005;
    pub const BATCH_NOT_FOUND: u16 = 4006;
    pub const BATCH_IN_PROGRESS: u16 = 4007;
    pub const NO_FAILED_ITEMS: u16 = 4008;
    pub const STATUS_UNAVAILABLE: u16 = 4009;

    // Storage errors (5000-5999)
    pub const STORAGE_GENERIC: u16 = 5000;

    // Configuration errors (9000-9999)
    pub const CONFIG_INVALID: u16 = 9001;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        ErrorCode::INVALID_REQUEST => "The request is malformed or references an unknown value",
        ErrorCode::INVALID_CYCLE => "The cycle does not exist or is not the active cycle",
        ErrorCode::INVALID_MODE => "Unrecognized winner selection mode",
        ErrorCode::INELIGIBLE_MEMBERS => {
            "Manually chosen members are not eligible in this cycle"
        }
        ErrorCode::WINNER_NOT_FOUND => "No winner with that id in the cycle's selection",
        ErrorCode::INVALID_PERCENTAGE => "Percentages must be between 0 and 100",
        ErrorCode::INVALID_AMOUNT => "Amounts must be non-negative minor currency units",
        ErrorCode::INVALID_TRANSITION => "The selection cannot make that transition from its state",
        ErrorCode::CONFIRMATION_REQUIRED => "Sealing requires all three acknowledgements",
        ErrorCode::SELECTION_SEALED => "The selection is sealed; unseal it before editing",
        ErrorCode::SELECTION_NOT_SEALED => "Disbursement requires a sealed selection",
        ErrorCode::PAYOUTS_ALREADY_PROCESSED => "Payouts for this cycle have already been sent",
        ErrorCode::NO_ELIGIBLE_WINNERS => "No winner is currently eligible for payout",
        ErrorCode::CONCURRENCY_CONFLICT => "Another operation on this cycle is in progress",
        ErrorCode::VALIDATION_FAILED => "Some payout destinations are invalid or disposable",
        ErrorCode::RATE_LIMITED => "Too many disbursement requests; retry later",
        ErrorCode::PROVIDER_UNAVAILABLE => "The disbursement provider is unavailable",
        ErrorCode::BATCH_NOT_FOUND => "No batch with that id",
        ErrorCode::BATCH_IN_PROGRESS => "The batch has not reached a terminal state",
        ErrorCode::NO_FAILED_ITEMS => "The batch has no failed items to retry",
        ErrorCode::STATUS_UNAVAILABLE => "The remote status endpoint could not be read",
        ErrorCode::STORAGE_GENERIC => "Storage operation failed",
        ErrorCode::CONFIG_INVALID => "Configuration is invalid",
        _ => "Unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_registered_code_has_a_description() {
        for code in [
            ErrorCode::INVALID_REQUEST,
            ErrorCode::INVALID_CYCLE,
            ErrorCode::INVALID_MODE,
            ErrorCode::INVALID_PERCENTAGE,
            ErrorCode::SELECTION_SEALED,
            ErrorCode::CONCURRENCY_CONFLICT,
            ErrorCode::NO_FAILED_ITEMS,
            ErrorCode::CONFIG_INVALID,
        ] {
            assert_ne!(describe_error_code(code), "Unknown error");
        }
        assert_eq!(describe_error_code(1), "Unknown error");
    }
}
