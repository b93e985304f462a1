//! Error handling for the binary edge

use tracing::error;

use crate::error::{describe_error_code, ErrorKind, PayoutError};

/// Process exit code for an error surfaced by the binary
pub fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<PayoutError>().map(PayoutError::kind) {
        Some(ErrorKind::Config) => 2,
        Some(ErrorKind::ProviderUnavailable)
        | Some(ErrorKind::StatusUnavailable)
        | Some(ErrorKind::Storage) => 3,
        Some(_) => 1,
        None if error.chain().any(|cause| cause.is::<crate::config::ConfigError>()) => 2,
        None => 1,
    }
}

/// Report a fatal error and exit
///
/// - `verbose = 0`: the error message and, for engine errors, what the code means
/// - `verbose >= 1`: the full error chain
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {}", error);
    eprintln!("Error: {error}");

    if let Some(err) = error.downcast_ref::<PayoutError>() {
        eprintln!("{}", describe_error_code(err.code()));
    }

    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(exit_code(&error))
}
