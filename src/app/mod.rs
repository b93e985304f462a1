//! Application module
//!
//! This module contains application-level functionality including:
//! - Engine wiring over storage and collaborators
//! - Logging setup
//! - Fatal error reporting for the binary

pub mod config;
pub mod engine;
pub mod error_handling;
pub mod logging;

pub use config::AppConfig;
pub use engine::{PayoutEngine, PayoutEngineBuilder};
pub use error_handling::{exit_code, handle_fatal_error};
pub use logging::init_logging;
