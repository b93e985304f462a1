//! Command-line interface
//!
//! - `serve`: run the HTTP API and resume batches interrupted by a restart
//! - `watch`: follow a batch of a running server from the terminal

pub mod args;
pub mod progress;
pub mod router;

pub use args::{Cli, Commands};
pub use progress::ProgressObserver;
pub use router::execute_command;
