//! # cyclepay
//!
//! Winner selection, the seal workflow and chunked, resumable payout
//! disbursement for cycle-based reward programs.
//!
//! ## Modules
//!
//! - `core` - Pure rules: selection, payout math, seal transitions, chunking, progress
//! - `selection` - Selection lifecycle over storage with optimistic versioning
//! - `cycles` - Cycle configuration, rosters and reward pools
//! - `disbursement` - Batch creation, chunk workers, status polling and retries
//! - `providers` - Member source, destination validation and the payment provider
//! - `storage` - Storage abstraction with memory and file backends
//! - `config` - Layered engine configuration
//! - `api` - JSON HTTP surface
//! - `app` - Engine wiring and process setup
//! - `cli` - The `cyclepay` command line
//! - `testing` - Mocks and fixtures for tests
pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod cycles;
pub mod disbursement;
pub mod error;
pub mod model;
pub mod providers;
pub mod selection;
pub mod storage;

pub mod testing;

pub use app::PayoutEngine;
pub use error::{PayoutError, PayoutResult};
