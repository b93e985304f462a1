//! Core business logic module with pure functions
//!
//! Payout arithmetic, winner selection, the seal state machine, chunk
//! planning and progress projection. Nothing here touches storage, the
//! network or the clock, so every rule can be tested without mocks.

pub mod chunking;
pub mod eligibility;
pub mod payout;
pub mod progress;
pub mod seal;
pub mod selection;
