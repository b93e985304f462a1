//! Mock collaborators for testing
//!
//! Stand-ins for the accrual service and the payment processor.

pub mod members;
pub mod provider;
pub mod storage;

pub use members::StaticMemberSource;
pub use provider::{ScriptedProvider, ScriptedProviderBuilder};
pub use storage::FlakyStorage;
