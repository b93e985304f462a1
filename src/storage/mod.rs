//! Storage abstraction layer
//!
//! Cycles, selections and batches live behind one [`UnifiedStorage`]
//! handle. Every operation that must hold across records (activating a
//! cycle, a versioned selection write, inserting a batch only when none is
//! in flight) is a single atomic call on the backend.

pub mod backends;
pub mod config;
pub mod error;
pub mod factory;
pub mod state;
pub mod traits;
pub mod types;

pub use backends::{FileBackend, MemoryBackend};
pub use config::{BackendType, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use factory::StorageFactory;
pub use state::StoreState;
pub use traits::{BatchStorage, CycleStorage, SelectionStorage, UnifiedStorage};
pub use types::{BatchFilter, HealthStatus, PaidWinner, WriteGuard};
