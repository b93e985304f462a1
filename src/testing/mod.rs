//! Testing utilities and fixtures
//!
//! Mock collaborators and data builders shared by unit tests, integration
//! tests and benchmarks.

pub mod fixtures;
pub mod mocks;

use std::sync::Arc;

use crate::app::PayoutEngine;
use crate::config::EngineConfig;
use crate::providers::EmailDestinationValidator;
use crate::storage::{StorageFactory, UnifiedStorage};
use mocks::{ScriptedProvider, StaticMemberSource};

/// An engine over memory storage, the scripted provider and the stored
/// roster, configured for tests
pub struct TestContext {
    pub engine: PayoutEngine,
    pub storage: Arc<dyn UnifiedStorage>,
    pub provider: ScriptedProvider,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_provider(ScriptedProvider::new())
    }

    pub fn with_provider(provider: ScriptedProvider) -> Self {
        Self::with_config(EngineConfig::for_tests(), provider)
    }

    pub fn with_config(config: EngineConfig, provider: ScriptedProvider) -> Self {
        let storage = StorageFactory::memory();
        let engine = PayoutEngine::builder(config, storage.clone(), Arc::new(provider.clone()))
            .validator(Arc::new(EmailDestinationValidator::new()))
            .build();
        Self {
            engine,
            storage,
            provider,
        }
    }

    /// Same as [`TestContext::new`] but selecting from a fixed member list
    /// instead of the stored roster
    pub fn with_members(members: StaticMemberSource, provider: ScriptedProvider) -> Self {
        let storage = StorageFactory::memory();
        let engine = PayoutEngine::builder(EngineConfig::for_tests(), storage.clone(), Arc::new(provider.clone()))
            .members(Arc::new(members))
            .build();
        Self {
            engine,
            storage,
            provider,
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
