//! Wiring of the services over one storage backend

use std::sync::Arc;
use tracing::info;

use crate::config::EngineConfig;
use crate::cycles::CycleService;
use crate::disbursement::{BatchPoller, BatchStatusSource, DisbursementOrchestrator};
use crate::error::{PayoutError, PayoutResult};
use crate::providers::{
    DestinationValidator, DisbursementProvider, EmailDestinationValidator,
    HttpDisbursementProvider, MemberSource, StoredMemberSource,
};
use crate::selection::SelectionService;
use crate::storage::{StorageFactory, UnifiedStorage};

/// Every service of the engine, sharing one storage backend
#[derive(Clone)]
pub struct PayoutEngine {
    config: EngineConfig,
    storage: Arc<dyn UnifiedStorage>,
    cycles: Arc<CycleService>,
    selection: Arc<SelectionService>,
    disbursement: Arc<DisbursementOrchestrator>,
}

pub struct PayoutEngineBuilder {
    config: EngineConfig,
    storage: Arc<dyn UnifiedStorage>,
    provider: Arc<dyn DisbursementProvider>,
    members: Option<Arc<dyn MemberSource>>,
    validator: Option<Arc<dyn DestinationValidator>>,
}

impl PayoutEngineBuilder {
    /// Select from this source instead of the roster in storage
    pub fn members(mut self, members: Arc<dyn MemberSource>) -> Self {
        self.members = Some(members);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn DestinationValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn build(self) -> PayoutEngine {
        let members = self
            .members
            .unwrap_or_else(|| Arc::new(StoredMemberSource::new(self.storage.clone())));
        let validator = self.validator.unwrap_or_else(|| {
            Arc::new(EmailDestinationValidator::with_disposable_domains(
                self.config.validation.extra_disposable_domains.clone(),
            ))
        });

        let cycles = CycleService::new(self.storage.clone());
        let selection = SelectionService::new(
            self.storage.clone(),
            members,
            self.config.selection.clone(),
        );
        let disbursement = DisbursementOrchestrator::new(
            self.storage.clone(),
            self.provider,
            validator,
            self.config.disbursement.clone(),
        );

        PayoutEngine {
            config: self.config,
            storage: self.storage,
            cycles: Arc::new(cycles),
            selection: Arc::new(selection),
            disbursement: Arc::new(disbursement),
        }
    }
}

impl PayoutEngine {
    pub fn builder(
        config: EngineConfig,
        storage: Arc<dyn UnifiedStorage>,
        provider: Arc<dyn DisbursementProvider>,
    ) -> PayoutEngineBuilder {
        PayoutEngineBuilder {
            config,
            storage,
            provider,
            members: None,
            validator: None,
        }
    }

    /// Build the engine the server runs: storage from `config.storage` and
    /// the HTTP provider at `config.provider.base_url`
    pub async fn from_config(config: EngineConfig) -> PayoutResult<Self> {
        let base_url = config.provider.base_url.clone().ok_or_else(|| {
            PayoutError::Config(
                "provider.base_url is not set (CYCLEPAY_PROVIDER_URL)".to_string(),
            )
        })?;
        let provider = HttpDisbursementProvider::new(
            &base_url,
            config.provider.api_token.clone(),
            config.disbursement.provider_timeout,
        )?;
        let storage = StorageFactory::from_config(&config.storage).await?;
        info!("Disbursing through {}", base_url);

        Ok(Self::builder(config, storage, Arc::new(provider)).build())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn UnifiedStorage> {
        &self.storage
    }

    pub fn cycles(&self) -> &CycleService {
        &self.cycles
    }

    pub fn selection(&self) -> &SelectionService {
        &self.selection
    }

    pub fn disbursement(&self) -> &Arc<DisbursementOrchestrator> {
        &self.disbursement
    }

    /// An in-process poller over this engine's batches
    pub fn poller(&self) -> BatchPoller {
        let source: Arc<dyn BatchStatusSource> = self.disbursement.clone();
        BatchPoller::new(source, self.config.poller.clone())
    }
}
