//! Engine configuration
//!
//! Sources are applied from lowest to highest priority:
//!
//! 1. **Defaults** - hardcoded values below
//! 2. **Config file** - `~/.cyclepay/config.yml`, or the path passed with
//!    `--config` (`.toml` files are read as TOML, anything else as YAML)
//! 3. **Environment variables** - `CYCLEPAY_*`
//!
//! Validation runs last and reports every problem at once.

pub mod loader;
pub mod retry;

pub use loader::{default_config_path, ConfigEnv, ConfigError, MapEnv, RealEnv};
pub use retry::RetryPolicy;

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::storage::{BackendType, StorageConfig};

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tracing filter used when no `-v` flag is given
    pub log_level: String,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub selection: SelectionConfig,
    pub disbursement: DisbursementConfig,
    pub poller: PollerConfig,
    pub provider: ProviderConfig,
    pub validation: ValidationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            selection: SelectionConfig::default(),
            disbursement: DisbursementConfig::default(),
            poller: PollerConfig::default(),
            provider: ProviderConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Seed for random selection modes when a request does not carry one
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisbursementConfig {
    /// Payouts per provider call
    pub chunk_size: usize,
    /// Chunks of one batch submitted at the same time
    pub max_parallel_chunks: usize,
    /// Allow batches from saved or unsealed selections
    pub allow_unsealed_disbursement: bool,
    /// Minimum time between two batches of the same cycle
    #[serde(with = "humantime_serde")]
    pub min_batch_interval: Duration,
    /// Bound on a single provider call
    #[serde(with = "humantime_serde")]
    pub provider_timeout: Duration,
    /// ISO 4217 code sent with every payout
    pub currency: String,
    /// How often `serve` restarts batches left processing without a worker.
    /// Zero disables the sweep.
    #[serde(with = "humantime_serde")]
    pub resume_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for DisbursementConfig {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            max_parallel_chunks: 4,
            allow_unsealed_disbursement: false,
            min_batch_interval: Duration::from_secs(30),
            provider_timeout: Duration::from_secs(30),
            currency: "USD".to_string(),
            resume_interval: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Wait after a successful poll
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Wait after a failed poll
    #[serde(with = "humantime_serde")]
    pub error_interval: Duration,
    /// Give up after this many failed polls in a row; unbounded when unset
    pub max_consecutive_errors: Option<u32>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            error_interval: Duration::from_secs(3),
            max_consecutive_errors: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the HTTP disbursement provider
    pub base_url: Option<String>,
    pub api_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Domains rejected in addition to the built-in disposable list
    pub extra_disposable_domains: Vec<String>,
}

impl EngineConfig {
    /// Configuration for tests: memory storage, no rate limit, no delays
    pub fn for_tests() -> Self {
        let mut config = Self::default();
        config.storage = StorageConfig::memory();
        config.disbursement.min_batch_interval = Duration::ZERO;
        config.disbursement.retry = RetryPolicy::immediate(3);
        config.disbursement.resume_interval = Duration::ZERO;
        config.poller.interval = Duration::from_millis(10);
        config.poller.error_interval = Duration::from_millis(10);
        config
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|_| ConfigError::Invalid(vec![format!("server.bind '{}' is not a socket address", self.server.bind)]))
    }

    /// Check every field and report all problems together
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.log_level.trim().is_empty() {
            errors.push("log_level must not be empty".to_string());
        }
        if self.server.bind.parse::<SocketAddr>().is_err() {
            errors.push(format!("server.bind '{}' is not a socket address", self.server.bind));
        }
        if self.storage.backend == BackendType::File {
            if let Some(dir) = &self.storage.base_dir {
                if dir.as_os_str().is_empty() {
                    errors.push("storage.base_dir must not be empty".to_string());
                }
            }
        }

        let d = &self.disbursement;
        if d.chunk_size == 0 {
            errors.push("disbursement.chunk_size must be at least 1".to_string());
        }
        if d.max_parallel_chunks == 0 {
            errors.push("disbursement.max_parallel_chunks must be at least 1".to_string());
        }
        if d.provider_timeout.is_zero() {
            errors.push("disbursement.provider_timeout must be positive".to_string());
        }
        if d.currency.len() != 3 || !d.currency.chars().all(|c| c.is_ascii_uppercase()) {
            errors.push(format!(
                "disbursement.currency '{}' is not an ISO 4217 code",
                d.currency
            ));
        }
        d.retry.validate(&mut errors);

        if self.poller.interval.is_zero() || self.poller.error_interval.is_zero() {
            errors.push("poller intervals must be positive".to_string());
        }
        if self.poller.max_consecutive_errors == Some(0) {
            errors.push("poller.max_consecutive_errors must be at least 1 when set".to_string());
        }

        if let Some(url) = &self.provider.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(format!("provider.base_url '{}' must be an http(s) URL", url));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.poller.interval, Duration::from_secs(2));
        assert_eq!(config.poller.error_interval, Duration::from_secs(3));
        assert_eq!(config.poller.max_consecutive_errors, None);
        assert!(!config.disbursement.allow_unsealed_disbursement);
    }

    #[test]
    fn test_validation_accumulates_errors() {
        let mut config = EngineConfig::default();
        config.disbursement.chunk_size = 0;
        config.disbursement.currency = "usd".into();
        config.server.bind = "nowhere".into();

        match config.validate().unwrap_err() {
            ConfigError::Invalid(errors) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: EngineConfig = serde_yaml::from_str(
            "disbursement:\n  chunk_size: 25\n  min_batch_interval: 1m\npoller:\n  max_consecutive_errors: 10\n",
        )
        .unwrap();
        assert_eq!(config.disbursement.chunk_size, 25);
        assert_eq!(config.disbursement.min_batch_interval, Duration::from_secs(60));
        assert_eq!(config.disbursement.max_parallel_chunks, 4);
        assert_eq!(config.poller.max_consecutive_errors, Some(10));
        assert_eq!(config.log_level, "info");
    }
}
