//! Layered loading of [`EngineConfig`]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use super::EngineConfig;
use crate::error::PayoutError;
use crate::storage::BackendType;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),
}

impl From<ConfigError> for PayoutError {
    fn from(err: ConfigError) -> Self {
        PayoutError::Config(err.to_string())
    }
}

/// Source of environment variables
pub trait ConfigEnv {
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment
pub struct RealEnv;

impl ConfigEnv for RealEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed variables, for tests
#[derive(Debug, Clone, Default)]
pub struct MapEnv(HashMap<String, String>);

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }
}

impl ConfigEnv for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

/// `~/.cyclepay/config.yml`
pub fn default_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".cyclepay").join("config.yml"))
}

impl EngineConfig {
    /// Load from defaults, the config file and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, &RealEnv)
    }

    /// Load with a custom environment. An explicit `path` must exist; the
    /// default path is optional.
    pub fn load_with<E: ConfigEnv>(path: Option<&Path>, env: &E) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };
        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loading configuration from {}", path.display());
        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);
        let parsed = if is_toml {
            toml::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        };
        parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Apply `CYCLEPAY_*` overrides. Unparseable values are collected and
    /// reported together.
    pub fn apply_env<E: ConfigEnv>(&mut self, env: &E) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if let Some(level) = env.var("CYCLEPAY_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(bind) = env.var("CYCLEPAY_BIND") {
            self.server.bind = bind;
        }
        if let Some(backend) = env.var("CYCLEPAY_STORAGE_TYPE") {
            match BackendType::from_str(&backend) {
                Ok(backend) => self.storage.backend = backend,
                Err(e) => errors.push(format!("CYCLEPAY_STORAGE_TYPE: {}", e)),
            }
        }
        if let Some(dir) = env.var("CYCLEPAY_STORAGE_DIR") {
            self.storage.base_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = env.var("CYCLEPAY_PROVIDER_URL") {
            self.provider.base_url = Some(url);
        }
        if let Some(token) = env.var("CYCLEPAY_PROVIDER_TOKEN") {
            self.provider.api_token = Some(token);
        }
        if let Some(value) = parse_var(env, "CYCLEPAY_CHUNK_SIZE", &mut errors) {
            self.disbursement.chunk_size = value;
        }
        if let Some(value) = parse_var(env, "CYCLEPAY_ALLOW_UNSEALED_DISBURSEMENT", &mut errors) {
            self.disbursement.allow_unsealed_disbursement = value;
        }
        if let Some(value) = parse_var(env, "CYCLEPAY_SELECTION_SEED", &mut errors) {
            self.selection.seed = Some(value);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}

fn parse_var<E: ConfigEnv, T: FromStr>(env: &E, key: &str, errors: &mut Vec<String>) -> Option<T> {
    let raw = env.var(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            errors.push(format!("{}: cannot parse '{}'", key, raw));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_env_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(
            &path,
            "log_level: warn\ndisbursement:\n  chunk_size: 20\n  currency: EUR\n",
        )
        .unwrap();
        let env = MapEnv::new()
            .with_env("CYCLEPAY_CHUNK_SIZE", "5")
            .with_env("CYCLEPAY_STORAGE_TYPE", "memory")
            .with_env("CYCLEPAY_SELECTION_SEED", "1234");

        let config = EngineConfig::load_with(Some(&path), &env).unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.disbursement.currency, "EUR");
        assert_eq!(config.disbursement.chunk_size, 5);
        assert_eq!(config.storage.backend, BackendType::Memory);
        assert_eq!(config.selection.seed, Some(1234));
    }

    #[test]
    fn test_toml_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cyclepay.toml");
        std::fs::write(
            &path,
            "[disbursement]\nmax_parallel_chunks = 8\nmin_batch_interval = \"5s\"\n\n[poller]\ninterval = \"500ms\"\n",
        )
        .unwrap();

        let config = EngineConfig::load_with(Some(&path), &MapEnv::new()).unwrap();
        assert_eq!(config.disbursement.max_parallel_chunks, 8);
        assert_eq!(config.disbursement.min_batch_interval, Duration::from_secs(5));
        assert_eq!(config.poller.interval, Duration::from_millis(500));
    }

    #[test]
    fn test_bad_env_values_are_all_reported() {
        let env = MapEnv::new()
            .with_env("CYCLEPAY_CHUNK_SIZE", "lots")
            .with_env("CYCLEPAY_ALLOW_UNSEALED_DISBURSEMENT", "maybe");
        let mut config = EngineConfig::default();

        match config.apply_env(&env).unwrap_err() {
            ConfigError::Invalid(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].contains("CYCLEPAY_CHUNK_SIZE"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = EngineConfig::load_with(Some(&dir.path().join("absent.yml")), &MapEnv::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
