//! Storage configuration types and utilities

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// File-based storage (default)
    #[default]
    File,
    /// Memory storage (for testing)
    Memory,
}

impl std::str::FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(BackendType::File),
            "memory" => Ok(BackendType::Memory),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

/// Main storage configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend type
    #[serde(default)]
    pub backend: BackendType,

    /// Directory for the file backend (default: ~/.cyclepay/data)
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// In-memory storage, used by tests
    pub fn memory() -> Self {
        Self {
            backend: BackendType::Memory,
            base_dir: None,
        }
    }

    /// File storage rooted at `base_dir`
    pub fn file(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendType::File,
            base_dir: Some(base_dir.into()),
        }
    }

    /// Directory the file backend writes to
    pub fn resolved_base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(|| {
            directories::BaseDirs::new()
                .map(|dirs| dirs.home_dir().join(".cyclepay").join("data"))
                .unwrap_or_else(|| PathBuf::from(".cyclepay").join("data"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_type_default() {
        assert_eq!(BackendType::default(), BackendType::File);
    }

    #[test]
    fn test_backend_type_serialization() {
        let json = serde_json::to_string(&BackendType::Memory).unwrap();
        assert_eq!(json, r#""memory""#);
        assert_eq!("FILE".parse::<BackendType>().unwrap(), BackendType::File);
        assert!("redis".parse::<BackendType>().is_err());
    }

    #[test]
    fn test_explicit_base_dir_wins() {
        let config = StorageConfig::file("/var/lib/cyclepay");
        assert_eq!(config.resolved_base_dir(), PathBuf::from("/var/lib/cyclepay"));
    }
}
