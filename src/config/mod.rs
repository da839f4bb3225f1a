//! Configuration for the data source, its cache and the HTTP transport.
//!
//! Loaded from `~/.soap-datasource/config.json`; every section is optional
//! and falls back to its defaults. A handful of environment variables
//! override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Time-to-live of cached responses in seconds.
    pub ttl_secs: u64,
    /// Capacity of the in-process store.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 500,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// SOAP endpoint settings used by the CLI and [`HttpSoapMethod`](crate::client::HttpSoapMethod).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Endpoint URL. Must be given here, via env, or on the command line.
    pub endpoint: Option<String>,
    /// Target namespace of the service.
    pub namespace: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            namespace: "http://tempuri.org/".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub transport: TransportConfig,
}

impl Config {
    /// Configuration directory (`~/.soap-datasource`).
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".soap-datasource")
    }

    /// Default config file path.
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load the default config file with env overrides applied.
    ///
    /// A missing file yields defaults; a malformed file is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path();
        let mut config = if path.exists() {
            Self::load_from_path(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a config file without env overrides.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Apply `SOAP_DATASOURCE_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup("SOAP_DATASOURCE_CACHE_TTL_SECS") {
            match raw.parse() {
                Ok(ttl) => self.cache.ttl_secs = ttl,
                Err(_) => warn!(value = %raw, "Ignoring invalid SOAP_DATASOURCE_CACHE_TTL_SECS"),
            }
        }
        if let Some(endpoint) = lookup("SOAP_DATASOURCE_ENDPOINT") {
            self.transport.endpoint = Some(endpoint);
        }
        if let Some(raw) = lookup("SOAP_DATASOURCE_TIMEOUT_SECS") {
            match raw.parse() {
                Ok(secs) => self.transport.timeout_secs = secs,
                Err(_) => warn!(value = %raw, "Ignoring invalid SOAP_DATASOURCE_TIMEOUT_SECS"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_config_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.cache.ttl_secs, 300);
        assert_eq!(cfg.cache.ttl(), Duration::from_secs(300));
        assert_eq!(cfg.cache.max_entries, 500);
        assert_eq!(cfg.transport.endpoint, None);
        assert_eq!(cfg.transport.namespace, "http://tempuri.org/");
        assert_eq!(cfg.transport.timeout_secs, 30);
    }

    #[test]
    fn test_config_deserialize_partial() {
        let cfg: Config = serde_json::from_str(r#"{"cache": {"ttl_secs": 60}}"#).unwrap();
        assert_eq!(cfg.cache.ttl_secs, 60);
        assert_eq!(cfg.cache.max_entries, 500); // default
        assert_eq!(cfg.transport, TransportConfig::default());
    }

    #[test]
    fn test_load_from_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"transport": {"endpoint": "http://localhost:8000/wsdl", "timeout_secs": 5}}"#,
        )
        .unwrap();
        let cfg = Config::load_from_path(&path).unwrap();
        assert_eq!(
            cfg.transport.endpoint.as_deref(),
            Some("http://localhost:8000/wsdl")
        );
        assert_eq!(cfg.transport.timeout_secs, 5);
    }

    #[test]
    fn test_load_from_path_malformed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(
            Config::load_from_path(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_missing_path() {
        let tmp = TempDir::new().unwrap();
        let err = Config::load_from_path(&tmp.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SOAP_DATASOURCE_CACHE_TTL_SECS", "42"),
            ("SOAP_DATASOURCE_ENDPOINT", "http://svc/soap"),
            ("SOAP_DATASOURCE_TIMEOUT_SECS", "not-a-number"),
        ]);
        let mut cfg = Config::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.cache.ttl_secs, 42);
        assert_eq!(cfg.transport.endpoint.as_deref(), Some("http://svc/soap"));
        assert_eq!(cfg.transport.timeout_secs, 30, "invalid value is ignored");
    }

    #[test]
    fn test_config_path_under_dir() {
        assert!(Config::path().starts_with(Config::dir()));
        assert!(Config::path().ends_with("config.json"));
    }
}
