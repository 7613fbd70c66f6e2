//! Cache layer configuration.
//!
//! Keys follow the plugin configuration (`redisAddress`, `redisAuth`,
//! `cacheExpiry`, `poolSize`). Missing or zero values take the defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use xc_client::{ClientConfig, DEFAULT_POOL_SIZE};

/// Seconds a cached response lives when no expiry is configured.
pub const DEFAULT_CACHE_EXPIRY: u64 = 15;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Store address, e.g. "redis:6379".
    pub redis_address: String,
    /// Store password; empty disables AUTH.
    pub redis_auth: String,
    /// Entry lifetime in seconds.
    pub cache_expiry: u64,
    /// Idle store connections kept by the client.
    pub pool_size: usize,
}

impl CacheConfig {
    /// Parses JSON and applies defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: CacheConfig = serde_json::from_str(text)?;
        config.validated()
    }

    /// Reads and parses a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Fills zero values with defaults and rejects an empty address.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if self.redis_address.trim().is_empty() {
            return Err(ConfigError::Invalid("redisAddress is required".to_string()));
        }
        if self.cache_expiry == 0 {
            self.cache_expiry = DEFAULT_CACHE_EXPIRY;
        }
        if self.pool_size == 0 {
            self.pool_size = DEFAULT_POOL_SIZE;
        }
        Ok(self)
    }

    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.cache_expiry)
    }

    /// Store client settings derived from this configuration.
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.redis_address.clone()).with_pool_size(self.pool_size);
        if !self.redis_auth.is_empty() {
            config = config.with_password(self.redis_auth.clone());
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_defaults() {
        let config = CacheConfig::from_json(r#"{"redisAddress":"redis:6379"}"#).unwrap();
        assert_eq!(config.cache_expiry, DEFAULT_CACHE_EXPIRY);
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
        assert!(config.client_config().password.is_none());
    }

    #[test]
    fn zero_expiry_means_default() {
        let config =
            CacheConfig::from_json(r#"{"redisAddress":"redis:6379","cacheExpiry":0}"#).unwrap();
        assert_eq!(config.expiry(), Duration::from_secs(15));
    }

    #[test]
    fn reads_all_fields() {
        let config = CacheConfig::from_json(
            r#"{"redisAddress":"10.0.0.2:6380","redisAuth":"pw","cacheExpiry":60,"poolSize":3}"#,
        )
        .unwrap();
        assert_eq!(config.expiry(), Duration::from_secs(60));

        let client = config.client_config();
        assert_eq!(client.addr, "10.0.0.2:6380");
        assert_eq!(client.password.as_deref(), Some("pw"));
        assert_eq!(client.pool_size, 3);
    }

    #[test]
    fn missing_address_is_rejected() {
        let err = CacheConfig::from_json("{}").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(CacheConfig::from_json("{"), Err(ConfigError::Parse(_))));
    }
}
