//! Runtime configuration for the `gateway` binary: bind address, store
//! endpoint, and catalog source, assembled from environment variables and
//! overridden by CLI flags (see `src/bin/gateway.rs`).

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::quota::QuotaCatalog;

/// Default bind address, matching the reference deployment's first port.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8003";

/// Default Redis URL.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Assembled gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Socket address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Redis connection URL, used when the `redis` store backend is selected.
    pub redis_url: String,
    /// Optional path to a TOML quota catalog file; falls back to
    /// [`QuotaCatalog::built_in`] when absent.
    pub catalog_path: Option<String>,
    /// Admit requests for API keys absent from the catalog.
    pub fail_open_on_unknown_key: bool,
    /// Admit requests when the store backend returns an error.
    pub fail_open_on_store_error: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.parse().expect("valid default bind addr"),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            catalog_path: None,
            fail_open_on_unknown_key: true,
            fail_open_on_store_error: true,
        }
    }
}

impl GatewayConfig {
    /// Load the `QuotaCatalog` this configuration points at.
    pub fn load_catalog(&self) -> Result<QuotaCatalog> {
        match &self.catalog_path {
            Some(path) => QuotaCatalog::from_toml_file(path),
            None => Ok(QuotaCatalog::built_in()),
        }
    }

    /// Validate the assembled configuration.
    pub fn validate(&self) -> Result<()> {
        if self.redis_url.is_empty() {
            return Err(ConfigError::MissingRequired("redis_url".into()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:8003");
    }

    #[test]
    fn test_default_config_loads_built_in_catalog() {
        let config = GatewayConfig::default();
        let catalog = config.load_catalog().unwrap();
        assert!(catalog.lookup("free-tier-key").is_some());
    }
}
