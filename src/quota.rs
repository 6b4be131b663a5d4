//! Quota catalog: the `api_key -> {name, rpm, input_tpm, output_tpm}` table.
//!
//! # Examples
//!
//! ```
//! use chatgate_ratelimit::Quota;
//!
//! let quota = Quota::new("Free Tier", 20, 4_000, 1_000);
//! assert_eq!(quota.rpm(), 20);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// A single tenant's rate limit row: `{name, rpm, input_tpm, output_tpm}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    /// Human-readable tier name (for logging).
    pub name: String,
    /// Maximum requests per minute.
    pub rpm: u64,
    /// Maximum input tokens per minute.
    pub input_tpm: u64,
    /// Maximum output tokens per minute.
    pub output_tpm: u64,
}

impl Quota {
    /// Create a new quota row.
    pub fn new(name: impl Into<String>, rpm: u64, input_tpm: u64, output_tpm: u64) -> Self {
        Self {
            name: name.into(),
            rpm,
            input_tpm,
            output_tpm,
        }
    }

    /// Requests-per-minute limit.
    pub fn rpm(&self) -> u64 {
        self.rpm
    }

    /// Input-tokens-per-minute limit.
    pub fn input_tpm(&self) -> u64 {
        self.input_tpm
    }

    /// Output-tokens-per-minute limit.
    pub fn output_tpm(&self) -> u64 {
        self.output_tpm
    }
}

/// On-disk representation of the catalog, e.g.:
///
/// ```toml
/// [api_keys.free-tier-key]
/// name = "Free Tier"
/// rpm = 20
/// input_tpm = 4000
/// output_tpm = 1000
/// ```
#[derive(Debug, Deserialize)]
struct CatalogFile {
    api_keys: HashMap<String, Quota>,
}

/// Read-mostly mapping from API key to its [`Quota`] row.
///
/// Cheap to clone: internally an `Arc<HashMap<..>>` so every Axum handler
/// invocation shares one allocation.
#[derive(Debug, Clone)]
pub struct QuotaCatalog {
    rows: Arc<HashMap<String, Quota>>,
}

impl QuotaCatalog {
    /// Build a catalog from an explicit map.
    pub fn new(rows: HashMap<String, Quota>) -> Self {
        Self {
            rows: Arc::new(rows),
        }
    }

    /// Load a catalog from a TOML file on disk.
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::InvalidCatalog(format!("reading {}: {e}", path.display()))
        })?;
        let parsed: CatalogFile = toml::from_str(&text)
            .map_err(|e| ConfigError::InvalidCatalog(format!("parsing {}: {e}", path.display())))?;
        Ok(Self::new(parsed.api_keys))
    }

    /// The built-in catalog matching the reference deployment's test keys.
    ///
    /// Used when no catalog file is configured, so the gateway binary is
    /// runnable without external configuration.
    pub fn built_in() -> Self {
        let mut rows = HashMap::new();
        rows.insert(
            "test-key-1".to_string(),
            Quota::new("Default Tier", 500, 60_000, 20_000),
        );
        rows.insert(
            "test-key-2".to_string(),
            Quota::new("High-Throughput Tier", 1_000, 200_000, 80_000),
        );
        rows.insert(
            "unlimited-key".to_string(),
            Quota::new("Unlimited Test", 999_999, 99_999_999, 99_999_999),
        );
        rows.insert(
            "free-tier-key".to_string(),
            Quota::new("Free Tier", 20, 4_000, 1_000),
        );
        Self::new(rows)
    }

    /// Look up the quota row for an API key.
    ///
    /// Returns `None` on an unknown key (`NOT_FOUND` in the spec's terms);
    /// the gateway handler treats that as fail-open admission by default.
    pub fn lookup(&self, api_key: &str) -> Option<&Quota> {
        self.rows.get(api_key)
    }

    /// Number of configured API keys.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the catalog has no configured API keys.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Default for QuotaCatalog {
    fn default() -> Self {
        Self::built_in()
    }
}
