//! Multi-tenant rate-limiting front door for an OpenAI-compatible
//! chat-completion API.
//!
//! `chatgate_ratelimit` enforces per-API-key requests-per-minute,
//! input-tokens-per-minute, and output-tokens-per-minute quotas over a
//! sliding 60-second window, using a hybrid algorithm: every admission call
//! does O(1) work against fast-path counters, and every 30 seconds those
//! counters are recalibrated from an exact sorted-set record so that drift
//! from TTL expiry and concurrent writers never compounds indefinitely.
//!
//! # Quick Start
//!
//! ```
//! use chatgate_ratelimit::algorithm::AdmissionEngine;
//! use chatgate_ratelimit::quota::QuotaCatalog;
//! use chatgate_ratelimit::store::MemoryStore;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let engine = AdmissionEngine::new(QuotaCatalog::built_in(), MemoryStore::new());
//! let quota = engine.lookup("free-tier-key").unwrap().clone();
//! let decision = engine.admit("free-tier-key", &quota, 120, 50).await.unwrap();
//! assert!(decision.is_allowed());
//! # }
//! ```
//!
//! # Feature Flags
//!
//! - `memory` (default): in-process store with background garbage collection.
//! - `redis` (default): Redis-backed store using a registered Lua script.
//! - `axum` (default): the [`gateway`] router and [`middleware`] tower layer.
//! - `full`: all of the above.

pub mod algorithm;
pub mod config;
pub mod decision;
pub mod error;
pub mod quota;
pub mod store;

#[cfg(feature = "axum")]
pub mod gateway;

#[cfg(feature = "axum")]
pub mod middleware;

pub use algorithm::AdmissionEngine;
pub use config::GatewayConfig;
pub use decision::{Decision, Reason};
pub use error::{ConfigError, ConnectionError, RateLimitError, Result, StoreError};
pub use quota::{Quota, QuotaCatalog};
pub use store::{AdmissionArgs, AdmissionStore, KeySet};

#[cfg(feature = "memory")]
pub use store::MemoryStore;

#[cfg(feature = "redis")]
pub use store::{RedisConfig, RedisStore};

#[cfg(feature = "axum")]
pub use error::GatewayError;

#[cfg(feature = "axum")]
pub use middleware::{AdmissionLayer, AdmissionPolicy};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::algorithm::AdmissionEngine;
    pub use crate::decision::{Decision, Reason};
    pub use crate::error::{RateLimitError, Result};
    pub use crate::quota::{Quota, QuotaCatalog};
    pub use crate::store::AdmissionStore;

    #[cfg(feature = "memory")]
    pub use crate::store::MemoryStore;

    #[cfg(feature = "redis")]
    pub use crate::store::{RedisConfig, RedisStore};

    #[cfg(feature = "axum")]
    pub use crate::middleware::{AdmissionLayer, AdmissionPolicy};
}
