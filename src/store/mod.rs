//! Shared store backend trait and implementations.
//!
//! This module defines the [`AdmissionStore`] trait that every backend must
//! implement, along with the in-process [`MemoryStore`] and the
//! Redis-backed [`RedisStore`].
//!
//! All mutation goes through one call per admission decision: `admit`. There
//! is no separate get/set/increment surface, unlike a general-purpose
//! key-value abstraction -- the admission algorithm (calibration vs. the
//! fast counter path) is baked into each backend's implementation of this
//! one method so that it executes as a single atomic unit against the
//! shared state for one API key.

#[cfg(feature = "memory")]
mod memory_store;
#[cfg(feature = "redis")]
mod redis_store;

#[cfg(feature = "memory")]
pub use memory_store::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::{RedisConfig, RedisStore};

use std::future::Future;

pub use crate::algorithm::admission::{
    CALIBRATION_INTERVAL_US, COUNTER_TTL, SORTED_SET_TTL, WINDOW_US,
};
use crate::decision::Decision;
use crate::error::Result;

/// Key prefix every persisted key lives under.
pub const KEY_PREFIX: &str = "rl:";

/// The three sorted-set key names derived from one API key.
#[derive(Debug, Clone)]
pub struct KeySet {
    /// `rl:<api_key>:req`
    pub req: String,
    /// `rl:<api_key>:input`
    pub input: String,
    /// `rl:<api_key>:output`
    pub output: String,
}

impl KeySet {
    /// Derive the three key names for an API key.
    pub fn for_api_key(api_key: &str) -> Self {
        Self {
            req: format!("{KEY_PREFIX}{api_key}:req"),
            input: format!("{KEY_PREFIX}{api_key}:input"),
            output: format!("{KEY_PREFIX}{api_key}:output"),
        }
    }
}

/// The eight arguments passed to one admission call.
#[derive(Debug, Clone)]
pub struct AdmissionArgs {
    /// Current time in microseconds since the epoch.
    pub now_us: i64,
    /// `now_us - WINDOW_US`.
    pub window_start_us: i64,
    /// Requests-per-minute limit.
    pub rpm: u64,
    /// Input-tokens-per-minute limit.
    pub input_tpm: u64,
    /// Output-tokens-per-minute limit.
    pub output_tpm: u64,
    /// Input tokens this request would contribute.
    pub input_tokens: u64,
    /// Output tokens this request would contribute.
    pub output_tokens: u64,
    /// Unique id for this admission call (`"<now_us><3-digit random>"`).
    pub request_id: String,
}

/// Store backend trait for the admission engine's state.
///
/// Implementations must execute `admit` atomically with respect to other
/// `admit` calls for the *same* `KeySet` -- between different keys no
/// ordering is promised or required.
pub trait AdmissionStore: Send + Sync + 'static {
    /// Run one admission decision, mutating state as the hybrid
    /// counter/calibration algorithm dictates.
    fn admit(
        &self,
        keys: &KeySet,
        args: AdmissionArgs,
    ) -> impl Future<Output = Result<Decision>> + Send;
}

impl<T: AdmissionStore + ?Sized> AdmissionStore for std::sync::Arc<T> {
    async fn admit(&self, keys: &KeySet, args: AdmissionArgs) -> Result<Decision> {
        (**self).admit(keys, args).await
    }
}

/// Current time in microseconds since the Unix epoch.
pub fn current_timestamp_us() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_micros() as i64
}

/// Parse the trailing `:<integer>` suffix of a sorted-set member.
///
/// Used by calibration to recompute exact token sums from the `in(K)` /
/// `out(K)` sorted sets. Contributes 1 when the suffix is missing or not an
/// integer, matching the reference script's `tonumber(...) or 1` fallback.
pub fn parse_trailing_tokens(member: &str) -> u64 {
    member
        .rsplit(':')
        .next()
        .and_then(|suffix| suffix.parse::<u64>().ok())
        .unwrap_or(1)
}
