//! The admission engine: ties the quota catalog to a store backend and
//! produces one [`Decision`] per `(api_key, input_tokens, output_tokens)`
//! call.
//!
//! The window width, calibration interval, and the two TTLs are
//! build-time constants here, not runtime configuration -- matching the
//! reference deployment, which never exposed them as tunables.

use std::time::Duration;

use rand::Rng;

use crate::decision::Decision;
use crate::error::Result;
use crate::quota::QuotaCatalog;
use crate::store::{current_timestamp_us, AdmissionArgs, AdmissionStore, KeySet};

/// Sliding window width in microseconds (60 s).
pub const WINDOW_US: i64 = 60_000_000;

/// How often, in microseconds, a key's counters are recalibrated from the
/// exact sorted-set records (30 s).
pub const CALIBRATION_INTERVAL_US: i64 = 30_000_000;

/// TTL applied to the fast-path counters and `last_sync`.
pub const COUNTER_TTL: Duration = Duration::from_secs(90);

/// TTL applied to the three exact-record sorted sets.
pub const SORTED_SET_TTL: Duration = Duration::from_secs(3_600);

/// Generate a request id unique enough to disambiguate same-microsecond
/// collisions under the sliding-window sorted sets: `"<now_us><3 digits>"`.
fn generate_request_id(now_us: i64) -> String {
    let suffix: u32 = rand::rng().random_range(100..1000);
    format!("{now_us}{suffix}")
}

/// Ties a [`QuotaCatalog`] to an [`AdmissionStore`] backend and runs the
/// admission algorithm on behalf of the gateway handler.
#[derive(Debug, Clone)]
pub struct AdmissionEngine<S> {
    catalog: QuotaCatalog,
    store: S,
}

impl<S: AdmissionStore> AdmissionEngine<S> {
    /// Build an engine from a catalog and a store backend.
    pub fn new(catalog: QuotaCatalog, store: S) -> Self {
        Self { catalog, store }
    }

    /// Look up `api_key`'s quota row. `None` means the caller should apply
    /// its own unknown-key policy rather than calling [`Self::admit`].
    pub fn lookup(&self, api_key: &str) -> Option<&crate::quota::Quota> {
        self.catalog.lookup(api_key)
    }

    /// Run one admission decision for `api_key`, consuming `input_tokens`
    /// input tokens and `output_tokens` output tokens against its quota
    /// row. The caller must have already resolved the quota row via
    /// [`Self::lookup`] -- an unknown key is not this method's concern.
    pub async fn admit(
        &self,
        api_key: &str,
        quota: &crate::quota::Quota,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<Decision> {
        let now_us = current_timestamp_us();
        let keys = KeySet::for_api_key(api_key);
        let args = AdmissionArgs {
            now_us,
            window_start_us: now_us - WINDOW_US,
            rpm: quota.rpm(),
            input_tpm: quota.input_tpm(),
            output_tpm: quota.output_tpm(),
            input_tokens,
            output_tokens,
            request_id: generate_request_id(now_us),
        };

        self.store.admit(&keys, args).await
    }
}
