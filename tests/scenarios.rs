//! Scenario tests S1-S6, seeded from the reference deployment's own test
//! suite. S1-S3 and S6 drive [`MemoryStore`] directly with hand-crafted
//! timestamps so the sliding window and the 30s calibration cadence can be
//! exercised without sleeping in real time. S4 and S5 exercise the full
//! `axum` router so the fail-open and missing-bearer paths are observed at
//! the HTTP layer, not just the store. `test_s1_free_tier_rpm_trip_against_redis`
//! mirrors S1 against a live `RedisStore`, `#[ignore]`-gated since it needs
//! a reachable Redis.

use chatgate_ratelimit::store::{AdmissionArgs, AdmissionStore, KeySet};
use chatgate_ratelimit::{MemoryStore, Reason};

const WINDOW_US: i64 = 60_000_000;
const TEN_MS_US: i64 = 10_000;

fn args(now_us: i64, rpm: u64, input_tpm: u64, output_tpm: u64, input: u64, output: u64, id: &str) -> AdmissionArgs {
    AdmissionArgs {
        now_us,
        window_start_us: now_us - WINDOW_US,
        rpm,
        input_tpm,
        output_tpm,
        input_tokens: input,
        output_tokens: output,
        request_id: id.to_string(),
    }
}

/// Force a fresh key through the calibration branch once, so the scenario
/// that follows starts from a known, steady `req_ctr = 0` fast-path state
/// instead of having its first call silently absorbed by calibration.
async fn warm_up(store: &MemoryStore, keys: &KeySet, base_us: i64) {
    let decision = store
        .admit(keys, args(base_us, u64::MAX, u64::MAX, u64::MAX, 0, 0, "warmup"))
        .await
        .unwrap();
    assert!(decision.is_allowed(), "calibration call always admits");
}

/// S1 - Free tier RPM trip. rpm=20, input_tpm=4000, output_tpm=1000. 25
/// requests with 1-char content (1 input token) at 10ms spacing: first 20
/// admit, 21-25 deny with RPM_EXCEEDED.
#[tokio::test]
async fn test_s1_free_tier_rpm_trip() {
    let store = MemoryStore::new();
    let keys = KeySet::for_api_key("free-tier-key");
    let base = 1_700_000_000_000_000;
    warm_up(&store, &keys, base).await;

    let mut allowed = 0;
    for i in 0..25i64 {
        let now_us = base + 1_000 + i * TEN_MS_US;
        let decision = store
            .admit(&keys, args(now_us, 20, 4_000, 1_000, 1, 50, &format!("s1-{i}")))
            .await
            .unwrap();
        if i < 20 {
            assert!(decision.is_allowed(), "request {i} should admit");
            allowed += 1;
        } else {
            assert!(decision.is_denied(), "request {i} should be denied");
            assert_eq!(decision.reason(), Reason::RpmExceeded);
        }
    }
    assert_eq!(allowed, 20);
}

/// S2 - Input-TPM trip before RPM. rpm=500, input_tpm=60000. 4 requests of
/// 15000 input tokens each admit; the 5th (another 15000) would push the
/// running total to 75000 > 60000 and is denied INPUT_TPM_EXCEEDED.
#[tokio::test]
async fn test_s2_input_tpm_trip_before_rpm() {
    let store = MemoryStore::new();
    let keys = KeySet::for_api_key("s2-key");
    let base = 1_700_000_000_000_000;
    warm_up(&store, &keys, base).await;

    for i in 0..4i64 {
        let now_us = base + 1_000 + i * TEN_MS_US;
        let decision = store
            .admit(&keys, args(now_us, 500, 60_000, 100_000, 15_000, 50, &format!("s2-{i}")))
            .await
            .unwrap();
        assert!(decision.is_allowed(), "request {i} should admit");
    }

    let now_us = base + 1_000 + 4 * TEN_MS_US;
    let decision = store
        .admit(&keys, args(now_us, 500, 60_000, 100_000, 15_000, 50, "s2-4"))
        .await
        .unwrap();
    assert!(decision.is_denied());
    assert_eq!(decision.reason(), Reason::InputTpmExceeded);
}

/// S3 - Output-TPM trip. rpm=500, input_tpm=60000, output_tpm=20000. Each
/// request contributes 50 output tokens; after 400 admissions (20000
/// tokens), the 401st is denied OUTPUT_TPM_EXCEEDED.
#[tokio::test]
async fn test_s3_output_tpm_trip() {
    let store = MemoryStore::new();
    let keys = KeySet::for_api_key("s3-key");
    let base = 1_700_000_000_000_000;
    warm_up(&store, &keys, base).await;

    for i in 0..400i64 {
        let now_us = base + 1_000 + i * TEN_MS_US;
        let decision = store
            .admit(&keys, args(now_us, 500, 60_000, 20_000, 1, 50, &format!("s3-{i}")))
            .await
            .unwrap();
        assert!(decision.is_allowed(), "request {i} should admit");
    }

    let now_us = base + 1_000 + 400 * TEN_MS_US;
    let decision = store
        .admit(&keys, args(now_us, 500, 60_000, 20_000, 1, 50, "s3-400"))
        .await
        .unwrap();
    assert!(decision.is_denied());
    assert_eq!(decision.reason(), Reason::OutputTpmExceeded);
}

/// S6 - Calibration heals drift. Admit 15 requests, let every event age
/// past the window, force the 30s calibration branch, then verify the next
/// call sees freshly rebuilt counters rather than 15 stale requests.
#[tokio::test]
async fn test_s6_calibration_heals_drift() {
    let store = MemoryStore::new();
    let keys = KeySet::for_api_key("s6-key");
    let base = 1_700_000_000_000_000;
    warm_up(&store, &keys, base).await;

    for i in 0..15i64 {
        let now_us = base + 1_000 + i * TEN_MS_US;
        let decision = store
            .admit(&keys, args(now_us, 20, 10_000, 10_000, 1, 1, &format!("s6-{i}")))
            .await
            .unwrap();
        assert!(decision.is_allowed());
    }

    // Jump far enough ahead that every recorded event aged out of the
    // window AND the calibration interval has elapsed, forcing calibration.
    let calibration_time = base + WINDOW_US + 40_000_000;
    let decision = store
        .admit(&keys, args(calibration_time, 20, 10_000, 10_000, 0, 0, "s6-calibrate"))
        .await
        .unwrap();
    assert!(decision.is_allowed(), "calibration call always admits");

    // The request right after calibration is the first fast-path call
    // against freshly rebuilt (zeroed) counters: budget for 19 more before
    // rpm=20 trips.
    let mut allowed_after = 0;
    for i in 0..20i64 {
        let now_us = calibration_time + 1_000 + i * TEN_MS_US;
        let decision = store
            .admit(&keys, args(now_us, 20, 10_000, 10_000, 1, 1, &format!("s6-post-{i}")))
            .await
            .unwrap();
        if decision.is_allowed() {
            allowed_after += 1;
        } else {
            assert_eq!(decision.reason(), Reason::RpmExceeded);
            break;
        }
    }
    assert_eq!(allowed_after, 20, "all 20 counted requests should fit the healed budget");
}

/// Mirrors `s1_free_tier_rpm_trip` against a live `RedisStore` so the Lua
/// script is exercised by the same scenario, not just the `MemoryStore`
/// reimplementation. Ignored by default since it needs `redis-server`
/// reachable at `REDIS_URL` (default `redis://127.0.0.1:6379`); run with
/// `cargo test --features redis -- --ignored`.
#[cfg(feature = "redis")]
#[tokio::test]
#[ignore]
async fn test_s1_free_tier_rpm_trip_against_redis() {
    use chatgate_ratelimit::{RedisConfig, RedisStore};

    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
    let store = RedisStore::new(RedisConfig::new(url))
        .await
        .expect("redis-server reachable at REDIS_URL");

    let api_key = format!("redis-s1-{}", std::process::id());
    let keys = KeySet::for_api_key(&api_key);
    let base = 1_700_000_000_000_000;
    store
        .admit(&keys, args(base, u64::MAX, u64::MAX, u64::MAX, 0, 0, "warmup"))
        .await
        .unwrap();

    let mut allowed = 0;
    for i in 0..25i64 {
        let now_us = base + 1_000 + i * TEN_MS_US;
        let decision = store
            .admit(&keys, args(now_us, 20, 4_000, 1_000, 1, 50, &format!("s1-{i}")))
            .await
            .unwrap();
        if i < 20 {
            assert!(decision.is_allowed(), "request {i} should admit");
            allowed += 1;
        } else {
            assert!(decision.is_denied(), "request {i} should be denied");
            assert_eq!(decision.reason(), Reason::RpmExceeded);
        }
    }
    assert_eq!(allowed, 20);
}

#[cfg(feature = "axum")]
mod http {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use chatgate_ratelimit::algorithm::AdmissionEngine;
    use chatgate_ratelimit::gateway::{router, GatewayState};
    use chatgate_ratelimit::middleware::AdmissionPolicy;
    use chatgate_ratelimit::{MemoryStore, QuotaCatalog};

    fn chat_body() -> Body {
        Body::from(
            serde_json::json!({
                "model": "gpt-test",
                "messages": [{"role": "user", "content": "hi"}]
            })
            .to_string(),
        )
    }

    /// S4 - Unknown key admits. `Authorization: Bearer ghost-key` is not in
    /// the catalog; the default fail-open policy admits with 200.
    #[tokio::test]
    async fn test_s4_unknown_key_admits() {
        let engine = AdmissionEngine::new(QuotaCatalog::built_in(), Arc::new(MemoryStore::new()));
        let app = router(
            engine,
            AdmissionPolicy::default(),
            GatewayState { store_backend: "memory", pool_size: 0 },
        );

        let request = Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header("authorization", "Bearer ghost-key")
            .header("content-type", "application/json")
            .body(chat_body())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    /// S5 - Missing bearer token yields 401.
    #[tokio::test]
    async fn test_s5_missing_bearer_is_unauthorized() {
        let engine = AdmissionEngine::new(QuotaCatalog::built_in(), Arc::new(MemoryStore::new()));
        let app = router(
            engine,
            AdmissionPolicy::default(),
            GatewayState { store_backend: "memory", pool_size: 0 },
        );

        let request = Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header("content-type", "application/json")
            .body(chat_body())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
