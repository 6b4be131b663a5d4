//! Redis-backed store: one registered Lua script invoked per admission
//! call, so the read-check-write sequence runs atomically inside Redis
//! regardless of how many gateway instances share the same database.

use std::time::Duration;

use deadpool_redis::redis::Script;
use deadpool_redis::{Config, Connection, Pool, Runtime};

use crate::decision::{Decision, Reason};
use crate::error::{ConnectionError, Result, StoreError};
use crate::store::{AdmissionArgs, AdmissionStore, KeySet};

const ADMISSION_SCRIPT: &str = include_str!("admission.lua");

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g. `redis://localhost:6379`).
    pub url: String,
    /// Connection pool size.
    pub pool_size: usize,
    /// Timeout applied when establishing the initial pool connection.
    pub connection_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            // Matches the reference deployment's connection pool cap.
            pool_size: 500,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisConfig {
    /// Create a configuration pointed at the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the connection pool size.
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the initial connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}

/// `AdmissionStore` backend that runs the admission algorithm as a single
/// registered Lua script against a shared Redis instance.
pub struct RedisStore {
    pool: Pool,
    script: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Build a pool from `config`, verify it with a `PING`, and register
    /// the admission script.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let mut cfg = Config::from_url(&config.url);
        cfg.pool = Some(deadpool_redis::PoolConfig::new(config.pool_size));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;

        let mut conn = tokio::time::timeout(config.connection_timeout, pool.get())
            .await
            .map_err(|_| ConnectionError::ConnectionFailed("timed out acquiring connection".into()))?
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;

        let _: String = deadpool_redis::redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            pool,
            script: Script::new(ADMISSION_SCRIPT),
        })
    }

    /// Convenience constructor from a bare connection URL.
    pub async fn from_url(url: impl Into<String>) -> Result<Self> {
        Self::new(RedisConfig::new(url)).await
    }

    async fn get_conn(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|_| StoreError::PoolExhausted.into())
    }
}

impl AdmissionStore for RedisStore {
    async fn admit(&self, keys: &KeySet, args: AdmissionArgs) -> Result<Decision> {
        let mut conn = self.get_conn().await?;

        let (allowed, reason): (i64, String) = self
            .script
            .key(&keys.req)
            .key(&keys.input)
            .key(&keys.output)
            .arg(args.now_us)
            .arg(args.window_start_us)
            .arg(args.rpm)
            .arg(args.input_tpm)
            .arg(args.output_tpm)
            .arg(args.input_tokens)
            .arg(args.output_tokens)
            .arg(&args.request_id)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::script_failed(e.to_string(), true))?;

        Ok(if allowed == 1 {
            Decision::allowed()
        } else {
            Decision::denied(Reason::parse(&reason))
        })
    }
}
