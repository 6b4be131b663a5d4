//! `gateway`: runs the admission-gated chat-completion HTTP front door.
//!
//! Wires a [`GatewayConfig`] assembled from CLI flags and environment
//! variables to either the in-process [`MemoryStore`] or a [`RedisStore`],
//! builds the [`AdmissionEngine`], and serves the [`chatgate_ratelimit::gateway::router`]
//! on the configured bind address.

use std::sync::Arc;

use clap::Parser;

use chatgate_ratelimit::algorithm::AdmissionEngine;
use chatgate_ratelimit::config::GatewayConfig;
use chatgate_ratelimit::gateway::{self, GatewayState};
use chatgate_ratelimit::middleware::AdmissionPolicy;
use chatgate_ratelimit::store::{MemoryStore, RedisConfig, RedisStore};

/// Multi-tenant rate-limiting front door for an OpenAI-compatible
/// chat-completion API.
#[derive(Debug, Parser)]
#[command(
    name = "gateway",
    version,
    about = "Admission-gated chat-completion gateway",
    after_help = "Set RUST_LOG to control log verbosity (default: info)."
)]
struct Cli {
    /// Address the HTTP server binds to.
    #[arg(long, env = "GATEWAY_BIND_ADDR", default_value = "0.0.0.0:8003")]
    bind: String,

    /// Redis connection URL. Ignored when `--store` is `memory`.
    #[arg(long, env = "GATEWAY_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Path to a TOML quota catalog. Falls back to the built-in catalog when absent.
    #[arg(long, env = "GATEWAY_CATALOG_PATH")]
    catalog: Option<String>,

    /// Store backend to run the admission algorithm against.
    #[arg(long, env = "GATEWAY_STORE", default_value = "memory")]
    store: StoreBackend,

    /// Deny requests for API keys absent from the catalog instead of admitting them.
    #[arg(long, env = "GATEWAY_DENY_UNKNOWN_KEY")]
    deny_unknown_key: bool,

    /// Deny requests when the store backend errors instead of admitting them.
    #[arg(long, env = "GATEWAY_DENY_ON_STORE_ERROR")]
    deny_on_store_error: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum StoreBackend {
    Memory,
    Redis,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let config = GatewayConfig {
        bind_addr: cli.bind.parse()?,
        redis_url: cli.redis_url.clone(),
        catalog_path: cli.catalog.clone(),
        fail_open_on_unknown_key: !cli.deny_unknown_key,
        fail_open_on_store_error: !cli.deny_on_store_error,
    };
    config.validate()?;

    let catalog = config.load_catalog()?;
    tracing::info!(api_keys = catalog.len(), "loaded quota catalog");

    let policy = AdmissionPolicy {
        fail_open_on_unknown_key: config.fail_open_on_unknown_key,
        fail_open_on_store_error: config.fail_open_on_store_error,
    };

    let app = match cli.store {
        StoreBackend::Memory => {
            let engine = AdmissionEngine::new(catalog, Arc::new(MemoryStore::new()));
            let state = GatewayState {
                store_backend: "memory",
                pool_size: 0,
            };
            gateway::router(engine, policy, state)
        }
        StoreBackend::Redis => {
            let redis_config = RedisConfig::new(config.redis_url.clone());
            let pool_size = redis_config.pool_size;
            let store = RedisStore::new(redis_config).await?;
            let engine = AdmissionEngine::new(catalog, Arc::new(store));
            let state = GatewayState {
                store_backend: "redis",
                pool_size,
            };
            gateway::router(engine, policy, state)
        }
    };

    tracing::info!(addr = %config.bind_addr, store = ?cli.store, "starting gateway");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
