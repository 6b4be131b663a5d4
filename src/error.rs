//! Error types for the rate limiting engine and gateway.
//!
//! This module provides the error hierarchy for every layer of the crate:
//! store errors (Redis or the in-process backend), configuration errors,
//! and the gateway-facing error that the HTTP handler maps to a status
//! code.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Top-level error type for rate limiting operations.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Store backend error (Redis connection, script execution, serialization).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error (quota catalog, bind address, ...).
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Connection-level error talking to the shared store.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Internal invariant violation; should not surface to callers.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Store-related errors (Redis or the in-process `MemoryStore`).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The admission script failed to execute (Lua error, wrong arity, ...).
    #[error("{message}")]
    ScriptFailed {
        /// Error message from the store driver.
        message: String,
        /// Whether retrying the same call is likely to help.
        retryable: bool,
    },

    /// Serialization/deserialization of a sorted-set member failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Connection pool exhausted.
    #[error("connection pool exhausted")]
    PoolExhausted,
}

impl StoreError {
    /// Create a new script-failed error.
    pub fn script_failed(message: impl Into<String>, retryable: bool) -> Self {
        Self::ScriptFailed {
            message: message.into(),
            retryable,
        }
    }

    /// Whether this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ScriptFailed { retryable, .. } => *retryable,
            Self::PoolExhausted => true,
            Self::Serialization(_) => false,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid quota row (e.g. an rpm of 0 where that is disallowed).
    #[error("invalid quota: {0}")]
    InvalidQuota(String),

    /// The catalog file could not be read or parsed.
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    /// A required configuration value was missing.
    #[error("missing required configuration: {0}")]
    MissingRequired(String),
}

/// Connection-related errors talking to the shared store.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Failed to establish a connection.
    #[error("failed to connect: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly mid-call.
    #[error("connection closed unexpectedly")]
    Closed,
}

/// Error surfaced by the gateway HTTP handler.
///
/// Distinct from [`RateLimitError`]: the handler's fail-open policy means
/// most store/connection errors never reach this type (they are logged and
/// converted into an admit decision). This type only carries errors that
/// must change the HTTP response.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or malformed `Authorization` header.
    #[error("Missing or invalid authorization")]
    MissingAuthorization,

    /// The admission engine denied the request.
    #[error("Rate limit exceeded: {reason}")]
    RateLimited {
        /// The reason reported by the admission script.
        reason: crate::decision::Reason,
    },
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        use axum::response::Json;

        let detail = self.to_string();
        let body = Json(serde_json::json!({ "detail": detail }));

        match self {
            Self::MissingAuthorization => (StatusCode::UNAUTHORIZED, body).into_response(),
            Self::RateLimited { .. } => {
                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                response
                    .headers_mut()
                    .insert("retry-after", "60".parse().unwrap());
                response
            }
        }
    }
}
