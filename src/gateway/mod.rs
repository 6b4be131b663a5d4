//! The runnable HTTP surface: an `axum` router wiring [`AdmissionLayer`]
//! in front of the chat-completion handler, plus an unauthenticated
//! health check.

pub mod models;

use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;

use crate::algorithm::AdmissionEngine;
use crate::middleware::{AdmissionLayer, AdmissionPolicy, TokenEstimate};
use crate::store::AdmissionStore;

use models::{ChatCompletionRequest, ChatCompletionResponse, HealthResponse};

/// Shared state handed to every handler: just what the health check needs,
/// since the admission decision itself already happened in the layer.
#[derive(Clone)]
pub struct GatewayState {
    pub store_backend: &'static str,
    pub pool_size: usize,
}

/// Build the gateway's axum router.
///
/// `engine` and `policy` configure the [`AdmissionLayer`] wrapping
/// `/v1/chat/completions`; `/health` is unauthenticated and does not touch
/// the store.
pub fn router<S>(engine: AdmissionEngine<S>, policy: AdmissionPolicy, state: GatewayState) -> Router
where
    S: AdmissionStore + Clone,
{
    let app_state = Arc::new(state);

    let chat_route = Router::<Arc<GatewayState>>::new()
        .route("/v1/chat/completions", post(chat_completions))
        .layer(AdmissionLayer::new(engine, policy));

    Router::<Arc<GatewayState>>::new()
        .route("/health", get(health))
        .merge(chat_route)
        .with_state(app_state)
}

async fn chat_completions(
    Extension(body): Extension<ChatCompletionRequest>,
    Extension(tokens): Extension<TokenEstimate>,
) -> impl IntoResponse {
    Json(ChatCompletionResponse::mock(
        &body.model,
        tokens.input_tokens,
        tokens.output_tokens,
    ))
}

async fn health(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    Json(HealthResponse {
        status: "healthy",
        timestamp,
        store_backend: state.store_backend.to_string(),
        pool_size: state.pool_size,
    })
}
