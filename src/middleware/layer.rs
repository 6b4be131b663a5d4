//! Tower layer that performs authentication, token estimation, and the
//! admission call before the inner service ever runs.
//!
//! Mirrors the reference library's `RateLimitLayer`/`RateLimitService`
//! pair, but specialized to the one endpoint this gateway has: it buffers
//! the request body, parses it as a [`ChatCompletionRequest`], and stores
//! the parsed body in the request extensions so the downstream handler
//! does not have to parse it twice.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use tower::{Layer, Service};

use axum::response::IntoResponse;

use crate::algorithm::AdmissionEngine;
use crate::decision::{Decision, Reason};
use crate::error::GatewayError;
use crate::gateway::models::ChatCompletionRequest;
use crate::store::AdmissionStore;

/// Policy knobs threaded from [`crate::config::GatewayConfig`].
#[derive(Debug, Clone, Copy)]
pub struct AdmissionPolicy {
    pub fail_open_on_unknown_key: bool,
    pub fail_open_on_store_error: bool,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            fail_open_on_unknown_key: true,
            fail_open_on_store_error: true,
        }
    }
}

/// Tower layer wrapping the admission engine around an inner axum service.
pub struct AdmissionLayer<S> {
    engine: Arc<AdmissionEngine<S>>,
    policy: AdmissionPolicy,
}

impl<S> AdmissionLayer<S> {
    /// Build a layer from an engine and policy.
    pub fn new(engine: AdmissionEngine<S>, policy: AdmissionPolicy) -> Self {
        Self {
            engine: Arc::new(engine),
            policy,
        }
    }
}

impl<S> Clone for AdmissionLayer<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            policy: self.policy,
        }
    }
}

impl<S, Inner> Layer<Inner> for AdmissionLayer<S> {
    type Service = AdmissionService<S, Inner>;

    fn layer(&self, inner: Inner) -> Self::Service {
        AdmissionService {
            inner,
            engine: self.engine.clone(),
            policy: self.policy,
        }
    }
}

/// The service produced by [`AdmissionLayer`].
pub struct AdmissionService<S, Inner> {
    inner: Inner,
    engine: Arc<AdmissionEngine<S>>,
    policy: AdmissionPolicy,
}

impl<S, Inner: Clone> Clone for AdmissionService<S, Inner> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            engine: self.engine.clone(),
            policy: self.policy,
        }
    }
}

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn unauthorized() -> Response<Body> {
    GatewayError::MissingAuthorization.into_response()
}

fn rate_limited(reason: Reason) -> Response<Body> {
    GatewayError::RateLimited { reason }.into_response()
}

/// The config-driven deny paths (unknown key, store error) reject a caller
/// for a reason the admission script never reports, so they do not fit
/// [`GatewayError::RateLimited`]'s `Reason` payload.
fn synthetic_rate_limited(detail: &str) -> Response<Body> {
    let body = format!(r#"{{"detail":"Rate limit exceeded: {detail}"}}"#);
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    response
        .headers_mut()
        .insert("retry-after", "60".parse().unwrap());
    response
}

impl<S, Inner> Service<Request<Body>> for AdmissionService<S, Inner>
where
    S: AdmissionStore + Clone,
    Inner: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    Inner::Future: Send,
{
    type Response = Response<Body>;
    type Error = Inner::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let engine = self.engine.clone();
        let policy = self.policy;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(api_key) = bearer_token(&request).map(str::to_string) else {
                return Ok(unauthorized());
            };

            let (parts, body) = request.into_parts();
            let bytes = match axum::body::to_bytes(body, usize::MAX).await {
                Ok(bytes) => bytes,
                Err(_) => {
                    let mut response = Response::new(Body::from(r#"{"detail":"invalid body"}"#));
                    *response.status_mut() = StatusCode::UNPROCESSABLE_ENTITY;
                    return Ok(response);
                }
            };

            let parsed: ChatCompletionRequest = match serde_json::from_slice(&bytes) {
                Ok(parsed) => parsed,
                Err(_) => {
                    let mut response = Response::new(Body::from(
                        r#"{"detail":"malformed chat completion request"}"#,
                    ));
                    *response.status_mut() = StatusCode::UNPROCESSABLE_ENTITY;
                    return Ok(response);
                }
            };

            let input_tokens = parsed.estimated_input_tokens();
            let output_tokens = 50u64;

            let decision = match engine.lookup(&api_key) {
                None if policy.fail_open_on_unknown_key => Decision::allowed(),
                None => {
                    return Ok(synthetic_rate_limited("UNKNOWN_API_KEY"));
                }
                Some(quota) => {
                    let quota = quota.clone();
                    match engine.admit(&api_key, &quota, input_tokens, output_tokens).await {
                        Ok(decision) => decision,
                        Err(err) => {
                            tracing::warn!(error = %err, api_key, "admission store error");
                            if policy.fail_open_on_store_error {
                                Decision::allowed()
                            } else {
                                return Ok(synthetic_rate_limited("STORE_ERROR"));
                            }
                        }
                    }
                }
            };

            if decision.is_denied() {
                return Ok(rate_limited(decision.reason()));
            }

            let mut request = Request::from_parts(parts, Body::from(bytes));
            request.extensions_mut().insert(parsed);
            request
                .extensions_mut()
                .insert(TokenEstimate { input_tokens, output_tokens });

            inner.call(request).await
        })
    }
}

/// Token counts computed by the layer, handed to the handler via request
/// extensions so it is not recomputed.
#[derive(Debug, Clone, Copy)]
pub struct TokenEstimate {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
