//! Axum middleware wrapping the admission engine.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::post};
//! use chatgate_ratelimit::algorithm::AdmissionEngine;
//! use chatgate_ratelimit::middleware::{AdmissionLayer, AdmissionPolicy};
//! use chatgate_ratelimit::store::MemoryStore;
//! use chatgate_ratelimit::quota::QuotaCatalog;
//!
//! let engine = AdmissionEngine::new(QuotaCatalog::built_in(), MemoryStore::new());
//!
//! let app: Router = Router::new()
//!     .route("/v1/chat/completions", post(handler))
//!     .layer(AdmissionLayer::new(engine, AdmissionPolicy::default()));
//! ```

mod layer;

pub use layer::{AdmissionLayer, AdmissionPolicy, AdmissionService, TokenEstimate};
