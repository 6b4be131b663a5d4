//! The admission engine that enforces per-API-key rate limits.
//!
//! A single [`AdmissionEngine`] ties a [`crate::quota::QuotaCatalog`] to an
//! [`crate::store::AdmissionStore`] backend and runs the sliding-window,
//! multi-dimensional (requests, input tokens, output tokens) admission
//! algorithm on every call.

pub mod admission;
pub use admission::AdmissionEngine;
