//! HTTP API server module.
//!
//! Provides:
//! - Status page at `/`
//! - JSON counters at `/api/counters`
//! - Prometheus metrics at `/metrics`

mod handlers;
mod router;

pub use router::serve_http;
