//! API module for svarog.
//!
//! This module provides external interfaces:
//! - `http` - HTTP observability server

pub mod http;

pub use http::serve_http;
