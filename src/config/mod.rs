//! Configuration module for svarog.
//!
//! This module provides all configuration types and parsing logic:
//! - `Config` - Root configuration container
//! - `Listen` - Bind address for the line source (required)
//! - `Source` - Line length, acknowledgements, character encoding
//! - `Channel` - Downstream channel capacity
//! - `Http` - Optional observability endpoint

mod parser;
mod types;

pub use parser::load_config;
pub use types::*;
