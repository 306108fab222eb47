//! Network layer for the line-oriented source.
//!
//! This module contains:
//! - `buffer`: fixed-size character window a connection parses lines from
//! - `codec`: source encodings and the incremental byte-to-char decoder
//! - `worker`: per-connection fill/process loop and acknowledgements
//! - `source`: listener lifecycle, accept loop, shutdown

pub mod buffer;
pub mod codec;
pub mod source;
pub mod worker;

// Re-export main entry point
pub use source::LineSource;
