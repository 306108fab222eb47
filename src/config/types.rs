//! Configuration type definitions.

use crate::net::codec::SourceEncoding;

/// Listener settings. Host and port have no usable defaults; a loaded
/// configuration must set both.
#[derive(Clone, Debug, Default)]
pub struct Listen {
    pub host: String,
    pub port: u16,
}

/// Line source settings.
#[derive(Clone, Debug)]
pub struct Source {
    /// Per-connection buffer capacity in characters, newline included.
    pub max_line_length: usize,
    /// Write `OK\n` back for every accepted line.
    pub ack_every_event: bool,
    pub encoding: SourceEncoding,
}

impl Default for Source {
    fn default() -> Self {
        Self {
            max_line_length: 512,
            ack_every_event: true,
            encoding: SourceEncoding::Utf8,
        }
    }
}

/// Downstream channel settings.
#[derive(Clone, Debug)]
pub struct Channel {
    pub capacity: usize,
}

impl Default for Channel {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// HTTP observability endpoint settings.
#[derive(Clone, Debug)]
pub struct Http {
    pub bind_addr: String,
}

impl Default for Http {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
        }
    }
}

/// Root configuration container. Shared read-only once the source starts.
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub listen: Listen,
    pub source: Source,
    pub channel: Channel,
    /// Observability server; absent means no HTTP endpoint.
    pub http: Option<Http>,
}
