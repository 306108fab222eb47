//! The unit of data flowing from a source to its channel.

use bytes::Bytes;

/// One ingested record: the UTF-8 body of a single decoded line, with the
/// terminating newline stripped. Immutable once built; ownership passes to
/// the channel on submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    body: Bytes,
}

impl Event {
    /// Build an event from a body.
    pub fn with_body(body: impl Into<Bytes>) -> Self {
        Self { body: body.into() }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }
}
