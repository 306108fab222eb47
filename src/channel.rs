//! Downstream channel contract and the bounded in-memory implementation.
//!
//! A channel takes one event at a time and answers synchronously: accepted,
//! or rejected with a reason. Rejection is how backpressure reaches the
//! client (`FAILED: ...` on the wire); the connection keeps going afterwards.

use std::fmt;

use tokio::sync::mpsc;

use crate::event::Event;

/// Why a channel refused an event.
#[derive(Debug)]
pub enum ChannelError {
    /// The queue is at capacity; the event was not taken.
    Full(usize),
    /// The consumer went away; nothing will be accepted anymore.
    Closed,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Full(capacity) => {
                write!(f, "channel capacity {} reached", capacity)
            }
            ChannelError::Closed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Consumer of events, one at a time.
///
/// `put` must answer before the caller moves on to the next line; an `Err`
/// means the event was not taken and the caller reports the failure.
pub trait ChannelSink: Send + Sync {
    fn put(&self, event: Event) -> Result<(), ChannelError>;
}

/// Bounded in-memory channel backed by a tokio mpsc queue.
///
/// The sink half never blocks: a full queue is an immediate rejection, which
/// the source turns into a client-visible failure.
pub struct MemoryChannel {
    tx: mpsc::Sender<Event>,
    capacity: usize,
}

impl MemoryChannel {
    /// Create a channel with the given queue depth, returning the sink half
    /// and the receiver the consumer drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        // mpsc requires a capacity of at least one
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, capacity }, rx)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl ChannelSink for MemoryChannel {
    fn put(&self, event: Event) -> Result<(), ChannelError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ChannelError::Full(self.capacity),
            mpsc::error::TrySendError::Closed(_) => ChannelError::Closed,
        })
    }
}
