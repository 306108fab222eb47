//! Per-connection line protocol handler.
//!
//! Each accepted connection gets one worker owning the socket, a
//! `LineBuffer` window sized to the configured max line length, and the
//! encoding-bound decoder. The worker alternates `fill` (one socket read
//! into the freed tail of the buffer) and `process_events` (slice newline
//! terminated lines, forward them, reply) until end of stream, an I/O
//! error, or an overlong line.

use std::io;
use std::sync::Arc;

use log::*;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::channel::ChannelSink;
use crate::config::Config;
use crate::counters::CounterGroup;
use crate::event::Event;

use super::buffer::LineBuffer;
use super::codec::{SourceEncoding, TextDecoder};

/// Upper bound on a single socket read, whatever the line length config says.
const MAX_READ_BYTES: usize = 8 * 1024;

/// State for one connection. Everything is fixed at construction; nothing is
/// assigned onto a worker after it is built.
pub struct ConnectionWorker<S> {
    stream: S,
    buffer: LineBuffer,
    decoder: TextDecoder,
    /// Characters decoded but not yet moved into the window. Stays tiny: a
    /// read is sized so at most a couple of characters overflow the free
    /// space (surrogate completion, carry flush).
    pending: Vec<char>,
    scratch: Vec<u8>,
    encoding: SourceEncoding,
    ack_every_event: bool,
    counters: Arc<CounterGroup>,
    sink: Arc<dyn ChannelSink>,
    stream_eof: bool,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ConnectionWorker<S> {
    pub fn new(
        stream: S,
        cfg: &Config,
        counters: Arc<CounterGroup>,
        sink: Arc<dyn ChannelSink>,
    ) -> Self {
        let encoding = cfg.source.encoding;
        let scratch_len =
            (cfg.source.max_line_length * encoding.min_bytes_per_char()).clamp(1, MAX_READ_BYTES);
        Self {
            stream,
            buffer: LineBuffer::new(cfg.source.max_line_length),
            decoder: TextDecoder::new(encoding),
            pending: Vec::new(),
            scratch: vec![0; scratch_len],
            encoding,
            ack_every_event: cfg.source.ack_every_event,
            counters,
            sink,
            stream_eof: false,
        }
    }

    /// Drive the connection to completion.
    ///
    /// `Ok(())` means the session ended without an I/O error: clean end of
    /// stream, or an overlong line answered and dropped. Any `Err` is a
    /// broken session; the socket closes when the worker is dropped either
    /// way.
    pub async fn run(mut self) -> io::Result<()> {
        loop {
            let chars_read = self.fill().await?;
            debug!("Chars read = {}", chars_read.map_or(-1, |n| n as i64));

            let events_processed = self.process_events().await?;
            debug!("Events processed = {}", events_processed);

            if chars_read.is_none() {
                // end of stream, and the last processing pass already ran
                break;
            }
            if chars_read == Some(0)
                && events_processed == 0
                && self.buffer.unconsumed_len() == self.buffer.capacity()
            {
                // Nothing new fit, no newline found, and the window is full:
                // the client sent a line longer than the buffer. Answer and
                // drop the connection; memory stays bounded at capacity.
                warn!("Client sent event exceeding the maximum length");
                self.counters.increment_and_get("events.failed");
                let reply = format!(
                    "FAILED: Event exceeds the maximum length ({} chars, including newline)\n",
                    self.buffer.capacity()
                );
                self.write_reply(&reply).await?;
                break;
            }
        }
        Ok(())
    }

    /// Refill the window from the socket.
    ///
    /// Compacts first so the writable space is the tail, then performs at
    /// most one socket read, decodes, and moves as many characters as fit.
    /// Returns the number of characters added, or `None` once the stream has
    /// ended and every decoded character has been handed over.
    async fn fill(&mut self) -> io::Result<Option<usize>> {
        self.buffer.compact();
        let free = self.buffer.free();
        if free == 0 {
            return Ok(Some(0));
        }

        if self.pending.is_empty() && !self.stream_eof {
            // size the read so the decoded characters roughly match the free
            // space; a small overshoot lands in `pending`
            let want = (free * self.encoding.min_bytes_per_char()).min(self.scratch.len());
            let n = self.stream.read(&mut self.scratch[..want]).await?;
            if n == 0 {
                self.stream_eof = true;
                self.decoder.finish(&mut self.pending);
            } else {
                self.decoder.decode(&self.scratch[..n], &mut self.pending);
            }
        }

        if self.pending.is_empty() {
            return if self.stream_eof {
                Ok(None)
            } else {
                // bytes arrived but no complete character yet
                Ok(Some(0))
            };
        }

        let take = free.min(self.pending.len());
        for c in self.pending.drain(..take) {
            self.buffer.push(c);
        }
        self.counters.add_and_get("characters.received", take as u64);
        Ok(Some(take))
    }

    /// Consume every complete line currently in the window.
    ///
    /// For each newline found: forward the span before it as one event, then
    /// reply. Success is acknowledged only when ack-every-event is on;
    /// failure is always reported. The cursor advances past the newline
    /// after the reply is flushed. Returns the number of events the channel
    /// accepted.
    async fn process_events(&mut self) -> io::Result<usize> {
        let mut num_processed = 0;

        while let Some(pos) = self.buffer.find_newline() {
            let body: String = self.buffer.unconsumed()[..pos].iter().collect();
            let event = Event::with_body(body);

            match self.sink.put(event) {
                Ok(()) => {
                    self.counters.increment_and_get("events.processed");
                    num_processed += 1;
                    if self.ack_every_event {
                        self.write_reply("OK\n").await?;
                    }
                }
                Err(e) => {
                    self.counters.increment_and_get("events.failed");
                    warn!("Error processing event: {}", e);
                    let reply = format!("FAILED: {}\n", e);
                    self.write_reply(&reply).await?;
                }
            }

            // skip the newline itself
            self.buffer.consume(pos + 1);
        }

        Ok(num_processed)
    }

    async fn write_reply(&mut self, text: &str) -> io::Result<()> {
        let bytes = self.encoding.encode(text);
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await
    }
}

/// Run one session to completion and account for it.
///
/// A session that ends without an I/O error counts as completed (this
/// includes the overlong-line close); an I/O error marks it broken. The
/// socket closes when the worker drops.
pub(crate) async fn run_session<S>(worker: ConnectionWorker<S>, counters: Arc<CounterGroup>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!("Starting connection handler ({})", worker.encoding.name());
    match worker.run().await {
        Ok(()) => {
            counters.increment_and_get("sessions.completed");
        }
        Err(e) => {
            counters.increment_and_get("sessions.broken");
            debug!("session ended on I/O error: {}", e);
        }
    }
    debug!("Connection handler exiting");
}
