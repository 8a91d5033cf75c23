//! Chunked JSONL message channel over a duplex byte stream.
//!
//! The channel performs one bounded read per [`MessageChannel::receive`]
//! call. Bytes that do not yet form a complete line stay buffered until a
//! later read completes them, so a message split across any number of
//! chunks is delivered exactly as if it had arrived whole. A read that
//! times out, would block, or is interrupted yields [`Received::Idle`],
//! which hands control back to the caller so it can check for an abort
//! request before reading again.
//!
//! The stream decides how long a read may block. The driver supervisor sets
//! a read timeout equal to the poll interval on its socket; tests use
//! in-memory streams that never block.

use std::io::{self, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::error::DriverError;

/// Tracing target for channel operations.
const CHANNEL_TARGET: &str = "xmnr_driver::channel";

/// Default number of bytes requested per read.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Default upper bound for a single message.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Outcome of a single receive attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received<T> {
    /// A complete message.
    Message(T),
    /// No complete message is available yet; call again.
    Idle,
    /// The peer closed the stream and nothing remains buffered.
    Closed,
}

impl<T> Received<T> {
    /// Returns the message, if this outcome carries one.
    pub fn into_message(self) -> Option<T> {
        match self {
            Self::Message(message) => Some(message),
            Self::Idle | Self::Closed => None,
        }
    }
}

/// Result of one read from the underlying stream.
enum Fill {
    Data,
    Pending,
    Eof,
}

/// Message channel with chunked reads and JSONL framing.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use xmnr_driver::channel::{MessageChannel, Received};
/// use xmnr_driver::protocol::DriverEvent;
///
/// let input = b"{\"kind\":\"summary\",\"text\":\"done\"}\n".to_vec();
/// let mut channel = MessageChannel::new(Cursor::new(input));
/// let first: Received<DriverEvent> = channel.receive().unwrap();
/// assert_eq!(first, Received::Message(DriverEvent::Summary { text: "done".into() }));
/// assert_eq!(channel.receive::<DriverEvent>().unwrap(), Received::Closed);
/// ```
#[derive(Debug)]
pub struct MessageChannel<S> {
    stream: S,
    buffer: Vec<u8>,
    chunk: Vec<u8>,
    max_message_bytes: usize,
    closed: bool,
}

impl<S> MessageChannel<S> {
    /// Wraps a stream using the default chunk size and message limit.
    #[must_use]
    pub fn new(stream: S) -> Self {
        Self::with_limits(stream, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_MESSAGE_BYTES)
    }

    /// Wraps a stream with explicit limits. A zero chunk size is raised to one.
    #[must_use]
    pub fn with_limits(stream: S, chunk_size: usize, max_message_bytes: usize) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            chunk: vec![0_u8; chunk_size.max(1)],
            max_message_bytes,
            closed: false,
        }
    }

    /// Number of buffered bytes not yet delivered.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` once the peer has closed the stream.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Drops any buffered bytes and returns how many were discarded.
    pub fn discard_pending(&mut self) -> usize {
        let discarded = self.buffer.len();
        self.buffer.clear();
        if discarded > 0 {
            debug!(target: CHANNEL_TARGET, discarded, "discarded buffered driver output");
        }
        discarded
    }

    /// Returns a reference to the underlying stream.
    #[must_use]
    pub const fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Pops the next complete, non-blank line from the buffer.
    fn take_line(&mut self) -> Result<Option<Vec<u8>>, DriverError> {
        while let Some(position) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=position).collect();
            line.pop();
            if line.len() > self.max_message_bytes {
                return Err(DriverError::MessageTooLarge {
                    size: line.len(),
                    max_size: self.max_message_bytes,
                });
            }
            if !is_blank(&line) {
                return Ok(Some(line));
            }
        }
        Ok(None)
    }

    /// Delivers whatever remains after the peer closed the stream.
    fn finish<T: DeserializeOwned>(&mut self) -> Result<Received<T>, DriverError> {
        if let Some(line) = self.take_line()? {
            return decode(&line).map(Received::Message);
        }
        let trailing = std::mem::take(&mut self.buffer);
        if is_blank(&trailing) {
            return Ok(Received::Closed);
        }
        debug!(
            target: CHANNEL_TARGET,
            bytes = trailing.len(),
            "delivering unterminated final driver message"
        );
        decode(&trailing).map(Received::Message)
    }

    fn enforce_limit(&self) -> Result<(), DriverError> {
        let partial = self
            .buffer
            .iter()
            .rposition(|byte| *byte == b'\n')
            .map_or(self.buffer.len(), |newline| self.buffer.len() - newline - 1);
        if partial > self.max_message_bytes {
            return Err(DriverError::MessageTooLarge {
                size: partial,
                max_size: self.max_message_bytes,
            });
        }
        Ok(())
    }
}

impl<S: Read> MessageChannel<S> {
    /// Receives the next complete message.
    ///
    /// Performs at most one read on the stream. Returns [`Received::Idle`]
    /// when the read produced no complete message, and [`Received::Closed`]
    /// once the stream has ended and every buffered message was delivered.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MalformedMessage`] for a line that does not
    /// decode as `T`, [`DriverError::MessageTooLarge`] when a message
    /// exceeds the limit, and [`DriverError::Io`] for read failures other
    /// than timeouts and interrupts.
    pub fn receive<T: DeserializeOwned>(&mut self) -> Result<Received<T>, DriverError> {
        if let Some(line) = self.take_line()? {
            return decode(&line).map(Received::Message);
        }
        if self.closed {
            return self.finish();
        }
        match self.fill()? {
            Fill::Data => Ok(match self.take_line()? {
                Some(line) => Received::Message(decode(&line)?),
                None => Received::Idle,
            }),
            Fill::Pending => Ok(Received::Idle),
            Fill::Eof => {
                self.closed = true;
                debug!(target: CHANNEL_TARGET, "driver closed its stream");
                self.finish()
            }
        }
    }

    fn fill(&mut self) -> Result<Fill, DriverError> {
        match self.stream.read(&mut self.chunk) {
            Ok(0) => Ok(Fill::Eof),
            Ok(read) => {
                let bytes = self.chunk.get(..read).unwrap_or_default();
                self.buffer.extend_from_slice(bytes);
                trace!(
                    target: CHANNEL_TARGET,
                    read,
                    buffered = self.buffer.len(),
                    "read driver chunk"
                );
                self.enforce_limit()?;
                Ok(Fill::Data)
            }
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(Fill::Pending)
            }
            Err(error) if error.kind() == io::ErrorKind::ConnectionReset => {
                debug!(target: CHANNEL_TARGET, %error, "driver stream reset");
                Ok(Fill::Eof)
            }
            Err(error) => Err(DriverError::io("read driver output", error)),
        }
    }
}

impl<S: Write> MessageChannel<S> {
    /// Serialises `message` as one JSONL line and flushes it.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Serialize`] when the message cannot be
    /// encoded and [`DriverError::Io`] when writing fails.
    pub fn send<T: Serialize>(&mut self, message: &T) -> Result<(), DriverError> {
        let mut line = serde_json::to_vec(message).map_err(DriverError::Serialize)?;
        line.push(b'\n');
        self.stream
            .write_all(&line)
            .map_err(|error| DriverError::io("write driver request", error))?;
        self.stream
            .flush()
            .map_err(|error| DriverError::io("flush driver request", error))?;
        debug!(target: CHANNEL_TARGET, bytes = line.len(), "sent driver message");
        Ok(())
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

fn decode<T: DeserializeOwned>(line: &[u8]) -> Result<T, DriverError> {
    serde_json::from_slice(line).map_err(DriverError::malformed)
}
