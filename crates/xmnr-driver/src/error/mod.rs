//! Errors raised while supervising the test driver and its message channel.
//!
//! I/O errors are wrapped in `Arc` to satisfy the `result_large_err` Clippy
//! lint and to keep the enum cheap to move through the run loop.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Errors arising from driver process and channel operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver executable does not exist.
    #[error("test driver '{program}' not found")]
    BinaryNotFound {
        /// Program that was looked up.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The driver process could not be started.
    #[error("failed to start test driver '{program}': {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// An I/O error occurred while talking to or supervising the driver.
    #[error("I/O error while trying to {operation}: {source}")]
    Io {
        /// Short description of the failed step.
        operation: &'static str,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// A message grew past the configured size limit.
    #[error("driver message too large: {size} bytes exceeds {max_size} byte limit")]
    MessageTooLarge {
        /// Bytes buffered for the offending message.
        size: usize,
        /// Configured limit.
        max_size: usize,
    },

    /// The driver wrote a frame that is not a valid message.
    #[error("malformed driver message: {message}")]
    MalformedMessage {
        /// Human-readable description of the parse failure.
        message: String,
        /// Underlying JSON error, when the frame was not valid JSON.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// A message could not be serialised for the driver.
    #[error("failed to serialise driver message: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The driver was already reaped; its stream must not be used again.
    #[error("test driver has already been reaped")]
    ProcessReaped,
}

impl DriverError {
    /// Wraps an I/O error with the step that produced it.
    #[must_use]
    pub fn io(operation: &'static str, source: io::Error) -> Self {
        Self::Io {
            operation,
            source: Arc::new(source),
        }
    }

    /// Creates a malformed message error from a JSON error.
    #[must_use]
    pub fn malformed(source: serde_json::Error) -> Self {
        Self::MalformedMessage {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Returns `true` when the error reflects bad output from the driver
    /// rather than a local fault.
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::MalformedMessage { .. } | Self::MessageTooLarge { .. }
        )
    }
}

#[cfg(test)]
mod tests;
