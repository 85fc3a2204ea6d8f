//! Client error types.

use batchwire_protocol::{FrameError, MessageError};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by a record source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error reading records: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid record at line {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },
}

/// Client errors.
///
/// Every variant is terminal for the run that produced it.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("message error: {0}")]
    Message(#[from] MessageError),

    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("write stalled: stream accepted 0 bytes")]
    StalledWrite,

    #[error("read failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("connection closed after {received} of {expected} bytes")]
    ConnectionClosed { expected: usize, received: usize },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("record source error: {0}")]
    Source(#[from] SourceError),

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("cancelled")]
    Cancelled,
}

/// The step of a run in which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Source,
    Send,
    Receive,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Connect => write!(f, "connect"),
            Phase::Source => write!(f, "source"),
            Phase::Send => write!(f, "send"),
            Phase::Receive => write!(f, "receive"),
        }
    }
}

/// A terminal run error with the phase and batch it happened in.
#[derive(Debug)]
pub struct RunError {
    pub phase: Phase,
    /// Zero-based index of the batch being processed, if any.
    pub batch: Option<usize>,
    pub error: ClientError,
}

impl RunError {
    pub fn new(phase: Phase, batch: Option<usize>, error: ClientError) -> Self {
        Self {
            phase,
            batch,
            error,
        }
    }

    pub fn cancelled(phase: Phase, batch: Option<usize>) -> Self {
        Self::new(phase, batch, ClientError::Cancelled)
    }

    /// Returns whether the run stopped because of the cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, ClientError::Cancelled)
    }

    /// Returns whether the run stopped waiting for an acknowledgment.
    pub fn is_timeout(&self) -> bool {
        matches!(self.error, ClientError::Timeout(_))
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.batch {
            Some(batch) => write!(f, "{} failed at batch {}: {}", self.phase, batch, self.error),
            None => write!(f, "{} failed: {}", self.phase, self.error),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
