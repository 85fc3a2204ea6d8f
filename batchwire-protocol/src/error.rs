//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding or decoding frame headers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("payload length {len} does not fit in the frame header (max {max})")]
    LengthOverflow { len: usize, max: usize },

    #[error("malformed frame header: {0:?}")]
    MalformedHeader(Vec<u8>),
}

/// Errors raised while building or parsing a batch message body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("batch must contain at least one record")]
    EmptyBatch,

    #[error("record {record} field {field} contains a reserved character: {value:?}")]
    InvalidField {
        record: usize,
        field: usize,
        value: String,
    },

    #[error("malformed cardinality line: {0:?}")]
    MalformedCount(String),

    #[error("cardinality mismatch: header says {declared}, body has {actual}")]
    CountMismatch { declared: usize, actual: usize },

    #[error("invalid UTF-8 in message body")]
    InvalidUtf8,
}
