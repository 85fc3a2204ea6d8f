//! # batchwire-protocol
//!
//! Wire protocol implementation for batchwire.
//!
//! This crate provides:
//! - Length-prefixed framing with a 4-digit ASCII decimal header
//! - Batch message bodies (cardinality line, final marker, `/`-joined records)
//! - Error types for framing and message handling

pub mod error;
pub mod frame;
pub mod message;

pub use error::{FrameError, MessageError};
pub use frame::{decode_header, encode_header, Frame, HEADER_LEN};
pub use message::{decode_batch, encode_batch, BatchHeader, Record, FIELD_SEPARATOR, FINAL_MARKER};

/// Largest payload a 4-digit header can describe.
pub const MAX_PAYLOAD_SIZE: usize = 9999;

/// Default server port used by the original deployment.
pub const DEFAULT_PORT: u16 = 12345;
