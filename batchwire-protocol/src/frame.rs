//! Length-prefixed frame format.
//!
//! Every message on the wire is a fixed 4-byte header followed by the body:
//!
//! ```text
//! +----------------------+---------------------+
//! | length (ASCII digits)| payload             |
//! | 4 bytes, zero-padded | `length` bytes      |
//! +----------------------+---------------------+
//! ```
//!
//! The header is the decimal byte length of the payload, left-padded with
//! `'0'`, so payloads are limited to 9999 bytes.

use crate::error::FrameError;
use crate::MAX_PAYLOAD_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the frame header in bytes.
pub const HEADER_LEN: usize = 4;

/// Encodes a payload length as a 4-digit zero-padded ASCII header.
pub fn encode_header(len: usize) -> Result<[u8; HEADER_LEN], FrameError> {
    if len > MAX_PAYLOAD_SIZE {
        return Err(FrameError::LengthOverflow {
            len,
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let mut header = [b'0'; HEADER_LEN];
    let mut rest = len;
    for digit in header.iter_mut().rev() {
        *digit = b'0' + (rest % 10) as u8;
        rest /= 10;
    }
    Ok(header)
}

/// Decodes a 4-digit ASCII header into a payload length.
pub fn decode_header(header: &[u8]) -> Result<usize, FrameError> {
    if header.len() != HEADER_LEN || !header.iter().all(u8::is_ascii_digit) {
        return Err(FrameError::MalformedHeader(header.to_vec()));
    }

    Ok(header
        .iter()
        .fold(0, |acc, digit| acc * 10 + usize::from(digit - b'0')))
}

/// A single framed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame payload.
    pub payload: Bytes,
}

impl Frame {
    /// Creates a new frame with the given payload.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Returns the payload length.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Encodes the frame into header || payload.
    pub fn encode(&self) -> Result<BytesMut, FrameError> {
        let header = encode_header(self.payload.len())?;
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_slice(&header);
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes a frame from bytes.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on a malformed header.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, FrameError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let payload_len = decode_header(&buf[..HEADER_LEN])?;
        if buf.len() < HEADER_LEN + payload_len {
            return Ok(None);
        }

        buf.advance(HEADER_LEN);
        let payload = buf.split_to(payload_len).freeze();

        Ok(Some(Self { payload }))
    }
}
