//! Reliable framed channel.
//!
//! Wraps a byte stream so that every call moves exactly one whole frame or
//! fails. Short writes and short reads are looped over internally; a caller
//! never observes a partially transferred frame.

use crate::error::ClientError;
use batchwire_protocol::{decode_header, Frame, HEADER_LEN};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// A framed channel over an exclusively owned duplex stream.
#[derive(Debug)]
pub struct ReliableChannel<S> {
    stream: S,
}

impl<S> ReliableChannel<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: AsyncWrite + Unpin> ReliableChannel<S> {
    /// Sends `payload` as one frame.
    ///
    /// Oversized payloads fail before anything is written.
    pub async fn send_framed(&mut self, payload: &[u8]) -> Result<(), ClientError> {
        let encoded = Frame::new(Bytes::copy_from_slice(payload)).encode()?;
        self.write_complete(&encoded).await?;
        self.stream.flush().await.map_err(ClientError::WriteFailed)?;
        tracing::trace!("Sent frame ({} payload bytes)", payload.len());
        Ok(())
    }

    /// Shuts down the write side of the stream.
    pub async fn shutdown(&mut self) -> Result<(), ClientError> {
        self.stream
            .shutdown()
            .await
            .map_err(ClientError::WriteFailed)
    }

    async fn write_complete(&mut self, buf: &[u8]) -> Result<(), ClientError> {
        let mut written = 0;
        while written < buf.len() {
            let n = self
                .stream
                .write(&buf[written..])
                .await
                .map_err(ClientError::WriteFailed)?;
            if n == 0 {
                return Err(ClientError::StalledWrite);
            }
            written += n;
            if written < buf.len() {
                tracing::trace!("Short write: {} of {} bytes", written, buf.len());
            }
        }
        Ok(())
    }
}

impl<S: AsyncRead + Unpin> ReliableChannel<S> {
    /// Receives exactly one frame and returns its payload.
    pub async fn receive_framed(&mut self) -> Result<Bytes, ClientError> {
        let mut header = [0u8; HEADER_LEN];
        self.read_complete(&mut header).await?;
        let len = decode_header(&header)?;

        let mut payload = vec![0u8; len];
        self.read_complete(&mut payload).await?;
        tracing::trace!("Received frame ({} payload bytes)", len);
        Ok(Bytes::from(payload))
    }

    async fn read_complete(&mut self, buf: &mut [u8]) -> Result<(), ClientError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self
                .stream
                .read(&mut buf[filled..])
                .await
                .map_err(ClientError::ReadFailed)?;
            if n == 0 {
                return Err(ClientError::ConnectionClosed {
                    expected: buf.len(),
                    received: filled,
                });
            }
            filled += n;
        }
        Ok(())
    }
}
