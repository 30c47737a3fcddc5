//! Byte link — a buffered, timed view over any ordered byte source/sink.
//!
//! The transport never busy-waits on "bytes available": every read is a
//! timed read against the underlying `AsyncRead`, and bytes that arrive
//! early stay buffered until the protocol asks for them.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::time::Instant;

use payload_core::wire::PACKET_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("no data within {0:?}")]
    Timeout(Duration),

    #[error("link closed by peer")]
    Closed,

    #[error("link i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Owns both directions of the physical link plus an input buffer.
pub struct Link<R, W> {
    reader: R,
    writer: W,
    input: BytesMut,
}

impl<S> Link<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite,
{
    /// Split a bidirectional stream (serial device, duplex pipe, socket).
    pub fn from_stream(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer)
    }
}

impl<R, W> Link<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            input: BytesMut::with_capacity(PACKET_SIZE * 4),
        }
    }

    /// Write a whole frame and flush it to the device.
    pub async fn write_frame(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        self.writer.write_all(frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn fill(&mut self) -> Result<usize, LinkError> {
        self.input.reserve(PACKET_SIZE);
        let n = self.reader.read_buf(&mut self.input).await?;
        if n == 0 {
            return Err(LinkError::Closed);
        }
        Ok(n)
    }

    /// Read exactly `n` bytes, waiting at most `timeout` in total.
    ///
    /// On timeout the partial bytes stay buffered; callers that want a clean
    /// frame boundary call [`Link::clear_input`].
    pub async fn read_exact_timeout(
        &mut self,
        n: usize,
        timeout: Duration,
    ) -> Result<Bytes, LinkError> {
        let deadline = Instant::now() + timeout;
        while self.input.len() < n {
            match tokio::time::timeout_at(deadline, self.fill()).await {
                Ok(result) => {
                    result?;
                }
                Err(_) => return Err(LinkError::Timeout(timeout)),
            }
        }
        Ok(self.input.split_to(n).freeze())
    }

    /// Number of buffered input bytes, waiting up to `wait` for the first
    /// byte when the buffer is empty. A zero `wait` polls the device once.
    pub async fn bytes_available(&mut self, wait: Duration) -> Result<usize, LinkError> {
        if self.input.is_empty() {
            if let Ok(result) = tokio::time::timeout(wait, self.fill()).await {
                result?;
            }
        }
        Ok(self.input.len())
    }

    /// Drop everything buffered so far. Returns how many bytes were dropped.
    pub fn clear_input(&mut self) -> usize {
        let dropped = self.input.len();
        self.input.clear();
        dropped
    }
}
