//! Fixed-size frame reads from the producer's byte stream

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::error::IngestError;

/// Result of one attempt to read a whole frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A full frame is available through [`FrameReader::frame`]
    Frame,
    /// The stream ended after this many bytes, short of a full frame
    Short(usize),
    /// The stream ended before any byte of this frame
    EndOfStream,
}

/// Reads `frame_size` byte chunks into one reusable buffer.
pub struct FrameReader {
    buffer: Vec<u8>,
    timeout: Option<Duration>,
}

impl FrameReader {
    pub fn new(frame_size: usize) -> Self {
        Self {
            buffer: vec![0; frame_size],
            timeout: None,
        }
    }

    /// Bound the wait for a whole frame. `None` blocks indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn frame_size(&self) -> usize {
        self.buffer.len()
    }

    /// The last complete frame. Only meaningful after [`ReadOutcome::Frame`].
    pub fn frame(&self) -> &[u8] {
        &self.buffer
    }

    /// Block until a full frame, the end of the stream, or an error.
    pub async fn read_frame<R>(&mut self, input: &mut R) -> Result<ReadOutcome, IngestError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let filled = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fill(input, &mut self.buffer))
                .await
                .map_err(|_| IngestError::TimedOut(limit))??,
            None => fill(input, &mut self.buffer).await?,
        };

        trace!(filled, expected = self.buffer.len(), "read attempt finished");

        Ok(match filled {
            0 => ReadOutcome::EndOfStream,
            n if n < self.buffer.len() => ReadOutcome::Short(n),
            _ => ReadOutcome::Frame,
        })
    }
}

/// Read until `buf` is full or the stream reports end of data.
async fn fill<R>(input: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
