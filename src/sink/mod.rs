//! Virtual camera sinks
//!
//! A sink accepts converted frames one at a time and tells the relay when
//! the next one is due. The v4l2loopback backend is the production sink.

pub mod pacer;
pub mod v4l2;

#[cfg(test)]
pub mod mock;

use std::io;
use std::path::PathBuf;
use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn};

pub use pacer::FramePacer;
pub use v4l2::V4l2LoopbackSink;

/// Virtual camera sink errors
#[derive(Debug, Error)]
pub enum SinkError {
    /// No loopback device configured and none found
    #[error("No v4l2loopback device found (is the v4l2loopback module loaded?)")]
    NoDevice,

    #[error("Device not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Permission denied for {}, try adding user to 'video' group", .0.display())]
    PermissionDenied(PathBuf),

    /// Device exists but cannot accept output frames
    #[error("{} is not a video output device", .0.display())]
    NotAnOutput(PathBuf),

    /// Driver did not accept the requested format
    #[error("Device rejected format: {0}")]
    FormatRejected(String),

    #[error("Frame is {actual} bytes, device expects {expected}")]
    FrameSize { actual: usize, expected: usize },

    #[error("Sink is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SinkError {
    /// Errors after which the sink can never accept another frame.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::Io(err) => {
                err.kind() == io::ErrorKind::BrokenPipe
                    || matches!(
                        err.raw_os_error(),
                        Some(code) if code == ENODEV || code == ENXIO || code == EBADF
                    )
            }
            _ => false,
        }
    }
}

const EBADF: i32 = 9;
const ENXIO: i32 = 6;
const ENODEV: i32 = 19;

/// An open virtual camera device
pub trait CameraSink {
    /// Human-readable device description
    fn device(&self) -> &str;

    /// Submit one frame in the layout declared when the sink was opened.
    fn send(&mut self, frame: &[u8]) -> Result<(), SinkError>;

    /// Point in time at which the next frame should be sent.
    fn pace(&mut self) -> Result<Instant, SinkError>;

    /// Release the device. Called exactly once through [`SinkGuard`].
    fn close(&mut self) -> Result<(), SinkError>;
}

/// Owns a sink and releases it exactly once, whichever way the relay ends.
pub struct SinkGuard<S: CameraSink> {
    sink: S,
    closed: bool,
}

impl<S: CameraSink> SinkGuard<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            closed: false,
        }
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Close now and report the result. Later calls are no-ops.
    pub fn close(&mut self) -> Result<(), SinkError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        info!("Closing virtual camera: {}", self.sink.device());
        self.sink.close()
    }
}

impl<S: CameraSink> Drop for SinkGuard<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close virtual camera: {}", e);
        }
    }
}
