//! Error types for vcam-relay

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::sink::SinkError;

/// Configuration and parameter resolution errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Layered configuration could not be built or deserialized
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A dimension or rate of zero
    #[error("{field} must be a positive integer")]
    NonPositive { field: &'static str },

    /// Frame buffer size does not fit in memory
    #[error("Frame of {width}x{height} is too large")]
    FrameTooLarge { width: u32, height: u32 },
}

/// Errors reading frames from the input stream
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Input read failed: {0}")]
    Io(#[from] io::Error),

    /// No complete frame arrived within the configured read timeout
    #[error("No frame received within {0:?}")]
    TimedOut(Duration),
}

/// Per-frame failures. None of these stop the relay on their own.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Invalid frame size: {actual} != {expected}")]
    ShortRead { actual: usize, expected: usize },

    #[error("Failed to send frame: {0}")]
    SinkSendFailed(#[source] SinkError),

    #[error("Failed to pace frame: {0}")]
    SinkPaceFailed(#[source] SinkError),

    #[error("Interrupted")]
    Interrupted,
}

/// Closed classification of [`FrameError`], used for counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameErrorKind {
    ShortRead,
    SinkSendFailed,
    SinkPaceFailed,
    Interrupted,
}

impl FrameError {
    pub fn kind(&self) -> FrameErrorKind {
        match self {
            Self::ShortRead { .. } => FrameErrorKind::ShortRead,
            Self::SinkSendFailed(_) => FrameErrorKind::SinkSendFailed,
            Self::SinkPaceFailed(_) => FrameErrorKind::SinkPaceFailed,
            Self::Interrupted => FrameErrorKind::Interrupted,
        }
    }
}

impl FrameErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShortRead => "short_read",
            Self::SinkSendFailed => "sink_send_failed",
            Self::SinkPaceFailed => "sink_pace_failed",
            Self::Interrupted => "interrupted",
        }
    }
}

/// Failures before the relay loop starts. These end the process non-zero.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to start virtual camera: {0}")]
    SinkOpen(#[source] SinkError),
}
