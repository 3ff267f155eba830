//! Start-up handshake with the launching process.
//!
//! The launcher waits for a single line on stdout: `READY` once the virtual
//! camera is open, or `ERROR` if start-up failed. Nothing else is ever
//! written there.

use std::io::{self, Write};

use thiserror::Error;
use tracing::debug;

/// Lifecycle state reported to the launcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Pending,
    Ready,
    Failed,
}

impl Readiness {
    /// Sentinel line for a terminal state
    pub const fn token(self) -> Option<&'static str> {
        match self {
            Self::Pending => None,
            Self::Ready => Some("READY"),
            Self::Failed => Some("ERROR"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("Readiness already signalled as {0:?}")]
    AlreadySignalled(Readiness),

    #[error("Failed to write readiness token: {0}")]
    Io(#[from] io::Error),
}

/// Emits exactly one readiness token and flushes it immediately.
pub struct ReadinessSignal<W: Write> {
    out: W,
    state: Readiness,
}

impl ReadinessSignal<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ReadinessSignal<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            state: Readiness::Pending,
        }
    }

    pub fn state(&self) -> Readiness {
        self.state
    }

    pub fn ready(&mut self) -> Result<(), ReadinessError> {
        self.emit(Readiness::Ready)
    }

    pub fn failed(&mut self) -> Result<(), ReadinessError> {
        self.emit(Readiness::Failed)
    }

    fn emit(&mut self, next: Readiness) -> Result<(), ReadinessError> {
        if self.state != Readiness::Pending {
            return Err(ReadinessError::AlreadySignalled(self.state));
        }
        // Terminal even if the write fails; the launcher will time out instead
        self.state = next;

        if let Some(token) = next.token() {
            debug!(token, "signalling launcher");
            writeln!(self.out, "{token}")?;
            self.out.flush()?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
