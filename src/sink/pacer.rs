//! Fixed frame-rate scheduling

use std::time::{Duration, Instant};

use tracing::debug;

/// Hands out evenly spaced send deadlines.
///
/// Each call to [`FramePacer::next_deadline`] advances the schedule by one
/// period. A loop that falls more than a period behind is resynced to the
/// current time instead of bursting to catch up.
#[derive(Debug, Clone)]
pub struct FramePacer {
    period: Duration,
    next: Option<Instant>,
}

impl FramePacer {
    /// `fps` must be non-zero.
    pub fn new(fps: u32) -> Self {
        Self {
            period: Duration::from_secs(1) / fps.max(1),
            next: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Deadline for the frame after the one just sent at `now`.
    pub fn next_deadline(&mut self, now: Instant) -> Instant {
        let deadline = match self.next {
            None => now + self.period,
            Some(previous) => {
                let scheduled = previous + self.period;
                if scheduled + self.period < now {
                    debug!(
                        behind_ms = (now - scheduled).as_millis() as u64,
                        "pacer fell behind, resyncing"
                    );
                    now
                } else {
                    scheduled
                }
            }
        };
        self.next = Some(deadline);
        deadline
    }
}
