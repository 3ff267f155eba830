//! Frame pump: read -> convert -> send -> pace, one frame at a time.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::time::Instant;

use tokio::io::AsyncRead;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{FrameError, FrameErrorKind, IngestError};
use crate::ingest::{rgba_to_bgr, FrameReader, ReadOutcome};
use crate::sink::CameraSink;
use crate::SessionParams;

/// Relay loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    AwaitingFrame,
    Processing,
    Closed,
    /// The sink never opened, so the loop never ran
    Failed,
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Producer closed its end of the stream
    StreamClosed,
    /// Shutdown was requested from outside
    Interrupted,
    /// No frame arrived within the read timeout
    InputStalled,
    /// Reading the input failed with a non-retryable error
    InputFailed,
    /// The sink reported an error it cannot recover from
    SinkLost,
}

impl LoopExit {
    /// Every exit from a running loop is a shutdown; only a failed sink open is `Failed`.
    pub fn state(self) -> RelayState {
        RelayState::Closed
    }

    /// Process exit status for this outcome. Non-zero is reserved for start-up failures.
    pub fn exit_code(self) -> i32 {
        0
    }
}

/// Counters for one relay run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub frames_received: u64,
    pub frames_sent: u64,
    pub errors: HashMap<FrameErrorKind, u64>,
}

impl RelayStats {
    pub fn errors_of(&self, kind: FrameErrorKind) -> u64 {
        self.errors.get(&kind).copied().unwrap_or(0)
    }

    fn record(&mut self, err: &FrameError) {
        let kind = err.kind();
        *self.errors.entry(kind).or_default() += 1;
        metrics::counter!("relay_frame_errors", "kind" => kind.as_str()).increment(1);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub exit: LoopExit,
    pub stats: RelayStats,
}

/// Relays fixed-size RGBA frames from a byte stream into a [`CameraSink`].
pub struct FrameRelay {
    reader: FrameReader,
    output: Vec<u8>,
    state: RelayState,
    stats: RelayStats,
}

impl FrameRelay {
    pub fn new(params: &SessionParams) -> Self {
        Self {
            reader: FrameReader::new(params.geometry.rgba_len()),
            output: vec![0; params.geometry.len_for(params.output_format)],
            state: RelayState::AwaitingFrame,
            stats: RelayStats::default(),
        }
    }

    /// Bound each frame read. `None` waits forever.
    pub fn with_read_timeout(mut self, timeout: Option<std::time::Duration>) -> Self {
        self.reader = self.reader.with_timeout(timeout);
        self
    }

    /// Pump frames until the input ends, `shutdown` resolves, or the sink is lost.
    ///
    /// `shutdown` is raced against both blocking points, the frame read and
    /// the pacing wait, so an interruption never waits for a slow producer.
    #[instrument(skip_all)]
    pub async fn run<R, S, F>(mut self, input: &mut R, sink: &mut S, shutdown: F) -> RelayReport
    where
        R: AsyncRead + Unpin + ?Sized,
        S: CameraSink + ?Sized,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let exit = loop {
            self.transition(RelayState::AwaitingFrame);

            let outcome = tokio::select! {
                biased;
                _ = &mut shutdown => None,
                outcome = self.reader.read_frame(input) => Some(outcome),
            };
            let Some(outcome) = outcome else {
                break self.interrupted();
            };

            match outcome {
                Ok(ReadOutcome::Frame) => {}
                Ok(ReadOutcome::EndOfStream) => {
                    info!("Input stream closed");
                    break LoopExit::StreamClosed;
                }
                Ok(ReadOutcome::Short(actual)) => {
                    self.skip(FrameError::ShortRead {
                        actual,
                        expected: self.reader.frame_size(),
                    });
                    continue;
                }
                Err(IngestError::TimedOut(limit)) => {
                    warn!("No frame received within {:?}, giving up on producer", limit);
                    break LoopExit::InputStalled;
                }
                Err(IngestError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    info!("Input stream closed");
                    break LoopExit::StreamClosed;
                }
                Err(IngestError::Io(e)) => {
                    error!("Input read failed: {}", e);
                    break LoopExit::InputFailed;
                }
            }

            self.transition(RelayState::Processing);
            self.stats.frames_received += 1;

            let convert_start = Instant::now();
            rgba_to_bgr(self.reader.frame(), &mut self.output);
            metrics::histogram!("relay_convert_time_us")
                .record(convert_start.elapsed().as_micros() as f64);

            if let Err(e) = sink.send(&self.output) {
                if e.is_fatal() {
                    error!("Virtual camera lost: {}", e);
                    break LoopExit::SinkLost;
                }
                self.skip(FrameError::SinkSendFailed(e));
                continue;
            }
            self.stats.frames_sent += 1;
            metrics::counter!("relay_frames_sent").increment(1);

            let deadline = match sink.pace() {
                Ok(deadline) => deadline,
                Err(e) if e.is_fatal() => {
                    error!("Virtual camera lost: {}", e);
                    break LoopExit::SinkLost;
                }
                Err(e) => {
                    self.skip(FrameError::SinkPaceFailed(e));
                    continue;
                }
            };

            let interrupted = tokio::select! {
                biased;
                _ = &mut shutdown => true,
                _ = tokio::time::sleep_until(deadline.into()) => false,
            };
            if interrupted {
                break self.interrupted();
            }
        };

        self.transition(exit.state());
        info!(
            "Relay stopped ({:?}): {} frames received, {} sent",
            exit, self.stats.frames_received, self.stats.frames_sent
        );

        RelayReport {
            exit,
            stats: self.stats,
        }
    }

    fn transition(&mut self, next: RelayState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "relay state");
            self.state = next;
        }
    }

    /// Log and count a per-frame failure; the caller moves on to the next frame.
    fn skip(&mut self, err: FrameError) {
        warn!("{}", err);
        self.stats.record(&err);
    }

    fn interrupted(&mut self) -> LoopExit {
        let err = FrameError::Interrupted;
        info!("{}", err);
        self.stats.record(&err);
        LoopExit::Interrupted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::FrameGeometry;
    use crate::sink::mock::{MockSink, ScriptedInput};
    use crate::sink::SinkError;
    use crate::Config;
    use std::future::pending;
    use std::time::Duration;

    const WIDTH: u32 = 4;
    const HEIGHT: u32 = 2;

    fn params() -> SessionParams {
        let mut config = Config::default();
        config.session.width = WIDTH;
        config.session.height = HEIGHT;
        SessionParams::resolve(&config).unwrap()
    }

    fn frame_size() -> usize {
        FrameGeometry::new(WIDTH, HEIGHT).unwrap().rgba_len()
    }

    /// Solid RGBA frame whose red channel carries `tag`
    fn rgba_frame(tag: u8) -> Vec<u8> {
        [tag, 20, 30, 255].repeat(frame_size() / 4)
    }

    fn bgr_frame(tag: u8) -> Vec<u8> {
        [30, 20, tag].repeat(frame_size() / 4)
    }

    #[tokio::test]
    async fn test_frames_forwarded_in_order() {
        let input: Vec<u8> = (1..=5).flat_map(rgba_frame).collect();
        let mut sink = MockSink::new();
        let record = sink.record();

        let report = FrameRelay::new(&params())
            .run(&mut &input[..], &mut sink, pending())
            .await;

        assert_eq!(report.exit, LoopExit::StreamClosed);
        assert_eq!(report.exit.exit_code(), 0);
        assert_eq!(report.stats.frames_received, 5);
        assert_eq!(report.stats.frames_sent, 5);

        let record = record.borrow();
        let expected: Vec<Vec<u8>> = (1..=5).map(bgr_frame).collect();
        assert_eq!(record.frames, expected);
        assert_eq!(record.paces, 5);
    }

    #[tokio::test]
    async fn test_output_size() {
        let input = rgba_frame(10);
        let mut sink = MockSink::new();
        let record = sink.record();

        FrameRelay::new(&params())
            .run(&mut &input[..], &mut sink, pending())
            .await;

        assert_eq!(record.borrow().frames[0].len(), (WIDTH * HEIGHT * 3) as usize);
    }

    #[tokio::test]
    async fn test_short_read_is_not_sent() {
        let mut partial = rgba_frame(1);
        partial.pop();
        // Short chunk, end-of-data marker, then the producer carries on
        let mut input = ScriptedInput::new([partial, Vec::new(), rgba_frame(2)]);
        let mut sink = MockSink::new();
        let record = sink.record();

        let report = FrameRelay::new(&params())
            .run(&mut input, &mut sink, pending())
            .await;

        assert_eq!(report.exit, LoopExit::StreamClosed);
        assert_eq!(report.stats.errors_of(FrameErrorKind::ShortRead), 1);
        assert_eq!(report.stats.frames_sent, 1);
        assert_eq!(record.borrow().frames, vec![bgr_frame(2)]);
    }

    #[tokio::test]
    async fn test_empty_stream_closes() {
        let mut sink = MockSink::new();
        let record = sink.record();

        let report = FrameRelay::new(&params())
            .run(&mut tokio::io::empty(), &mut sink, pending())
            .await;

        assert_eq!(report.exit, LoopExit::StreamClosed);
        assert_eq!(report.stats.frames_received, 0);
        assert!(record.borrow().frames.is_empty());
        // Closing belongs to the owner, not the loop
        assert_eq!(record.borrow().closes, 0);
    }

    #[tokio::test]
    async fn test_send_failure_skips_frame() {
        let input: Vec<u8> = (1..=3).flat_map(rgba_frame).collect();
        let mut sink =
            MockSink::new().failing_sends([SinkError::Io(io::ErrorKind::WouldBlock.into())]);
        let record = sink.record();

        let report = FrameRelay::new(&params())
            .run(&mut &input[..], &mut sink, pending())
            .await;

        assert_eq!(report.exit, LoopExit::StreamClosed);
        assert_eq!(report.stats.errors_of(FrameErrorKind::SinkSendFailed), 1);
        assert_eq!(report.stats.frames_received, 3);
        assert_eq!(report.stats.frames_sent, 2);
        assert_eq!(record.borrow().frames, vec![bgr_frame(2), bgr_frame(3)]);
    }

    #[tokio::test]
    async fn test_pace_failure_continues() {
        let input: Vec<u8> = (1..=2).flat_map(rgba_frame).collect();
        let mut sink =
            MockSink::new().failing_paces([SinkError::Io(io::ErrorKind::TimedOut.into())]);
        let record = sink.record();

        let report = FrameRelay::new(&params())
            .run(&mut &input[..], &mut sink, pending())
            .await;

        assert_eq!(report.stats.errors_of(FrameErrorKind::SinkPaceFailed), 1);
        assert_eq!(report.stats.frames_sent, 2);
        assert_eq!(record.borrow().paces, 2);
    }

    #[tokio::test]
    async fn test_fatal_sink_error_stops_relay() {
        let input: Vec<u8> = (1..=3).flat_map(rgba_frame).collect();
        let mut sink = MockSink::new().failing_sends([SinkError::Closed]);
        let record = sink.record();

        let report = FrameRelay::new(&params())
            .run(&mut &input[..], &mut sink, pending())
            .await;

        assert_eq!(report.exit, LoopExit::SinkLost);
        assert_eq!(report.exit.state(), RelayState::Closed);
        assert_eq!(report.exit.exit_code(), 0);
        assert!(record.borrow().frames.is_empty());
    }

    #[tokio::test]
    async fn test_device_gone_is_clean_shutdown() {
        let input: Vec<u8> = (1..=2).flat_map(rgba_frame).collect();
        let mut sink =
            MockSink::new().failing_sends([SinkError::Io(io::Error::from_raw_os_error(19))]);

        let report = FrameRelay::new(&params())
            .run(&mut &input[..], &mut sink, pending())
            .await;

        assert_eq!(report.exit, LoopExit::SinkLost);
        assert_eq!(report.exit.exit_code(), 0);
        assert_eq!(report.stats.frames_sent, 0);
    }

    #[tokio::test]
    async fn test_interrupt_while_waiting_for_input() {
        // Producer never writes and never closes
        let (_producer, mut consumer) = tokio::io::duplex(64);
        let mut sink = MockSink::new();

        let report = FrameRelay::new(&params())
            .run(&mut consumer, &mut sink, tokio::time::sleep(Duration::from_millis(10)))
            .await;

        assert_eq!(report.exit, LoopExit::Interrupted);
        assert_eq!(report.exit.exit_code(), 0);
        assert_eq!(report.stats.errors_of(FrameErrorKind::Interrupted), 1);
    }

    #[tokio::test]
    async fn test_interrupt_from_channel() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let (_producer, mut consumer) = tokio::io::duplex(64);
        let mut sink = MockSink::new();
        tx.send(()).unwrap();

        let report = FrameRelay::new(&params())
            .run(&mut consumer, &mut sink, async {
                rx.await.ok();
            })
            .await;

        assert_eq!(report.exit, LoopExit::Interrupted);
    }

    #[tokio::test]
    async fn test_read_timeout_stops_relay() {
        let (_producer, mut consumer) = tokio::io::duplex(64);
        let mut sink = MockSink::new();

        let report = FrameRelay::new(&params())
            .with_read_timeout(Some(Duration::from_millis(10)))
            .run(&mut consumer, &mut sink, pending())
            .await;

        assert_eq!(report.exit, LoopExit::InputStalled);
        assert_eq!(report.exit.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_input_error_stops_relay() {
        let mut input = ScriptedInput::failing(io::ErrorKind::ConnectionReset);
        let mut sink = MockSink::new();

        let report = FrameRelay::new(&params())
            .run(&mut input, &mut sink, pending())
            .await;

        assert_eq!(report.exit, LoopExit::InputFailed);
        assert_eq!(report.exit.state(), RelayState::Closed);
        assert_eq!(report.exit.exit_code(), 0);
    }
}
