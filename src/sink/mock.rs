//! Recording sink and scripted input for tests without a loopback device.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Instant;

use tokio::io::{AsyncRead, ReadBuf};

use super::{CameraSink, SinkError};

/// Everything a [`MockSink`] was asked to do
#[derive(Debug, Default)]
pub struct SinkRecord {
    pub frames: Vec<Vec<u8>>,
    pub paces: usize,
    pub closes: usize,
}

/// Sink that records calls and fails on request.
pub struct MockSink {
    record: Rc<RefCell<SinkRecord>>,
    send_failures: VecDeque<SinkError>,
    pace_failures: VecDeque<SinkError>,
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            record: Rc::default(),
            send_failures: VecDeque::new(),
            pace_failures: VecDeque::new(),
        }
    }

    /// Shared view of the calls, still readable after the sink is dropped.
    pub fn record(&self) -> Rc<RefCell<SinkRecord>> {
        Rc::clone(&self.record)
    }

    /// Fail the next `send` calls with these errors, in order.
    #[must_use]
    pub fn failing_sends(mut self, errors: impl IntoIterator<Item = SinkError>) -> Self {
        self.send_failures.extend(errors);
        self
    }

    /// Fail the next `pace` calls with these errors, in order.
    #[must_use]
    pub fn failing_paces(mut self, errors: impl IntoIterator<Item = SinkError>) -> Self {
        self.pace_failures.extend(errors);
        self
    }
}

impl CameraSink for MockSink {
    fn device(&self) -> &str {
        "Mock Camera"
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        if let Some(err) = self.send_failures.pop_front() {
            return Err(err);
        }
        self.record.borrow_mut().frames.push(frame.to_vec());
        Ok(())
    }

    fn pace(&mut self) -> Result<Instant, SinkError> {
        self.record.borrow_mut().paces += 1;
        match self.pace_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(Instant::now()),
        }
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.record.borrow_mut().closes += 1;
        Ok(())
    }
}

enum Step {
    Data(Vec<u8>),
    Eof,
    Fail(io::ErrorKind),
}

/// Input stream that replays a fixed sequence of reads.
///
/// Each chunk is delivered by as many reads as the caller's buffer needs.
/// An empty chunk yields one zero-length read, which lets tests model a
/// stream that reports end of data and then carries on.
pub struct ScriptedInput {
    steps: VecDeque<Step>,
}

impl ScriptedInput {
    pub fn new(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            steps: chunks
                .into_iter()
                .map(|chunk| if chunk.is_empty() { Step::Eof } else { Step::Data(chunk) })
                .collect(),
        }
    }

    pub fn failing(kind: io::ErrorKind) -> Self {
        Self {
            steps: VecDeque::from([Step::Fail(kind)]),
        }
    }
}

impl AsyncRead for ScriptedInput {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.steps.pop_front() {
            None | Some(Step::Eof) => Poll::Ready(Ok(())),
            Some(Step::Fail(kind)) => Poll::Ready(Err(kind.into())),
            Some(Step::Data(mut chunk)) => {
                let n = chunk.len().min(buf.remaining());
                buf.put_slice(&chunk[..n]);
                if n < chunk.len() {
                    let rest = chunk.split_off(n);
                    self.steps.push_front(Step::Data(rest));
                }
                Poll::Ready(Ok(()))
            }
        }
    }
}
