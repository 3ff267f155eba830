//! One relay session: open the sink, signal the launcher, pump, release.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use tokio::io::AsyncRead;
use tracing::{error, info, warn};

use super::readiness::ReadinessSignal;
use super::relay::{FrameRelay, RelayReport, RelayState};
use crate::error::StartupError;
use crate::sink::{CameraSink, SinkError, SinkGuard};
use crate::{RelayConfig, SessionParams};

/// Run a full session against the sink produced by `open`.
///
/// Sink-open failures are reported as `ERROR` and returned; the relay never
/// starts. Otherwise `READY` is signalled, frames are relayed until the loop
/// ends, and the sink is closed exactly once before returning.
pub async fn run_session<S, O, R, W, F>(
    params: &SessionParams,
    relay: &RelayConfig,
    open: O,
    input: &mut R,
    signal: &mut ReadinessSignal<W>,
    shutdown: F,
) -> Result<RelayReport, StartupError>
where
    S: CameraSink,
    O: FnOnce(&SessionParams) -> Result<S, SinkError>,
    R: AsyncRead + Unpin + ?Sized,
    W: Write,
    F: Future<Output = ()>,
{
    info!(
        "Starting virtual camera: {}x{}@{}fps",
        params.geometry.width, params.geometry.height, params.fps
    );

    let sink = match open(params) {
        Ok(sink) => sink,
        Err(e) => {
            error!(state = ?RelayState::Failed, "Failed to start virtual camera: {}", e);
            if let Err(signal_err) = signal.failed() {
                warn!("{}", signal_err);
            }
            return Err(StartupError::SinkOpen(e));
        }
    };

    let mut guard = SinkGuard::new(sink);
    info!("Virtual camera started: {}", guard.sink_mut().device());
    if let Err(e) = signal.ready() {
        warn!("{}", e);
    }

    let read_timeout =
        (relay.read_timeout_ms > 0).then(|| Duration::from_millis(relay.read_timeout_ms));

    let report = FrameRelay::new(params)
        .with_read_timeout(read_timeout)
        .run(input, guard.sink_mut(), shutdown)
        .await;

    if let Err(e) = guard.close() {
        warn!("Failed to close virtual camera: {}", e);
    }

    Ok(report)
}
