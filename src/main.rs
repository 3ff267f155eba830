//! vcam-relay: raw RGBA frames on stdin, virtual camera out

use std::process::ExitCode;
use std::time::Duration;

use color_eyre::Result;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use vcam_relay::cli::{parse_args, Args};
use vcam_relay::pipeline::{run_session, shutdown_signal, ReadinessSignal};
use vcam_relay::sink::V4l2LoopbackSink;
use vcam_relay::SessionParams;

fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    // stdout carries nothing but this token
    let mut signal = ReadinessSignal::stdout();

    // --help and --version also exit through here, with status 0
    let args = parse_args(std::env::args_os(), &mut signal).unwrap_or_else(|err| err.exit());

    init_tracing(&args);
    info!("vcam-relay v{} launching", env!("CARGO_PKG_VERSION"));

    let (config, params) = match args.resolve_session() {
        Ok(resolved) => resolved,
        Err(e) => {
            error!("{}", e);
            signal.failed().ok();
            return Ok(ExitCode::FAILURE);
        }
    };
    debug!("Config: {:?}", config);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            signal.failed().ok();
            return Ok(ExitCode::FAILURE);
        }
    };

    let device = config.device_path();
    let outcome = runtime.block_on(async {
        // Install handlers before the sink opens so early signals are not lost
        let shutdown = shutdown_signal();
        let mut stdin = tokio::io::stdin();
        run_session(
            &params,
            &config.relay,
            |params: &SessionParams| V4l2LoopbackSink::open(device.as_deref(), params),
            &mut stdin,
            &mut signal,
            shutdown,
        )
        .await
    });

    // The stdin reader thread may still be parked in a blocking read
    runtime.shutdown_timeout(Duration::from_millis(250));

    Ok(match outcome {
        Ok(report) => {
            info!("vcam-relay shutting down");
            ExitCode::from(report.exit.exit_code() as u8)
        }
        Err(e) => {
            debug!("Start-up failed: {}", e);
            ExitCode::FAILURE
        }
    })
}

/// Diagnostics go to stderr; `RUST_LOG` overrides the `-v` level.
fn init_tracing(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_writer(std::io::stderr)
        .init();
}
