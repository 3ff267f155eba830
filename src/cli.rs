//! Command-line interface

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;

use crate::error::{ConfigError, StartupError};
use crate::pipeline::ReadinessSignal;
use crate::{Config, SessionParams};

/// Relay raw RGBA frames from stdin into a virtual camera
#[derive(Parser, Debug)]
#[command(name = "vcam-relay")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Frame width in pixels
    #[arg(requires = "height", value_parser = clap::value_parser!(u32).range(1..))]
    pub width: Option<u32>,

    /// Frame height in pixels
    #[arg(requires = "width", value_parser = clap::value_parser!(u32).range(1..))]
    pub height: Option<u32>,

    /// Target frame rate
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub fps: Option<u32>,

    /// Configuration file (TOML)
    #[arg(short, long, env = "VCAM_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// v4l2loopback device to write to (default: first one found)
    #[arg(short, long)]
    pub device: Option<PathBuf>,

    /// Stop if no complete frame arrives for this many milliseconds
    #[arg(long)]
    pub read_timeout_ms: Option<u64>,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse `args`, emitting `ERROR` on `signal` when they are rejected.
///
/// `--help` and `--version` also come back as `Err` but are not failures,
/// so nothing is emitted for them. The caller decides how to exit.
pub fn parse_args<I, T, W>(args: I, signal: &mut ReadinessSignal<W>) -> Result<Args, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    W: Write,
{
    match Args::try_parse_from(args) {
        Ok(args) => Ok(args),
        Err(err) => {
            if err.use_stderr() {
                signal.failed().ok();
            }
            Err(err)
        }
    }
}

impl Args {
    /// Resolve the configuration and validate the session it describes.
    pub fn resolve_session(&self) -> Result<(Config, SessionParams), StartupError> {
        let config = self.resolve_config()?;
        let params = SessionParams::resolve(&config)?;
        Ok((config, params))
    }

    /// Load the layered configuration and apply command-line overrides on top.
    pub fn resolve_config(&self) -> Result<Config, ConfigError> {
        let config = Config::load(self.config.as_deref())?;
        Ok(self.apply(config))
    }

    /// Overlay the values given on the command line onto `config`.
    pub fn apply(&self, mut config: Config) -> Config {
        if let (Some(width), Some(height)) = (self.width, self.height) {
            config.session.width = width;
            config.session.height = height;
        }
        if let Some(fps) = self.fps {
            config.session.fps = fps;
        }
        if let Some(device) = &self.device {
            config.sink.device = device.display().to_string();
        }
        if let Some(timeout) = self.read_timeout_ms {
            config.relay.read_timeout_ms = timeout;
        }
        config
    }

    /// Default `EnvFilter` directive for the requested verbosity
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 => "vcam_relay=info",
            1 => "vcam_relay=debug",
            _ => "vcam_relay=trace",
        }
    }
}
