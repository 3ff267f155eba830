//! Virtual camera relay: RGBA frames on stdin, BGR frames out to a v4l2loopback device.

pub mod cli;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod sink;
pub mod utils;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ingest::PixelFormat;

pub use ingest::FrameGeometry;
pub use pipeline::{LoopExit, Readiness, ReadinessSignal, RelayReport};
pub use sink::{CameraSink, SinkError};

/// Environment prefix for configuration overrides, e.g. `VCAM_RELAY__SESSION__FPS=60`
pub const ENV_PREFIX: &str = "VCAM_RELAY";

/// System configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub session: SessionConfig,
    pub sink: SinkConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Loopback node to write to. Empty means auto-detect.
    pub device: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Give up on a stalled producer after this long. 0 blocks forever.
    pub read_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session: SessionConfig {
                width: 1280,
                height: 720,
                fps: 30,
            },
            sink: SinkConfig {
                device: String::new(),
            },
            relay: RelayConfig { read_timeout_ms: 0 },
        }
    }
}

impl Config {
    /// Layer defaults, an optional TOML file and `VCAM_RELAY__*` environment variables.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Explicit device path, if one was configured.
    pub fn device_path(&self) -> Option<PathBuf> {
        let device = self.sink.device.trim();
        (!device.is_empty()).then(|| PathBuf::from(device))
    }
}

/// Session parameters, fixed for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionParams {
    pub geometry: FrameGeometry,
    pub fps: u32,
    /// Always packed BGR, the layout OBS-style virtual cameras expect
    pub output_format: PixelFormat,
}

impl SessionParams {
    /// Validate the session section of a resolved configuration.
    pub fn resolve(config: &Config) -> Result<Self, ConfigError> {
        let session = &config.session;
        for (field, value) in [
            ("width", session.width),
            ("height", session.height),
            ("fps", session.fps),
        ] {
            if value == 0 {
                return Err(ConfigError::NonPositive { field });
            }
        }

        let geometry = FrameGeometry::new(session.width, session.height)?;

        Ok(Self {
            geometry,
            fps: session.fps,
            output_format: PixelFormat::Bgr24,
        })
    }

    /// Input frame size in bytes (RGBA).
    pub fn frame_size(&self) -> usize {
        self.geometry.rgba_len()
    }
}
