//! v4l2loopback output sink
//!
//! The `v4l2loopback` kernel module must be loaded, with options such as
//! `devices=1 video_nr=10 card_label="Virtual Camera" exclusive_caps=1`.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, instrument, warn};
use v4l::capability::Flags as CapFlags;
use v4l::video::output::Parameters;
use v4l::video::Output;
use v4l::{Device, FourCC};

use super::{CameraSink, FramePacer, SinkError};
use crate::ingest::{FrameGeometry, PixelFormat};
use crate::{utils, SessionParams};

/// Virtual webcam backed by a v4l2loopback device node
pub struct V4l2LoopbackSink {
    path: PathBuf,
    description: String,
    /// Control handle; holding it keeps the negotiated format in place
    _device: Device,
    file: Option<File>,
    geometry: FrameGeometry,
    format: PixelFormat,
    pacer: FramePacer,
    frames_written: u64,
}

impl V4l2LoopbackSink {
    /// Open `path`, or the first loopback device found when `path` is `None`.
    #[instrument(skip(params))]
    pub fn open(path: Option<&Path>, params: &SessionParams) -> Result<Self, SinkError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => utils::default_loopback_device().ok_or(SinkError::NoDevice)?,
        };

        info!(
            "Opening v4l2loopback device {} ({}x{}@{} {:?})",
            path.display(),
            params.geometry.width,
            params.geometry.height,
            params.fps,
            params.output_format
        );

        if !path.exists() {
            return Err(SinkError::NotFound(path));
        }

        let device = Device::with_path(&path).map_err(|e| open_error(&path, e))?;
        let caps = device.query_caps()?;
        debug!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_OUTPUT) {
            return Err(SinkError::NotAnOutput(path));
        }

        let geometry = params.geometry;
        let format = params.output_format;
        let fourcc = FourCC::new(&format.fourcc());

        let mut fmt = Output::format(&device)?;
        fmt.width = geometry.width;
        fmt.height = geometry.height;
        fmt.fourcc = fourcc;
        let (stride, size) = format_sizes(&geometry, format)?;
        fmt.stride = stride;
        fmt.size = size;

        let actual = Output::set_format(&device, &fmt)?;
        if actual.width != geometry.width || actual.height != geometry.height || actual.fourcc != fourcc {
            return Err(SinkError::FormatRejected(format!(
                "requested {}x{} {}, got {}x{} {}",
                geometry.width, geometry.height, fourcc, actual.width, actual.height, actual.fourcc
            )));
        }

        // Loopback devices often ignore the frame interval; pacing happens on our side anyway
        if let Err(e) = Output::set_params(&device, &Parameters::with_fps(params.fps)) {
            warn!("Could not set frame interval (may still work): {}", e);
        }

        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|e| open_error(&path, e))?;

        let description = format!("{} ({})", path.display(), caps.card);

        Ok(Self {
            path,
            description,
            _device: device,
            file: Some(file),
            geometry,
            format,
            pacer: FramePacer::new(params.fps),
            frames_written: 0,
        })
    }
}

impl CameraSink for V4l2LoopbackSink {
    fn device(&self) -> &str {
        &self.description
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        let expected = self.geometry.len_for(self.format);
        if frame.len() != expected {
            return Err(SinkError::FrameSize {
                actual: frame.len(),
                expected,
            });
        }

        let file = self.file.as_mut().ok_or(SinkError::Closed)?;
        file.write_all(frame)?;
        self.frames_written += 1;
        Ok(())
    }

    fn pace(&mut self) -> Result<Instant, SinkError> {
        if self.file.is_none() {
            return Err(SinkError::Closed);
        }
        Ok(self.pacer.next_deadline(Instant::now()))
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut file) = self.file.take() {
            info!(
                "Closing v4l2loopback device {} (wrote {} frames)",
                self.path.display(),
                self.frames_written
            );
            file.flush()?;
        }
        Ok(())
    }
}

/// Line stride and image size as the driver's 32-bit fields.
fn format_sizes(geometry: &FrameGeometry, format: PixelFormat) -> Result<(u32, u32), SinkError> {
    let too_large = || {
        SinkError::FormatRejected(format!(
            "{}x{} frame does not fit a 32-bit V4L2 format",
            geometry.width, geometry.height
        ))
    };
    let stride = u32::try_from(geometry.stride(format)).map_err(|_| too_large())?;
    let size = u32::try_from(geometry.len_for(format)).map_err(|_| too_large())?;
    Ok((stride, size))
}

fn open_error(path: &Path, err: io::Error) -> SinkError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => SinkError::PermissionDenied(path.to_path_buf()),
        io::ErrorKind::NotFound => SinkError::NotFound(path.to_path_buf()),
        _ => SinkError::Io(err),
    }
}
