use crate::error::ConfigError;

/// Pixel layouts on either side of the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Producer side: 4 bytes per pixel, [R, G, B, A]
    Rgba32,
    /// Sink side: 3 bytes per pixel, [B, G, R]
    Bgr24,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba32 => 4,
            Self::Bgr24 => 3,
        }
    }

    /// V4L2 FourCC code for this layout
    pub const fn fourcc(self) -> [u8; 4] {
        match self {
            Self::Rgba32 => *b"AB24",
            Self::Bgr24 => *b"BGR3",
        }
    }
}

/// Dense row-major frame dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pixels: usize,
}

impl FrameGeometry {
    /// Fails if the largest buffer for these dimensions would overflow `usize`.
    pub fn new(width: u32, height: u32) -> Result<Self, ConfigError> {
        let too_large = || ConfigError::FrameTooLarge { width, height };
        let pixels = usize::try_from(width)
            .ok()
            .zip(usize::try_from(height).ok())
            .and_then(|(w, h)| w.checked_mul(h))
            .ok_or_else(too_large)?;
        pixels
            .checked_mul(PixelFormat::Rgba32.bytes_per_pixel())
            .ok_or_else(too_large)?;

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn pixel_count(&self) -> usize {
        self.pixels
    }

    pub fn len_for(&self, format: PixelFormat) -> usize {
        self.pixels * format.bytes_per_pixel()
    }

    /// Bytes in one input frame
    pub fn rgba_len(&self) -> usize {
        self.len_for(PixelFormat::Rgba32)
    }

    /// Bytes in one output frame
    pub fn bgr_len(&self) -> usize {
        self.len_for(PixelFormat::Bgr24)
    }

    pub fn stride(&self, format: PixelFormat) -> usize {
        self.width as usize * format.bytes_per_pixel()
    }
}
