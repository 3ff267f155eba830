pub mod convert;
pub mod frame;
pub mod reader;

pub use convert::rgba_to_bgr;
pub use frame::{FrameGeometry, PixelFormat};
pub use reader::{FrameReader, ReadOutcome};
