//! Real-time motion detection over an MJPEG stream.
//!
//! The pipeline per frame: decode (optional) → separable Gaussian blur +
//! downscale on the compute device → history ring write → dual-reservoir
//! stabilization and per-pixel comparison → mask reduction → boolean
//! verdict. The compute device is reached through the `motion-compute`
//! port, so everything here runs unchanged on the CPU reference backend or
//! a CUDA GPU.

pub mod config;
mod detector;
mod error;
pub mod gaussian;
mod history;

pub use config::{InputVideoSettings, MotionConfig, ScaledGeometry};
pub use detector::{InfoSink, MotionDetector};
pub use error::{MotionError, Result};

pub use motion_compute::{enumerate_devices, DeviceConfig, DeviceDescriptor, DeviceKind};
pub use video_ingest::{DecompMethod, FrameFormat};
