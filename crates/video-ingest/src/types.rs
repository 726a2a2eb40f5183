//! Shared data types exposed by the video ingest layer.

use thiserror::Error;

/// Pixel layouts the decompressor can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    /// One grayscale byte per pixel.
    Gray,
    /// Three interleaved bytes per pixel in R,G,B order.
    Rgb,
}

impl FrameFormat {
    /// Bytes per pixel for this layout.
    pub fn channels(self) -> usize {
        match self {
            FrameFormat::Gray => 1,
            FrameFormat::Rgb => 3,
        }
    }
}

/// Decompression method selector.
///
/// Both variants currently decode through the accurate DCT path; the fast
/// method is accepted for configuration compatibility and treated as the
/// accurate default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DecompMethod {
    Fast,
    #[default]
    Accurate,
}

/// One compressed frame pulled out of an MJPEG stream.
pub struct CompressedFrame {
    /// Complete JPEG bytes, SOI through EOI.
    pub data: Vec<u8>,
    /// Extraction timestamp in milliseconds.
    pub timestamp_ms: i64,
}

/// Errors raised while decompressing a single frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("could not parse JPEG header: {0}")]
    Header(String),

    #[error("JPEG is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("JPEG decode failed: {0}")]
    Decode(String),
}

/// Errors that can arise while driving an MJPEG source.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read MJPEG source: {0}")]
    Io(#[from] std::io::Error),
}
