//! JPEG decompression into packed pixel buffers.

use std::io::Cursor;

use image::{ImageFormat, ImageReader};

use crate::types::{DecodeError, DecompMethod, FrameFormat};

/// Decompresses JPEG frames of a fixed, pre-declared geometry.
///
/// The header is parsed first so a stream that drifts from the configured
/// dimensions fails before any pixel work happens. Output is a packed buffer
/// of exactly `width * height * channels` bytes, owned by the caller.
pub struct JpegDecompressor {
    width: u32,
    height: u32,
    format: FrameFormat,
    #[allow(dead_code)]
    method: DecompMethod,
}

impl JpegDecompressor {
    pub fn new(width: u32, height: u32, format: FrameFormat, method: DecompMethod) -> Self {
        Self {
            width,
            height,
            format,
            method,
        }
    }

    /// Byte length of every decompressed frame.
    pub fn decompressed_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.channels()
    }

    /// Decompresses one JPEG frame into the configured packed layout.
    pub fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let (actual_width, actual_height) =
            ImageReader::with_format(Cursor::new(compressed), ImageFormat::Jpeg)
                .into_dimensions()
                .map_err(|err| DecodeError::Header(err.to_string()))?;

        if actual_width != self.width || actual_height != self.height {
            return Err(DecodeError::DimensionMismatch {
                expected_width: self.width,
                expected_height: self.height,
                actual_width,
                actual_height,
            });
        }

        let decoded = image::load_from_memory_with_format(compressed, ImageFormat::Jpeg)
            .map_err(|err| DecodeError::Decode(err.to_string()))?;

        let pixels = match self.format {
            FrameFormat::Gray => decoded.into_luma8().into_raw(),
            FrameFormat::Rgb => decoded.into_rgb8().into_raw(),
        };
        debug_assert_eq!(pixels.len(), self.decompressed_len());
        Ok(pixels)
    }
}
