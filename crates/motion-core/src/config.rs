//! Detector configuration and the frame geometry derived from it.

use video_ingest::{DecompMethod, FrameFormat};

use crate::error::{MotionError, Result};

/// Metadata of the decompressed video stream feeding the detector.
#[derive(Clone, Copy, Debug)]
pub struct InputVideoSettings {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Packed pixel layout produced by the decoder.
    pub frame_format: FrameFormat,
}

/// Tuning for the motion detection pipeline.
#[derive(Clone, Copy, Debug)]
pub struct MotionConfig {
    /// Gaussian radius: 0 means no blur, 1 a 3-wide kernel, and so on.
    pub gaussian_size: u32,
    /// Downscale denominator applied after margin removal.
    pub scale_denominator: u32,
    /// Frames averaged into the stabilized background.
    pub bg_stabil_length: u32,
    /// Frames averaged into the stabilized movement.
    pub motion_stabil_length: u32,
    /// Minimum per-pixel mean difference that marks a pixel as changed.
    pub min_pixel_diff: u8,
    /// Fraction of scaled pixels that must change for a motion verdict.
    pub min_changed_pixels: f32,
    /// JPEG decompression method used by `detect_on_frame`.
    pub decomp_method: DecompMethod,
}

impl MotionConfig {
    /// Checks every range constraint that does not depend on the video
    /// geometry.
    pub fn validate(&self) -> Result<()> {
        if self.scale_denominator == 0 {
            return Err(invalid("scale denominator cannot be 0"));
        }
        if self.bg_stabil_length == 0 {
            return Err(invalid("background stabilization length cannot be 0"));
        }
        if self.motion_stabil_length == 0 {
            return Err(invalid("movement stabilization length cannot be 0"));
        }
        if !(0.0..=1.0).contains(&self.min_changed_pixels) {
            return Err(invalid("minimum changed pixels must lie in [0, 1]"));
        }
        Ok(())
    }

    /// Length of the scaled Gaussian, which is also the minimum frame edge.
    pub fn scaled_kernel_len(&self) -> u32 {
        (2 * self.gaussian_size + 1) * self.scale_denominator
    }
}

fn invalid(message: &str) -> MotionError {
    MotionError::InvalidArgument(message.into())
}

/// Buffer geometry derived from the video settings and motion config.
#[derive(Clone, Copy, Debug)]
pub struct ScaledGeometry {
    /// Scaled frame width W'.
    pub scaled_width: u32,
    /// Scaled frame height H'.
    pub scaled_height: u32,
    /// Bytes of a packed input frame.
    pub input_len: usize,
    /// Bytes of the intermediate frame (input width x H').
    pub intermediate_len: usize,
    /// Bytes of a scaled frame (W' x H').
    pub scaled_len: usize,
    /// Changed-pixel count that must be exceeded before motion is declared.
    pub diff_threshold: u32,
}

impl ScaledGeometry {
    /// Validates the configuration and computes every derived size.
    pub fn derive(video: &InputVideoSettings, config: &MotionConfig) -> Result<Self> {
        config.validate()?;

        let kernel_len = config.scaled_kernel_len();
        if video.width < kernel_len || video.height < kernel_len {
            return Err(MotionError::InvalidArgument(format!(
                "input video {}x{} is smaller than the {}-wide scaled blur kernel",
                video.width, video.height, kernel_len
            )));
        }

        // The blur consumes a margin of gaussian_size * scale pixels per
        // side; what remains is divided down by the scale denominator.
        let margin = 2 * config.gaussian_size * config.scale_denominator;
        let scaled_width = (video.width - margin) / config.scale_denominator;
        let scaled_height = (video.height - margin) / config.scale_denominator;
        let pixels = scaled_width as usize * scaled_height as usize;

        Ok(Self {
            scaled_width,
            scaled_height,
            input_len: video.width as usize
                * video.height as usize
                * video.frame_format.channels(),
            intermediate_len: video.width as usize * scaled_height as usize,
            scaled_len: pixels,
            diff_threshold: (f64::from(config.min_changed_pixels) * pixels as f64) as u32,
        })
    }
}
