//! Error taxonomy of the motion detection engine.

use motion_compute::ComputeError;
use thiserror::Error;
use video_ingest::DecodeError;

pub type Result<T> = std::result::Result<T, MotionError>;

/// Every failure the engine surfaces to callers.
#[derive(Debug, Error)]
pub enum MotionError {
    /// Configuration or input rejected before any device work.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Device selection failed.
    #[error("no suitable compute device: {0}")]
    DeviceUnavailable(String),

    /// A compute runtime call returned non-success.
    #[error("compute device failure (code {code}): {message}")]
    Device { code: i32, message: String },

    /// JPEG header mismatch or decoder failure.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A source file could not be read.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// The detector hit a device failure on an earlier frame and can no
    /// longer run.
    #[error("detector destroyed by an earlier device failure")]
    Destroyed,
}

impl From<ComputeError> for MotionError {
    fn from(err: ComputeError) -> Self {
        match err {
            ComputeError::DeviceUnavailable(message) => MotionError::DeviceUnavailable(message),
            ComputeError::Device { code, message } => MotionError::Device { code, message },
        }
    }
}
