//! Video ingest: JPEG decompression and MJPEG stream splitting.
//!
//! The decompressor turns compressed frames into packed pixel buffers of a
//! pre-declared geometry; the MJPEG reader feeds compressed frames out of a
//! byte stream over a bounded channel.

mod jpeg;
mod mjpeg;
mod types;

pub use jpeg::JpegDecompressor;
pub use mjpeg::{spawn_mjpeg_reader, MjpegSplitter};
pub use types::{CompressedFrame, DecodeError, DecompMethod, FrameFormat, IngestError};
