//! MJPEG stream splitting and the threaded reader.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::thread;

use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::debug;

use crate::types::{CompressedFrame, IngestError};

const SOI_MARKER: u8 = 0xD8;
const EOI_MARKER: u8 = 0xD9;
const READ_CHUNK: usize = 64 * 1024;

/// Incremental splitter for concatenated JPEG frames.
///
/// Feed arbitrary byte chunks with [`push`](Self::push) and drain complete
/// SOI..EOI frames with [`next_frame`](Self::next_frame). Bytes before a
/// frame start are discarded, so a stream can be joined mid-frame.
#[derive(Default)]
pub struct MjpegSplitter {
    buffer: Vec<u8>,
}

impl MjpegSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Extracts the next complete frame, or `None` until more data arrives.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let Some(start) = find_marker(&self.buffer, SOI_MARKER, 0) else {
            // No frame start in sight. Drop the garbage, keeping a trailing
            // 0xFF that may pair with the marker byte of the next chunk.
            let keep = usize::from(self.buffer.last() == Some(&0xFF));
            self.buffer.drain(..self.buffer.len() - keep);
            return None;
        };
        if start > 0 {
            self.buffer.drain(..start);
        }

        let end = find_marker(&self.buffer, EOI_MARKER, 2)?;
        let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
        Some(frame)
    }
}

fn find_marker(haystack: &[u8], marker: u8, from: usize) -> Option<usize> {
    if haystack.len() < from + 2 {
        return None;
    }
    haystack[from..]
        .windows(2)
        .position(|pair| pair[0] == 0xFF && pair[1] == marker)
        .map(|pos| pos + from)
}

/// Spawns a background thread that splits `path` into JPEG frames.
///
/// Frames are forwarded over the returned [`Receiver`]; the bounded buffer
/// backpressures the reader when the consumer falls behind. The channel
/// closes at end of stream, and read failures are forwarded in-band.
pub fn spawn_mjpeg_reader(
    path: &Path,
) -> Result<Receiver<Result<CompressedFrame, IngestError>>, IngestError> {
    let file = File::open(path)?;
    let (tx, rx) = bounded(2);
    thread::spawn(move || read_loop(file, tx));
    Ok(rx)
}

fn read_loop(file: File, tx: Sender<Result<CompressedFrame, IngestError>>) {
    let mut reader = BufReader::new(file);
    let mut splitter = MjpegSplitter::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut frames = 0u64;

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                splitter.push(&chunk[..n]);
                while let Some(data) = splitter.next_frame() {
                    frames += 1;
                    let frame = CompressedFrame {
                        data,
                        timestamp_ms: Utc::now().timestamp_millis(),
                    };
                    if tx.send(Ok(frame)).is_err() {
                        return;
                    }
                }
            }
            Err(err) => {
                let _ = tx.send(Err(err.into()));
                return;
            }
        }
    }
    debug!(frames, "MJPEG source drained");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_jpeg(payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0xFF, SOI_MARKER];
        frame.extend_from_slice(payload);
        frame.extend_from_slice(&[0xFF, EOI_MARKER]);
        frame
    }

    #[test]
    fn splits_concatenated_frames() {
        let first = fake_jpeg(&[1, 2, 3]);
        let second = fake_jpeg(&[4, 5]);
        let mut stream = first.clone();
        stream.extend_from_slice(&second);

        let mut splitter = MjpegSplitter::new();
        splitter.push(&stream);
        assert_eq!(splitter.next_frame().unwrap(), first);
        assert_eq!(splitter.next_frame().unwrap(), second);
        assert!(splitter.next_frame().is_none());
    }

    #[test]
    fn reassembles_frames_across_chunk_boundaries() {
        let frame = fake_jpeg(&[9; 100]);
        let mut splitter = MjpegSplitter::new();

        for chunk in frame.chunks(7) {
            splitter.push(chunk);
        }
        assert_eq!(splitter.next_frame().unwrap(), frame);
    }

    #[test]
    fn discards_garbage_before_the_first_frame() {
        let frame = fake_jpeg(&[7, 8]);
        let mut splitter = MjpegSplitter::new();
        splitter.push(&[0x00, 0x11, 0x22]);
        assert!(splitter.next_frame().is_none());

        splitter.push(&frame);
        assert_eq!(splitter.next_frame().unwrap(), frame);
    }

    #[test]
    fn handles_marker_split_at_chunk_edge() {
        let frame = fake_jpeg(&[1]);
        let mut splitter = MjpegSplitter::new();
        // Garbage ending in 0xFF, then the rest of the stream starting with
        // the SOI second byte would be wrong — instead split the real SOI.
        splitter.push(&[0x42, 0xFF]);
        assert!(splitter.next_frame().is_none());
        splitter.push(&frame[1..]);
        // The retained 0xFF pairs with the SOI byte of the pushed remainder.
        assert_eq!(splitter.next_frame().unwrap(), frame);
    }
}
