//! The motion detection orchestrator.
//!
//! Owns the compute device, every device buffer, and the host-side frame
//! history. Per frame: upload, vertical then horizontal blur/scale with a
//! barrier between them, ring write, reservoir stabilization, mask
//! read-back, verdict. Each host call completes fully or fails; a device
//! failure mid-frame destroys the detector so no half-updated state can be
//! observed.

use std::io::Write;

use motion_compute::{
    aligned_len, kernels, open_device, Access, BufferHandle, ComputeDevice, DeviceConfig,
    GlobalRange, KernelHandle, SCALAR_ELEMENTS,
};
use tracing::{debug, info, warn};
use video_ingest::JpegDecompressor;

use crate::config::{InputVideoSettings, MotionConfig, ScaledGeometry};
use crate::error::{MotionError, Result};
use crate::gaussian;
use crate::history::FrameHistory;

/// Optional textual sink for device-name and kernel-build diagnostics.
pub type InfoSink = Box<dyn Write + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DetectorState {
    Ready,
    Processing,
    Destroyed,
}

struct Kernels {
    vertical: KernelHandle,
    horizontal: KernelHandle,
    stabilize: KernelHandle,
}

/// Device-resident buffers, allocated once at construction. Scalars live in
/// their own two-element read-only buffers; frame-sized buffers are padded
/// to the alignment multiple.
struct Buffers {
    gaussian: BufferHandle,
    gaussian_size: BufferHandle,
    scale: BufferHandle,
    colors: BufferHandle,
    input_frame: BufferHandle,
    input_width: BufferHandle,
    output_width: BufferHandle,
    scaled_height: BufferHandle,
    intermediate: BufferHandle,
    scaled: BufferHandle,
    bg_remove: BufferHandle,
    mvt_remove: BufferHandle,
    bg_length: BufferHandle,
    mvt_length: BufferHandle,
    stabilized_bg: BufferHandle,
    stabilized_mvt: BufferHandle,
    pixel_diff_threshold: BufferHandle,
    pixel_count: BufferHandle,
    difference: BufferHandle,
}

/// Detects motion on a stream of MJPEG (or pre-decoded) frames.
///
/// Not safe for concurrent use; run one detector per thread. Multiple
/// detectors may share a physical device — they own disjoint buffers.
pub struct MotionDetector {
    video: InputVideoSettings,
    config: MotionConfig,
    device_config: DeviceConfig,
    geometry: ScaledGeometry,
    device: Box<dyn ComputeDevice>,
    kernels: Kernels,
    buffers: Buffers,
    history: FrameHistory,
    decompressor: JpegDecompressor,
    state: DetectorState,
    scaled_host: Vec<u8>,
    difference_host: Vec<u8>,
}

impl std::fmt::Debug for MotionDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionDetector").finish_non_exhaustive()
    }
}

impl MotionDetector {
    /// Validates the settings, opens the selected device, allocates every
    /// buffer, and builds the kernels. Nothing is left behind on failure.
    pub fn new(
        video: InputVideoSettings,
        config: MotionConfig,
        device_config: DeviceConfig,
        mut info: Option<InfoSink>,
    ) -> Result<Self> {
        let geometry = ScaledGeometry::derive(&video, &config)?;
        debug!(
            scaled_width = geometry.scaled_width,
            scaled_height = geometry.scaled_height,
            threshold = geometry.diff_threshold,
            "derived scaled geometry"
        );

        let mut device = open_device(device_config)?;
        emit(
            &mut info,
            &format!("Selected device: {}", device.descriptor().name),
        );

        let buffers = Self::create_buffers(device.as_mut(), &video, &config, &geometry)?;
        let kernels = Self::build_kernels(device.as_mut(), &mut info)?;

        let history = FrameHistory::new(
            config.bg_stabil_length,
            config.motion_stabil_length,
            geometry.scaled_len,
        );
        let decompressor = JpegDecompressor::new(
            video.width,
            video.height,
            video.frame_format,
            config.decomp_method,
        );

        Ok(Self {
            video,
            config,
            device_config,
            geometry,
            device,
            kernels,
            buffers,
            history,
            decompressor,
            state: DetectorState::Ready,
            scaled_host: vec![0u8; geometry.scaled_len],
            difference_host: vec![0u8; geometry.scaled_len],
        })
    }

    /// Decodes a compressed JPEG frame and runs the full pipeline on it.
    pub fn detect_on_frame(&mut self, compressed: &[u8]) -> Result<bool> {
        let pixels = self.decompressor.decompress(compressed)?;
        self.detect_on_decompressed_frame(&pixels)
    }

    /// Runs the pipeline on an already-decoded packed frame of exactly
    /// `width * height * channels` bytes.
    pub fn detect_on_decompressed_frame(&mut self, frame: &[u8]) -> Result<bool> {
        self.ensure_ready()?;
        self.check_frame_len(frame)?;

        self.state = DetectorState::Processing;
        match self.run_frame(frame) {
            Ok(verdict) => {
                self.state = DetectorState::Ready;
                Ok(verdict)
            }
            Err(err) => {
                warn!("device failure mid-frame, destroying detector: {err}");
                self.state = DetectorState::Destroyed;
                Err(err)
            }
        }
    }

    /// Blurs and scales one frame, rotates it into the history, and returns
    /// the scaled frame. The stabilization reservoirs are untouched.
    pub fn blur_and_scale(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        self.ensure_ready()?;
        self.check_frame_len(frame)?;

        self.state = DetectorState::Processing;
        match self.blur_scale_record(frame) {
            Ok(()) => {
                self.state = DetectorState::Ready;
                Ok(self.scaled_host.clone())
            }
            Err(err) => {
                self.state = DetectorState::Destroyed;
                Err(err)
            }
        }
    }

    /// Video settings the detector was constructed with.
    pub fn input_video_settings(&self) -> InputVideoSettings {
        self.video
    }

    /// Motion configuration the detector was constructed with.
    pub fn motion_config(&self) -> MotionConfig {
        self.config
    }

    /// Device selection the detector was constructed with.
    pub fn device_config(&self) -> DeviceConfig {
        self.device_config
    }

    /// Name of the opened compute device.
    pub fn device_name(&self) -> &str {
        &self.device.descriptor().name
    }

    /// Geometry derived from the settings (scaled dimensions, threshold).
    pub fn scaled_geometry(&self) -> ScaledGeometry {
        self.geometry
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            DetectorState::Ready => Ok(()),
            DetectorState::Processing | DetectorState::Destroyed => Err(MotionError::Destroyed),
        }
    }

    fn check_frame_len(&self, frame: &[u8]) -> Result<()> {
        if frame.len() != self.geometry.input_len {
            return Err(MotionError::InvalidArgument(format!(
                "frame is {} bytes, expected {}",
                frame.len(),
                self.geometry.input_len
            )));
        }
        Ok(())
    }

    fn run_frame(&mut self, frame: &[u8]) -> Result<bool> {
        self.blur_scale_record(frame)?;
        self.stabilize_and_compare()?;
        self.reduce()
    }

    /// Upload, vertical pass, horizontal pass, read-back, ring write.
    fn blur_scale_record(&mut self, frame: &[u8]) -> Result<()> {
        self.device.write(self.buffers.input_frame, frame)?;

        let vertical_range: GlobalRange = [
            aligned_len(self.video.width as usize),
            aligned_len(self.geometry.scaled_height as usize),
        ];
        self.device.launch(
            self.kernels.vertical,
            vertical_range,
            &[
                self.buffers.gaussian,
                self.buffers.gaussian_size,
                self.buffers.scale,
                self.buffers.colors,
                self.buffers.input_frame,
                self.buffers.input_width,
                self.buffers.scaled_height,
                self.buffers.intermediate,
            ],
        )?;
        self.device.finish()?;

        let horizontal_range: GlobalRange = [
            aligned_len(self.geometry.scaled_width as usize),
            aligned_len(self.geometry.scaled_height as usize),
        ];
        self.device.launch(
            self.kernels.horizontal,
            horizontal_range,
            &[
                self.buffers.gaussian,
                self.buffers.gaussian_size,
                self.buffers.scale,
                self.buffers.intermediate,
                self.buffers.input_width,
                self.buffers.output_width,
                self.buffers.scaled_height,
                self.buffers.scaled,
            ],
        )?;
        self.device.finish()?;

        self.device.read(self.buffers.scaled, &mut self.scaled_host)?;
        // The ring copy feeds future evictions; the stabilize pass reads the
        // device-resident scaled frame directly.
        self.history.record(&self.scaled_host);
        Ok(())
    }

    /// Eviction upload and the stabilize/compare launch.
    fn stabilize_and_compare(&mut self) -> Result<()> {
        self.history.advance_removals();
        self.device
            .write(self.buffers.bg_remove, self.history.bg_removal())?;
        self.device
            .write(self.buffers.mvt_remove, self.history.mvt_removal())?;

        let range: GlobalRange = [aligned_len(self.geometry.scaled_len), 1];
        self.device.launch(
            self.kernels.stabilize,
            range,
            &[
                self.buffers.bg_remove,
                self.buffers.mvt_remove,
                self.buffers.scaled,
                self.buffers.bg_length,
                self.buffers.mvt_length,
                self.buffers.stabilized_bg,
                self.buffers.stabilized_mvt,
                self.buffers.pixel_diff_threshold,
                self.buffers.pixel_count,
                self.buffers.difference,
            ],
        )?;
        Ok(self.device.finish()?)
    }

    /// Mask read-back and the global verdict.
    fn reduce(&mut self) -> Result<bool> {
        self.device
            .read(self.buffers.difference, &mut self.difference_host)?;
        let changed = self.difference_host.iter().filter(|&&p| p != 0).count() as u32;
        debug!(
            changed,
            threshold = self.geometry.diff_threshold,
            "frame reduced"
        );
        Ok(changed > self.geometry.diff_threshold)
    }

    fn create_buffers(
        device: &mut dyn ComputeDevice,
        video: &InputVideoSettings,
        config: &MotionConfig,
        geometry: &ScaledGeometry,
    ) -> Result<Buffers> {
        // The Gaussian is generated in f64 and converted exactly once to the
        // device's f32 representation.
        let kernel = gaussian::scale(
            &gaussian::generate(config.gaussian_size),
            config.scale_denominator,
        )?;
        let weights: Vec<f32> = kernel.iter().map(|&w| w as f32).collect();
        let gaussian = device.alloc_bytes(
            aligned_len(weights.len()) * std::mem::size_of::<f32>(),
            Access::ReadOnly,
        )?;
        device.write(gaussian, bytemuck::cast_slice(&weights[..]))?;

        let gaussian_size = scalar_i32(device, weights.len() as i32)?;
        let scale = scalar_i32(device, config.scale_denominator as i32)?;
        let colors = scalar_i32(device, video.frame_format.channels() as i32)?;
        let input_width = scalar_i32(device, video.width as i32)?;
        let output_width = scalar_i32(device, geometry.scaled_width as i32)?;
        let scaled_height = scalar_i32(device, geometry.scaled_height as i32)?;

        let input_frame =
            device.alloc_bytes(aligned_len(geometry.input_len), Access::ReadOnly)?;
        let intermediate =
            device.alloc_bytes(aligned_len(geometry.intermediate_len), Access::ReadWrite)?;
        let scaled = device.alloc_bytes(aligned_len(geometry.scaled_len), Access::ReadWrite)?;

        let bg_remove =
            device.alloc_bytes(aligned_len(geometry.scaled_len), Access::ReadOnly)?;
        let mvt_remove =
            device.alloc_bytes(aligned_len(geometry.scaled_len), Access::ReadOnly)?;
        let bg_length = scalar_f32(device, config.bg_stabil_length as f32)?;
        let mvt_length = scalar_f32(device, config.motion_stabil_length as f32)?;

        let reservoir_bytes = aligned_len(geometry.scaled_len) * std::mem::size_of::<f32>();
        let stabilized_bg = device.alloc_bytes(reservoir_bytes, Access::ReadWrite)?;
        let stabilized_mvt = device.alloc_bytes(reservoir_bytes, Access::ReadWrite)?;

        let pixel_diff_threshold = scalar_u32(device, u32::from(config.min_pixel_diff))?;
        let pixel_count = scalar_i32(device, geometry.scaled_len as i32)?;
        let difference =
            device.alloc_bytes(aligned_len(geometry.scaled_len), Access::WriteOnly)?;

        Ok(Buffers {
            gaussian,
            gaussian_size,
            scale,
            colors,
            input_frame,
            input_width,
            output_width,
            scaled_height,
            intermediate,
            scaled,
            bg_remove,
            mvt_remove,
            bg_length,
            mvt_length,
            stabilized_bg,
            stabilized_mvt,
            pixel_diff_threshold,
            pixel_count,
            difference,
        })
    }

    fn build_kernels(
        device: &mut dyn ComputeDevice,
        info: &mut Option<InfoSink>,
    ) -> Result<Kernels> {
        let mut handles = Vec::with_capacity(kernels::all().len());
        for source in kernels::all() {
            handles.push(device.build_kernel(source)?);
            emit(info, &format!("Built kernel: {}", source.name));
        }

        Ok(Kernels {
            vertical: handles[0],
            horizontal: handles[1],
            stabilize: handles[2],
        })
    }
}

/// Scalar parameter buffers carry two elements to satisfy alignment on
/// strict targets; only element 0 is meaningful.
fn scalar_i32(device: &mut dyn ComputeDevice, value: i32) -> Result<BufferHandle> {
    let host: [i32; SCALAR_ELEMENTS] = [value, 0];
    let buffer = device.alloc_bytes(
        SCALAR_ELEMENTS * std::mem::size_of::<i32>(),
        Access::ReadOnly,
    )?;
    device.write(buffer, bytemuck::cast_slice(&host[..]))?;
    Ok(buffer)
}

fn scalar_u32(device: &mut dyn ComputeDevice, value: u32) -> Result<BufferHandle> {
    scalar_i32(device, value as i32)
}

fn scalar_f32(device: &mut dyn ComputeDevice, value: f32) -> Result<BufferHandle> {
    let host: [f32; SCALAR_ELEMENTS] = [value, 0.0];
    let buffer = device.alloc_bytes(
        SCALAR_ELEMENTS * std::mem::size_of::<f32>(),
        Access::ReadOnly,
    )?;
    device.write(buffer, bytemuck::cast_slice(&host[..]))?;
    Ok(buffer)
}

fn emit(sink: &mut Option<InfoSink>, line: &str) {
    info!("{line}");
    if let Some(sink) = sink {
        let _ = writeln!(sink, "{line}");
    }
}
