//! CPU reference backend.
//!
//! Implements the same launch contract as the CUDA backend with native Rust
//! kernels, so the whole pipeline runs (and is tested) without a GPU. Kernel
//! work-items iterate the rounded-up global range and range-check against the
//! true extents passed as scalar buffers, exactly like the device sources.

use crate::device::{DeviceDescriptor, DeviceKind, PlatformKind};
use crate::kernels;
use crate::port::{
    error_code, Access, BufferHandle, ComputeDevice, ComputeError, GlobalRange, KernelHandle,
    KernelSource,
};

struct CpuBuffer {
    data: Vec<u8>,
    #[allow(dead_code)]
    access: Access,
}

/// The host platform's single CPU-class device.
pub struct CpuDevice {
    descriptor: DeviceDescriptor,
    buffers: Vec<CpuBuffer>,
    kernels: Vec<&'static str>,
}

impl CpuDevice {
    pub(crate) fn reference_descriptor() -> DeviceDescriptor {
        DeviceDescriptor {
            platform: PlatformKind::Host,
            kind: DeviceKind::Cpu,
            ordinal: 0,
            name: "host reference cpu".into(),
        }
    }

    pub(crate) fn new(descriptor: DeviceDescriptor) -> Self {
        Self {
            descriptor,
            buffers: Vec::new(),
            kernels: Vec::new(),
        }
    }

    fn buffer(&self, handle: BufferHandle) -> Result<&CpuBuffer, ComputeError> {
        self.buffers.get(handle.0).ok_or_else(|| {
            ComputeError::device(error_code::ARGUMENT, "unknown buffer handle")
        })
    }

    fn bytes(&self, handle: BufferHandle) -> Result<&[u8], ComputeError> {
        Ok(&self.buffer(handle)?.data)
    }

    /// Reads element 0 of an `i32` scalar parameter buffer.
    fn scalar_i32(&self, handle: BufferHandle) -> Result<i32, ComputeError> {
        Ok(i32::from_ne_bytes(self.scalar_word(handle)?))
    }

    fn scalar_u32(&self, handle: BufferHandle) -> Result<u32, ComputeError> {
        Ok(u32::from_ne_bytes(self.scalar_word(handle)?))
    }

    fn scalar_f32(&self, handle: BufferHandle) -> Result<f32, ComputeError> {
        Ok(f32::from_ne_bytes(self.scalar_word(handle)?))
    }

    fn scalar_word(&self, handle: BufferHandle) -> Result<[u8; 4], ComputeError> {
        let bytes = self.bytes(handle)?;
        bytes.get(..4).and_then(|w| w.try_into().ok()).ok_or_else(|| {
            ComputeError::device(
                error_code::ARGUMENT,
                "scalar buffer shorter than one element",
            )
        })
    }

    /// Temporarily detaches a buffer's storage so a kernel can mutate it
    /// while still reading its other arguments.
    fn take(&mut self, handle: BufferHandle) -> Result<Vec<u8>, ComputeError> {
        let buffer = self.buffers.get_mut(handle.0).ok_or_else(|| {
            ComputeError::device(error_code::ARGUMENT, "unknown buffer handle")
        })?;
        Ok(std::mem::take(&mut buffer.data))
    }

    fn restore(&mut self, handle: BufferHandle, data: Vec<u8>) {
        self.buffers[handle.0].data = data;
    }

    fn expect_args(args: &[BufferHandle], expected: usize) -> Result<(), ComputeError> {
        if args.len() != expected {
            return Err(ComputeError::device(
                error_code::LAUNCH,
                format!("kernel expects {expected} arguments, got {}", args.len()),
            ));
        }
        Ok(())
    }

    /// Vertical Gaussian pass: reduces colour to luma, convolves each column
    /// with the scaled kernel, and writes the `width x H'` intermediate.
    fn blur_and_scale_vertical(
        &mut self,
        global: GlobalRange,
        args: &[BufferHandle],
    ) -> Result<(), ComputeError> {
        Self::expect_args(args, 8)?;
        let gaussian = f32_vec(self.bytes(args[0])?);
        let gaussian_len = self.scalar_i32(args[1])? as usize;
        let scale = self.scalar_i32(args[2])? as usize;
        let colors = self.scalar_i32(args[3])? as usize;
        let input = self.bytes(args[4])?.to_vec();
        let width = self.scalar_i32(args[5])? as usize;
        let out_height = self.scalar_i32(args[6])? as usize;

        let mut intermediate = self.take(args[7])?;
        for y in 0..global[1] {
            if y >= out_height {
                continue;
            }
            let y0 = y * scale;
            for x in 0..global[0] {
                if x >= width {
                    continue;
                }
                let mut acc = 0.0f32;
                for (i, weight) in gaussian.iter().take(gaussian_len).enumerate() {
                    let pixel = (y0 + i) * width + x;
                    let luma = if colors == 3 {
                        let p = pixel * 3;
                        (f32::from(input[p]) + f32::from(input[p + 1]) + f32::from(input[p + 2]))
                            / 3.0
                    } else {
                        f32::from(input[pixel])
                    };
                    acc += weight * luma;
                }
                intermediate[y * width + x] = clamp_to_byte(acc);
            }
        }
        self.restore(args[7], intermediate);
        Ok(())
    }

    /// Horizontal Gaussian pass over the intermediate, producing the
    /// `W' x H'` scaled frame.
    fn blur_and_scale_horizontal(
        &mut self,
        global: GlobalRange,
        args: &[BufferHandle],
    ) -> Result<(), ComputeError> {
        Self::expect_args(args, 8)?;
        let gaussian = f32_vec(self.bytes(args[0])?);
        let gaussian_len = self.scalar_i32(args[1])? as usize;
        let scale = self.scalar_i32(args[2])? as usize;
        let intermediate = self.bytes(args[3])?.to_vec();
        let width = self.scalar_i32(args[4])? as usize;
        let out_width = self.scalar_i32(args[5])? as usize;
        let out_height = self.scalar_i32(args[6])? as usize;

        let mut scaled = self.take(args[7])?;
        for y in 0..global[1] {
            if y >= out_height {
                continue;
            }
            for x in 0..global[0] {
                if x >= out_width {
                    continue;
                }
                let x0 = x * scale;
                let mut acc = 0.0f32;
                for (i, weight) in gaussian.iter().take(gaussian_len).enumerate() {
                    acc += weight * f32::from(intermediate[y * width + x0 + i]);
                }
                scaled[y * out_width + x] = clamp_to_byte(acc);
            }
        }
        self.restore(args[7], scaled);
        Ok(())
    }

    /// Reservoir update and comparison.
    ///
    /// Order matters: the movement sum is updated first, the mask compares
    /// the pre-update background mean against the post-update movement mean,
    /// and only then is the background sum updated. The background therefore
    /// lags the comparison by one frame.
    fn stabilize_bg_mvt(
        &mut self,
        global: GlobalRange,
        args: &[BufferHandle],
    ) -> Result<(), ComputeError> {
        Self::expect_args(args, 10)?;
        let bg_remove = self.bytes(args[0])?.to_vec();
        let mvt_remove = self.bytes(args[1])?.to_vec();
        let scaled = self.bytes(args[2])?.to_vec();
        let bg_length = self.scalar_f32(args[3])?;
        let mvt_length = self.scalar_f32(args[4])?;
        let threshold = self.scalar_u32(args[7])? as f32;
        let pixel_count = self.scalar_i32(args[8])? as usize;

        let mut bg_bytes = self.take(args[5])?;
        let mut mvt_bytes = self.take(args[6])?;
        let mut difference = self.take(args[9])?;

        let mut stabilized_bg = f32_vec(&bg_bytes);
        let mut stabilized_mvt = f32_vec(&mvt_bytes);
        for i in 0..global[0] {
            if i >= pixel_count {
                continue;
            }
            let sample = f32::from(scaled[i]);
            let mvt = stabilized_mvt[i] + sample - f32::from(mvt_remove[i]);
            stabilized_mvt[i] = mvt;
            let mean_bg = stabilized_bg[i] / bg_length;
            let mean_mvt = mvt / mvt_length;
            difference[i] = u8::from((mean_bg - mean_mvt).abs() > threshold);
            stabilized_bg[i] = stabilized_bg[i] + sample - f32::from(bg_remove[i]);
        }
        store_f32(&mut bg_bytes, &stabilized_bg);
        store_f32(&mut mvt_bytes, &stabilized_mvt);

        self.restore(args[5], bg_bytes);
        self.restore(args[6], mvt_bytes);
        self.restore(args[9], difference);
        Ok(())
    }
}

fn clamp_to_byte(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Views a byte buffer as native-endian `f32` values without requiring the
/// allocation to be word-aligned.
fn f32_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn store_f32(bytes: &mut [u8], values: &[f32]) {
    for (chunk, value) in bytes.chunks_exact_mut(4).zip(values) {
        chunk.copy_from_slice(&value.to_ne_bytes());
    }
}

impl ComputeDevice for CpuDevice {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn build_kernel(&mut self, source: KernelSource) -> Result<KernelHandle, ComputeError> {
        if !kernels::ALL_NAMES.contains(&source.name) {
            return Err(ComputeError::device(
                error_code::BUILD,
                format!("unknown kernel '{}'", source.name),
            ));
        }
        self.kernels.push(source.name);
        Ok(KernelHandle(self.kernels.len() - 1))
    }

    fn alloc_bytes(&mut self, len: usize, access: Access) -> Result<BufferHandle, ComputeError> {
        self.buffers.push(CpuBuffer {
            data: vec![0u8; len],
            access,
        });
        Ok(BufferHandle(self.buffers.len() - 1))
    }

    fn write(&mut self, buffer: BufferHandle, bytes: &[u8]) -> Result<(), ComputeError> {
        let target = self.buffers.get_mut(buffer.0).ok_or_else(|| {
            ComputeError::device(error_code::WRITE, "unknown buffer handle")
        })?;
        if bytes.len() > target.data.len() {
            return Err(ComputeError::device(
                error_code::WRITE,
                format!(
                    "write of {} bytes exceeds buffer of {}",
                    bytes.len(),
                    target.data.len()
                ),
            ));
        }
        target.data[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read(&mut self, buffer: BufferHandle, out: &mut [u8]) -> Result<(), ComputeError> {
        let source = self.buffer(buffer)?;
        if out.len() > source.data.len() {
            return Err(ComputeError::device(
                error_code::READ,
                format!(
                    "read of {} bytes exceeds buffer of {}",
                    out.len(),
                    source.data.len()
                ),
            ));
        }
        out.copy_from_slice(&source.data[..out.len()]);
        Ok(())
    }

    fn launch(
        &mut self,
        kernel: KernelHandle,
        global: GlobalRange,
        args: &[BufferHandle],
    ) -> Result<(), ComputeError> {
        let name = *self.kernels.get(kernel.0).ok_or_else(|| {
            ComputeError::device(error_code::LAUNCH, "unknown kernel handle")
        })?;
        match name {
            kernels::BLUR_AND_SCALE_VERTICAL => self.blur_and_scale_vertical(global, args),
            kernels::BLUR_AND_SCALE_HORIZONTAL => self.blur_and_scale_horizontal(global, args),
            kernels::STABILIZE_BG_MVT => self.stabilize_bg_mvt(global, args),
            other => Err(ComputeError::device(
                error_code::LAUNCH,
                format!("kernel '{other}' has no host implementation"),
            )),
        }
    }

    fn finish(&mut self) -> Result<(), ComputeError> {
        // Launches execute eagerly on the host; the barrier is a no-op.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels;

    fn device() -> CpuDevice {
        CpuDevice::new(CpuDevice::reference_descriptor())
    }

    #[test]
    fn write_read_round_trip_leaves_padding_zeroed() {
        let mut dev = device();
        let buf = dev.alloc_bytes(16, Access::ReadWrite).unwrap();
        dev.write(buf, &[1, 2, 3, 4]).unwrap();

        let mut out = [0xffu8; 8];
        dev.read(buf, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4, 0, 0, 0, 0]);
    }

    #[test]
    fn oversized_write_is_rejected() {
        let mut dev = device();
        let buf = dev.alloc_bytes(2, Access::ReadOnly).unwrap();
        let err = dev.write(buf, &[0u8; 3]).unwrap_err();
        assert!(matches!(
            err,
            ComputeError::Device {
                code: error_code::WRITE,
                ..
            }
        ));
    }

    #[test]
    fn unknown_kernel_fails_to_build() {
        let mut dev = device();
        let err = dev
            .build_kernel(KernelSource {
                name: "does_not_exist",
                source: "",
            })
            .unwrap_err();
        assert!(matches!(
            err,
            ComputeError::Device {
                code: error_code::BUILD,
                ..
            }
        ));
    }

    #[test]
    fn known_kernels_build() {
        let mut dev = device();
        for source in kernels::all() {
            dev.build_kernel(source).unwrap();
        }
    }

    #[test]
    fn launch_checks_argument_count() {
        let mut dev = device();
        let kernel = dev.build_kernel(kernels::stabilize_bg_mvt()).unwrap();
        let err = dev.launch(kernel, [8, 1], &[]).unwrap_err();
        assert!(matches!(
            err,
            ComputeError::Device {
                code: error_code::LAUNCH,
                ..
            }
        ));
    }
}
