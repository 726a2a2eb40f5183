//! The device port: handles, errors, and the capability trait every backend
//! implements.
//!
//! Transfers and barriers are blocking by design; the pipeline above this
//! layer is synchronous and observes no suspension points.

use thiserror::Error;

use crate::device::DeviceDescriptor;

/// Element-count multiple applied to buffer sizes and global launch ranges.
pub const RANGE_ALIGNMENT: usize = 8;

/// Element count allocated for scalar parameter buffers.
pub const SCALAR_ELEMENTS: usize = 2;

/// Rounds an element count up to the alignment multiple.
pub fn aligned_len(elements: usize) -> usize {
    elements.div_ceil(RANGE_ALIGNMENT) * RANGE_ALIGNMENT
}

/// Host access intent declared at allocation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
    WriteOnly,
}

/// Opaque handle to a device-resident buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferHandle(pub(crate) usize);

/// Opaque handle to a built kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KernelHandle(pub(crate) usize);

/// A named kernel with its device source text.
///
/// The CUDA backend compiles `source` with NVRTC at build time; the CPU
/// reference backend matches on `name` and runs a native implementation with
/// the same numerical semantics and argument order.
#[derive(Clone, Copy, Debug)]
pub struct KernelSource {
    pub name: &'static str,
    pub source: &'static str,
}

/// Global work size of a launch; 1-D launches pass `[n, 1]`.
pub type GlobalRange = [usize; 2];

/// Stable codes identifying the failing runtime call, carried by
/// [`ComputeError::Device`].
pub mod error_code {
    pub const BUILD: i32 = 1;
    pub const ALLOC: i32 = 2;
    pub const WRITE: i32 = 3;
    pub const READ: i32 = 4;
    pub const LAUNCH: i32 = 5;
    pub const FINISH: i32 = 6;
    pub const ARGUMENT: i32 = 7;
}

/// Errors surfaced by device enumeration and the backend capability calls.
#[derive(Debug, Error)]
pub enum ComputeError {
    /// No device satisfied the selection request.
    #[error("no compute device matches the selection: {0}")]
    DeviceUnavailable(String),

    /// A runtime call returned non-success.
    #[error("device error (code {code}): {message}")]
    Device { code: i32, message: String },
}

impl ComputeError {
    pub(crate) fn device(code: i32, message: impl Into<String>) -> Self {
        ComputeError::Device {
            code,
            message: message.into(),
        }
    }
}

/// Capability set of a compute device.
///
/// Buffers and kernels are referenced through opaque handles owned by the
/// device; dropping the device releases everything it handed out. Kernel
/// arguments are bound positionally at launch, matching the argument order
/// declared by each kernel source.
pub trait ComputeDevice {
    /// Descriptor of the opened device.
    fn descriptor(&self) -> &DeviceDescriptor;

    /// Build a kernel from its source, returning a launchable handle.
    fn build_kernel(&mut self, source: KernelSource) -> Result<KernelHandle, ComputeError>;

    /// Allocate `len` bytes of device memory.
    fn alloc_bytes(&mut self, len: usize, access: Access) -> Result<BufferHandle, ComputeError>;

    /// Blocking host-to-device write starting at offset zero.
    ///
    /// `bytes` may be shorter than the buffer (alignment padding stays
    /// untouched) but must never exceed it.
    fn write(&mut self, buffer: BufferHandle, bytes: &[u8]) -> Result<(), ComputeError>;

    /// Blocking device-to-host read starting at offset zero.
    fn read(&mut self, buffer: BufferHandle, out: &mut [u8]) -> Result<(), ComputeError>;

    /// Enqueue a kernel over `global` work items with positional buffer
    /// arguments. Completion is only guaranteed after [`Self::finish`].
    fn launch(
        &mut self,
        kernel: KernelHandle,
        global: GlobalRange,
        args: &[BufferHandle],
    ) -> Result<(), ComputeError>;

    /// Device barrier: returns once all enqueued work has completed.
    fn finish(&mut self) -> Result<(), ComputeError>;
}

impl std::fmt::Debug for dyn ComputeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ComputeDevice")
            .field(self.descriptor())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::aligned_len;

    #[test]
    fn alignment_rounds_up_to_eight() {
        assert_eq!(aligned_len(0), 0);
        assert_eq!(aligned_len(1), 8);
        assert_eq!(aligned_len(8), 8);
        assert_eq!(aligned_len(9), 16);
        assert_eq!(aligned_len(63), 64);
    }
}
