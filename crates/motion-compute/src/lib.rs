//! Portable compute layer for the motion detection pipeline.
//!
//! The pipeline talks to a [`ComputeDevice`] — a thin port over the runtime
//! capability set (enumerate, build, allocate, write, read, launch, finish).
//! Two backends implement it: a CPU reference device that is always
//! available, and a CUDA device behind the `cuda` feature that compiles the
//! embedded kernel sources with NVRTC at startup.

mod cpu;
#[cfg(feature = "cuda")]
mod cuda;
mod device;
pub mod kernels;
mod port;

pub use cpu::CpuDevice;
pub use device::{
    enumerate_devices, open_device, DeviceConfig, DeviceDescriptor, DeviceKind, PlatformKind,
};
pub use port::{
    aligned_len, error_code, Access, BufferHandle, ComputeDevice, ComputeError, GlobalRange,
    KernelHandle, KernelSource, RANGE_ALIGNMENT, SCALAR_ELEMENTS,
};
