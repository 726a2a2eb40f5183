//! Device enumeration and the selection facade.
//!
//! Platforms are enumerated in a fixed order: the host platform (one
//! CPU-class reference device, always present) followed by the CUDA platform
//! when the `cuda` feature is enabled and a driver responds. `Specific`
//! selection indexes the concatenated listing.

use tracing::debug;

use crate::cpu::CpuDevice;
use crate::port::{ComputeDevice, ComputeError};

/// Class of a compute device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

/// Platform a device was enumerated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlatformKind {
    Host,
    Cuda,
}

/// One enumerated compute device.
#[derive(Clone, Debug)]
pub struct DeviceDescriptor {
    pub platform: PlatformKind,
    pub kind: DeviceKind,
    /// Ordinal of the device within its platform.
    pub ordinal: usize,
    pub name: String,
}

/// How to pick the device a detector runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceConfig {
    /// First CPU-class device.
    Cpu,
    /// First GPU-class device.
    Gpu,
    /// Index into the full enumeration, platforms in order.
    Specific(usize),
}

/// Lists every visible compute device across all platforms.
pub fn enumerate_devices() -> Vec<DeviceDescriptor> {
    let mut devices = vec![CpuDevice::reference_descriptor()];
    #[cfg(feature = "cuda")]
    devices.extend(crate::cuda::enumerate());
    debug!(count = devices.len(), "enumerated compute devices");
    devices
}

/// Selects and opens a device according to `config`.
pub fn open_device(config: DeviceConfig) -> Result<Box<dyn ComputeDevice>, ComputeError> {
    let devices = enumerate_devices();
    let descriptor = match config {
        DeviceConfig::Cpu => devices
            .into_iter()
            .find(|d| d.kind == DeviceKind::Cpu)
            .ok_or_else(|| {
                ComputeError::DeviceUnavailable("no CPU-class compute device found".into())
            })?,
        DeviceConfig::Gpu => devices
            .into_iter()
            .find(|d| d.kind == DeviceKind::Gpu)
            .ok_or_else(|| {
                ComputeError::DeviceUnavailable("no GPU-class compute device found".into())
            })?,
        DeviceConfig::Specific(index) => {
            let total = devices.len();
            devices.into_iter().nth(index).ok_or_else(|| {
                ComputeError::DeviceUnavailable(format!(
                    "device index {index} out of range ({total} devices visible)"
                ))
            })?
        }
    };

    debug!(name = %descriptor.name, ?descriptor.platform, "opening compute device");
    match descriptor.platform {
        PlatformKind::Host => Ok(Box::new(CpuDevice::new(descriptor))),
        #[cfg(feature = "cuda")]
        PlatformKind::Cuda => Ok(Box::new(crate::cuda::CudaBackend::open(descriptor)?)),
        #[cfg(not(feature = "cuda"))]
        PlatformKind::Cuda => Err(ComputeError::DeviceUnavailable(
            "CUDA support not compiled in".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_platform_is_always_first() {
        let devices = enumerate_devices();
        assert!(!devices.is_empty());
        assert_eq!(devices[0].platform, PlatformKind::Host);
        assert_eq!(devices[0].kind, DeviceKind::Cpu);
    }

    #[test]
    fn cpu_selection_opens_the_reference_device() {
        let device = open_device(DeviceConfig::Cpu).unwrap();
        assert_eq!(device.descriptor().kind, DeviceKind::Cpu);
    }

    #[test]
    fn out_of_range_specific_selection_is_unavailable() {
        let total = enumerate_devices().len();
        let err = open_device(DeviceConfig::Specific(total + 4)).unwrap_err();
        assert!(matches!(err, ComputeError::DeviceUnavailable(_)));
    }

    #[test]
    fn specific_zero_is_the_host_device() {
        let device = open_device(DeviceConfig::Specific(0)).unwrap();
        assert_eq!(device.descriptor().platform, PlatformKind::Host);
    }
}
