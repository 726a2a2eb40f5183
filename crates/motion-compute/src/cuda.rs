//! CUDA backend built on cudarc.
//!
//! Kernels are compiled from the embedded CUDA C sources with NVRTC at
//! startup, so there is no offline build step to manage. All transfers go
//! through the default stream and every barrier is a full stream
//! synchronize, matching the blocking contract of the port.

use std::sync::Arc;

use cudarc::driver::{
    CudaContext, CudaFunction, CudaSlice, CudaStream, LaunchConfig, PushKernelArg,
};
use cudarc::nvrtc::compile_ptx;
use tracing::{debug, warn};

use crate::device::{DeviceDescriptor, DeviceKind, PlatformKind};
use crate::port::{
    error_code, Access, BufferHandle, ComputeDevice, ComputeError, GlobalRange, KernelHandle,
    KernelSource,
};

const BLOCK_1D: u32 = 256;
const BLOCK_2D: u32 = 16;

pub(crate) struct CudaBackend {
    descriptor: DeviceDescriptor,
    _context: Arc<CudaContext>,
    stream: Arc<CudaStream>,
    functions: Vec<CudaFunction>,
    buffers: Vec<CudaSlice<u8>>,
}

/// Lists CUDA devices, or nothing when no driver responds.
pub(crate) fn enumerate() -> Vec<DeviceDescriptor> {
    let count = match CudaContext::device_count() {
        Ok(count) => count.max(0) as usize,
        Err(err) => {
            debug!("CUDA enumeration unavailable: {err:?}");
            return Vec::new();
        }
    };

    (0..count)
        .filter_map(|ordinal| match CudaContext::new(ordinal) {
            Ok(context) => Some(DeviceDescriptor {
                platform: PlatformKind::Cuda,
                kind: DeviceKind::Gpu,
                ordinal,
                name: context
                    .name()
                    .unwrap_or_else(|_| format!("CUDA device {ordinal}")),
            }),
            Err(err) => {
                warn!("skipping CUDA device {ordinal}: {err:?}");
                None
            }
        })
        .collect()
}

fn driver_error(code: i32, err: impl std::fmt::Debug) -> ComputeError {
    ComputeError::device(code, format!("{err:?}"))
}

impl CudaBackend {
    pub(crate) fn open(descriptor: DeviceDescriptor) -> Result<Self, ComputeError> {
        let context = CudaContext::new(descriptor.ordinal)
            .map_err(|err| driver_error(error_code::ALLOC, err))?;
        let stream = context.default_stream();
        Ok(Self {
            descriptor,
            _context: context,
            stream,
            functions: Vec::new(),
            buffers: Vec::new(),
        })
    }

    fn buffer(&self, handle: BufferHandle) -> Result<&CudaSlice<u8>, ComputeError> {
        self.buffers.get(handle.0).ok_or_else(|| {
            ComputeError::device(error_code::ARGUMENT, "unknown buffer handle")
        })
    }

    fn launch_config(global: GlobalRange) -> LaunchConfig {
        if global[1] <= 1 {
            let n = global[0] as u32;
            LaunchConfig {
                grid_dim: (n.div_ceil(BLOCK_1D).max(1), 1, 1),
                block_dim: (BLOCK_1D, 1, 1),
                shared_mem_bytes: 0,
            }
        } else {
            let (x, y) = (global[0] as u32, global[1] as u32);
            LaunchConfig {
                grid_dim: (
                    x.div_ceil(BLOCK_2D).max(1),
                    y.div_ceil(BLOCK_2D).max(1),
                    1,
                ),
                block_dim: (BLOCK_2D, BLOCK_2D, 1),
                shared_mem_bytes: 0,
            }
        }
    }
}

impl ComputeDevice for CudaBackend {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn build_kernel(&mut self, source: KernelSource) -> Result<KernelHandle, ComputeError> {
        let ptx = compile_ptx(source.source).map_err(|err| {
            ComputeError::device(
                error_code::BUILD,
                format!("NVRTC build of '{}' failed: {err:?}", source.name),
            )
        })?;
        let module = self
            ._context
            .load_module(ptx)
            .map_err(|err| driver_error(error_code::BUILD, err))?;
        let function = module
            .load_function(source.name)
            .map_err(|err| driver_error(error_code::BUILD, err))?;
        debug!(kernel = source.name, "compiled CUDA kernel");
        self.functions.push(function);
        Ok(KernelHandle(self.functions.len() - 1))
    }

    fn alloc_bytes(&mut self, len: usize, _access: Access) -> Result<BufferHandle, ComputeError> {
        let slice = self
            .stream
            .alloc_zeros::<u8>(len)
            .map_err(|err| driver_error(error_code::ALLOC, err))?;
        self.buffers.push(slice);
        Ok(BufferHandle(self.buffers.len() - 1))
    }

    fn write(&mut self, buffer: BufferHandle, bytes: &[u8]) -> Result<(), ComputeError> {
        let stream = self.stream.clone();
        let slice = self.buffers.get_mut(buffer.0).ok_or_else(|| {
            ComputeError::device(error_code::WRITE, "unknown buffer handle")
        })?;
        if bytes.len() > slice.len() {
            return Err(ComputeError::device(
                error_code::WRITE,
                format!(
                    "write of {} bytes exceeds buffer of {}",
                    bytes.len(),
                    slice.len()
                ),
            ));
        }
        stream
            .memcpy_htod(bytes, slice)
            .map_err(|err| driver_error(error_code::WRITE, err))?;
        stream
            .synchronize()
            .map_err(|err| driver_error(error_code::WRITE, err))
    }

    fn read(&mut self, buffer: BufferHandle, out: &mut [u8]) -> Result<(), ComputeError> {
        let stream = self.stream.clone();
        let slice = self.buffer(buffer)?;
        if out.len() > slice.len() {
            return Err(ComputeError::device(
                error_code::READ,
                format!(
                    "read of {} bytes exceeds buffer of {}",
                    out.len(),
                    slice.len()
                ),
            ));
        }
        stream
            .memcpy_dtoh(slice, out)
            .map_err(|err| driver_error(error_code::READ, err))?;
        stream
            .synchronize()
            .map_err(|err| driver_error(error_code::READ, err))
    }

    fn launch(
        &mut self,
        kernel: KernelHandle,
        global: GlobalRange,
        args: &[BufferHandle],
    ) -> Result<(), ComputeError> {
        let function = self
            .functions
            .get(kernel.0)
            .ok_or_else(|| ComputeError::device(error_code::LAUNCH, "unknown kernel handle"))?
            .clone();
        let stream = self.stream.clone();

        let mut builder = stream.launch_builder(&function);
        for handle in args {
            builder.arg(self.buffer(*handle)?);
        }
        unsafe {
            builder
                .launch(Self::launch_config(global))
                .map_err(|err| driver_error(error_code::LAUNCH, err))?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ComputeError> {
        self.stream
            .synchronize()
            .map_err(|err| driver_error(error_code::FINISH, err))
    }
}
