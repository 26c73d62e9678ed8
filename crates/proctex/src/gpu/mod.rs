//! GPU side of the procedural texture pipeline.
//!
//! - `context` creates a headless instance/adapter/device/queue.
//! - `uniforms` mirrors the kernel uniform block and stages parameter writes
//!   coming from other threads.
//! - `dispatch` derives workgroup counts from surface size and extent.
//! - `surface` owns the rotating storage images and the read-only sampling
//!   view handed to consumers.
//! - `kernel` binds the kernel catalog to a device and resolves compute
//!   pipelines by name.
//! - `renderer` glues the above into one [`ProceduralRenderer`] per effect.
//! - `readback` copies the sampled image back to the host for export.

mod context;
mod dispatch;
mod kernel;
mod readback;
mod renderer;
mod surface;
mod uniforms;

pub use context::{GpuContext, GpuOptions};
pub use dispatch::DispatchGeometry;
pub use kernel::{ComputeKernel, KernelLibrary};
pub use readback::ExportError;
pub use renderer::{ProceduralRenderer, RendererError};
pub use surface::{SurfaceReader, TextureSurface, WriteTarget};
pub use uniforms::{EffectParameters, EffectUniforms, ParameterHandle, UniformStage};

/// Runs `create` with out-of-memory and validation error scopes pushed and
/// returns the first captured error alongside the result.
pub(crate) fn capture_errors<T>(
    device: &wgpu::Device,
    create: impl FnOnce() -> T,
) -> (T, Option<wgpu::Error>) {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    (value, out_of_memory.or(validation))
}
