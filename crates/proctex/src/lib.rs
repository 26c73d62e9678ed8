//! GPU compute-driven procedural textures.
//!
//! A [`ProceduralRenderer`] owns a compute kernel, a small uniform block and
//! a rotating set of storage images. Once per displayed frame the
//! [`FrameDriver`] hands every registered renderer the frame delta; each one
//! accumulates its clock, uploads the block, dispatches enough workgroups to
//! cover its surface and publishes the written image for sampling:
//!
//! ```text
//!   FrameDriver::render_frame
//!          │ delta, encoder
//!          ▼
//!   RendererRegistry::advance_all ──▶ ProceduralRenderer::advance
//!                                        │ write_buffer(EffectUniforms)
//!                                        │ dispatch(ceil(w/ex), ceil(h/ey), 1)
//!                                        └─▶ TextureSurface::publish ──▶ SurfaceReader
//! ```
//!
//! Effect parameters may be staged from any thread through a
//! [`ParameterHandle`]; they take effect on the renderer's next advance.
//! Kernels are plain WGSL `@compute` entry points looked up by name in a
//! [`KernelCatalog`]; the crate supplies their bindings and uniform layout.

pub mod clock;
pub mod driver;
pub mod gpu;
pub mod kernels;
pub mod registry;
pub mod types;

pub use clock::{
    delta_source_for, BoxedDeltaSource, DeltaSource, FixedDeltaSource, SystemDeltaSource,
    TimingPolicy,
};
pub use driver::{FrameDriver, FrameReport};
pub use gpu::{
    ComputeKernel, DispatchGeometry, EffectParameters, EffectUniforms, ExportError, GpuContext,
    GpuOptions, KernelLibrary, ParameterHandle, ProceduralRenderer, RendererError, SurfaceReader,
    TextureSurface, UniformStage, WriteTarget,
};
pub use kernels::{KernelCatalog, KernelError, KernelSource};
pub use registry::{ComputeSystem, FrameContext, RendererId, RendererRegistry};
pub use types::{
    AdapterProfile, GpuMemoryMode, GpuPowerPreference, ProceduralEffect, RendererDescriptor,
    SurfaceFormat, WorkgroupExtent,
};

/// Builds a renderer for one of the built-in effects at the given square
/// resolution, using the effect's preferred workgroup extent.
pub fn create_effect_renderer(
    device: &wgpu::Device,
    library: &KernelLibrary,
    effect: ProceduralEffect,
    resolution: u32,
) -> Result<ProceduralRenderer, RendererError> {
    ProceduralRenderer::new(
        device,
        library,
        &RendererDescriptor::for_effect(effect, resolution),
    )
}
