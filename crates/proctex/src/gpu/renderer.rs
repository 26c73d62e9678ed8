use crate::kernels::KernelError;
use crate::registry::{ComputeSystem, FrameContext};
use crate::types::{RendererDescriptor, WorkgroupExtent};

use super::capture_errors;
use super::dispatch::DispatchGeometry;
use super::kernel::{ComputeKernel, KernelLibrary};
use super::surface::{check_surface, SurfaceReader, TextureSurface};
use super::uniforms::{EffectParameters, EffectUniforms, ParameterHandle, UniformStage};

#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    #[error("surface size {width}x{height} is outside 1..={max}")]
    InvalidDimensions { width: u32, height: u32, max: u32 },
    #[error("a texture surface needs at least two images, got {0}")]
    ImageCount(usize),
    #[error("workgroup extent {extent} is not usable: {reason}")]
    Workgroup {
        extent: WorkgroupExtent,
        reason: String,
    },
    #[error("failed to allocate {resource}: {message}")]
    Allocation {
        resource: &'static str,
        message: String,
    },
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

/// One procedural effect: a compute kernel writing a texture surface each
/// frame, driven by an accumulating clock and user-set parameters.
pub struct ProceduralRenderer {
    label: String,
    surface: TextureSurface,
    kernel: ComputeKernel,
    geometry: DispatchGeometry,
    uniform_buffer: wgpu::Buffer,
    /// One bind group per surface image, indexed like the surface.
    bind_groups: Vec<wgpu::BindGroup>,
    stage: UniformStage,
    last_uploaded: EffectUniforms,
    frames: u64,
}

impl ProceduralRenderer {
    pub fn new(
        device: &wgpu::Device,
        library: &KernelLibrary,
        descriptor: &RendererDescriptor,
    ) -> Result<Self, RendererError> {
        validate(device, descriptor)?;
        let label = descriptor.label.as_str();

        let kernel = library.resolve(&descriptor.kernel, descriptor.format, descriptor.workgroup)?;
        let surface = TextureSurface::new(
            device,
            label,
            descriptor.width,
            descriptor.height,
            descriptor.format,
            descriptor.image_count,
        )?;

        let (uniform_buffer, error) = capture_errors(device, || {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("{label} uniforms")),
                size: EffectUniforms::SIZE,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        if let Some(error) = error {
            return Err(RendererError::Allocation {
                resource: "uniform buffer",
                message: error.to_string(),
            });
        }

        let bind_groups = (0..surface.image_count())
            .map(|index| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("{label} bind group #{index}")),
                    layout: kernel.bind_group_layout(),
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(
                                surface.storage_view(index),
                            ),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: uniform_buffer.as_entire_binding(),
                        },
                    ],
                })
            })
            .collect();

        let geometry = DispatchGeometry::new(descriptor.width, descriptor.height, descriptor.workgroup);
        let (groups_x, groups_y, _) = geometry.group_counts();
        tracing::debug!(
            label,
            kernel = kernel.name(),
            width = descriptor.width,
            height = descriptor.height,
            extent = %descriptor.workgroup,
            groups_x,
            groups_y,
            "created procedural renderer"
        );

        Ok(Self {
            label: label.to_string(),
            surface,
            kernel,
            geometry,
            uniform_buffer,
            bind_groups,
            stage: UniformStage::new(descriptor.parameters),
            last_uploaded: EffectUniforms::new(0.0, descriptor.parameters),
            frames: 0,
        })
    }

    /// Records one frame: accumulates time, uploads the full uniform block,
    /// dispatches the kernel into the next write target and publishes it.
    pub fn advance(&mut self, frame: &mut FrameContext<'_>) {
        let block = self.stage.advance(frame.delta_seconds);
        frame
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&block));
        self.last_uploaded = block;

        let target = self.surface.acquire_write_target(frame);
        let (groups_x, groups_y, groups_z) = self.geometry.group_counts();
        {
            let mut pass = frame
                .encoder
                .begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(&self.label),
                    timestamp_writes: None,
                });
            pass.set_pipeline(self.kernel.pipeline());
            pass.set_bind_group(0, &self.bind_groups[target.index()], &[]);
            pass.dispatch_workgroups(groups_x, groups_y, groups_z);
        }
        self.surface.publish(target);
        self.frames += 1;

        tracing::trace!(
            label = %self.label,
            frame = frame.frame_index,
            time = block.time,
            image = target.index(),
            "dispatched procedural kernel"
        );
    }

    /// Stages new effect parameters; they reach the kernel on the next
    /// [`ProceduralRenderer::advance`].
    pub fn set_parameters(&self, intensity: f32, jitter: f32, density: f32, amount: f32) {
        self.stage
            .handle()
            .set_parameters(intensity, jitter, density, amount);
    }

    /// Handle for staging parameters from another thread.
    pub fn parameters(&self) -> ParameterHandle {
        self.stage.handle()
    }

    pub fn staged_parameters(&self) -> EffectParameters {
        self.stage.handle().snapshot()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kernel_name(&self) -> &str {
        self.kernel.name()
    }

    /// Accumulated effect time in seconds.
    pub fn time(&self) -> f32 {
        self.stage.time()
    }

    /// The block written by the most recent advance.
    pub fn last_uniforms(&self) -> EffectUniforms {
        self.last_uploaded
    }

    pub fn geometry(&self) -> DispatchGeometry {
        self.geometry
    }

    pub fn reader(&self) -> SurfaceReader {
        self.surface.reader()
    }

    pub fn frames_advanced(&self) -> u64 {
        self.frames
    }
}

impl ComputeSystem for ProceduralRenderer {
    fn label(&self) -> &str {
        &self.label
    }

    fn advance(&mut self, frame: &mut FrameContext<'_>) {
        ProceduralRenderer::advance(self, frame);
    }
}

fn validate(device: &wgpu::Device, descriptor: &RendererDescriptor) -> Result<(), RendererError> {
    let limits = device.limits();
    check_surface(&limits, descriptor.width, descriptor.height, descriptor.image_count)?;
    descriptor
        .workgroup
        .check_limits(&limits)
        .map_err(|reason| RendererError::Workgroup {
            extent: descriptor.workgroup,
            reason,
        })
}
