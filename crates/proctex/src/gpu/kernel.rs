use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use wgpu::naga;

use crate::kernels::{KernelCatalog, KernelError};
use crate::types::{SurfaceFormat, WorkgroupExtent};

use super::capture_errors;
use super::uniforms::EffectUniforms;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ModuleKey {
    source: usize,
    format: SurfaceFormat,
    extent: WorkgroupExtent,
}

/// A compiled wrapped source and the workgroup size each of its compute
/// entry points declares.
#[derive(Clone)]
struct CachedModule {
    module: wgpu::ShaderModule,
    workgroup_sizes: HashMap<String, [u32; 3]>,
}

/// A [`KernelCatalog`] bound to a device.
///
/// Wrapped sources are compiled once per (source, format, extent) and the
/// resulting shader modules are reused across renderers. Pipelines are built
/// per resolve and never shared.
pub struct KernelLibrary {
    device: wgpu::Device,
    catalog: KernelCatalog,
    modules: Mutex<HashMap<ModuleKey, CachedModule>>,
}

impl KernelLibrary {
    pub fn new(device: &wgpu::Device, catalog: KernelCatalog) -> Self {
        tracing::debug!(kernels = catalog.len(), "created kernel library");
        Self {
            device: device.clone(),
            catalog,
            modules: Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &KernelCatalog {
        &self.catalog
    }

    /// Looks up `name` and builds a compute pipeline whose storage binding
    /// matches `format` and whose workgroup size equals `extent`.
    pub fn resolve(
        &self,
        name: &str,
        format: SurfaceFormat,
        extent: WorkgroupExtent,
    ) -> Result<ComputeKernel, KernelError> {
        let (source_index, source) = self.catalog.source_for(name)?;
        let key = ModuleKey {
            source: source_index,
            format,
            extent,
        };
        let cached = self.module_for(key, name, || source.wrapped(format, extent))?;
        check_workgroup_size(name, cached.workgroup_sizes.get(name).copied(), extent)?;
        let module = cached.module;

        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&format!("{name} kernel layout")),
                    entries: &[
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::StorageTexture {
                                access: wgpu::StorageTextureAccess::WriteOnly,
                                format: format.to_wgpu(),
                                view_dimension: wgpu::TextureViewDimension::D2,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: wgpu::BufferSize::new(EffectUniforms::SIZE),
                            },
                            count: None,
                        },
                    ],
                });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{name} pipeline layout")),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let (pipeline, error) = capture_errors(&self.device, || {
            self.device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(&format!("{name} pipeline")),
                    layout: Some(&pipeline_layout),
                    module: &module,
                    entry_point: Some(name),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    cache: None,
                })
        });
        if let Some(error) = error {
            return Err(KernelError::Compilation {
                name: name.to_string(),
                message: error.to_string(),
            });
        }

        tracing::debug!(kernel = name, %format, %extent, "resolved compute kernel");
        Ok(ComputeKernel {
            name: name.to_string(),
            pipeline,
            bind_group_layout,
            format,
            extent,
        })
    }

    fn module_for(
        &self,
        key: ModuleKey,
        name: &str,
        wrapped: impl FnOnce() -> String,
    ) -> Result<CachedModule, KernelError> {
        let mut modules = self.modules.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = modules.get(&key) {
            tracing::trace!(kernel = name, "reusing cached shader module");
            return Ok(cached.clone());
        }

        let text = wrapped();
        let parsed = naga::front::wgsl::parse_str(&text).map_err(|err| KernelError::Compilation {
            name: name.to_string(),
            message: err.emit_to_string(&text),
        })?;
        let workgroup_sizes = parsed
            .entry_points
            .iter()
            .filter(|entry| entry.stage == naga::ShaderStage::Compute)
            .map(|entry| (entry.name.clone(), entry.workgroup_size))
            .collect();

        let (module, error) = capture_errors(&self.device, || {
            self.device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(&format!("{name} module")),
                    source: wgpu::ShaderSource::Wgsl(text.into()),
                })
        });
        if let Some(error) = error {
            return Err(KernelError::Compilation {
                name: name.to_string(),
                message: error.to_string(),
            });
        }
        let cached = CachedModule {
            module,
            workgroup_sizes,
        };
        modules.insert(key, cached.clone());
        Ok(cached)
    }
}

/// Dispatch sizing assumes the entry point runs `extent.x * extent.y`
/// invocations per group; anything else leaves pixels unwritten.
fn check_workgroup_size(
    name: &str,
    declared: Option<[u32; 3]>,
    extent: WorkgroupExtent,
) -> Result<(), KernelError> {
    match declared {
        Some(size) if size == [extent.x, extent.y, 1] => Ok(()),
        Some(size) => Err(KernelError::WorkgroupMismatch {
            name: name.to_string(),
            declared: size,
            extent,
        }),
        None => Err(KernelError::Compilation {
            name: name.to_string(),
            message: "no @compute entry point with this name".to_string(),
        }),
    }
}

/// A compiled compute pipeline plus the layout its bind groups must follow.
pub struct ComputeKernel {
    name: String,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    format: SurfaceFormat,
    extent: WorkgroupExtent,
}

impl ComputeKernel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pipeline(&self) -> &wgpu::ComputePipeline {
        &self.pipeline
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn format(&self) -> SurfaceFormat {
        self.format
    }

    pub fn extent(&self) -> WorkgroupExtent {
        self.extent
    }
}
