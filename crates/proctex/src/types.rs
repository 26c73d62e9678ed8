use std::fmt;

use crate::gpu::EffectParameters;

/// Pixel formats a procedural surface can be allocated with.
///
/// Every variant is usable both as a write-only storage texture (kernel side)
/// and as a filterable sampled texture (consumer side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SurfaceFormat {
    /// Half-float RGBA; wide-gamut/HDR output, the default for effects.
    #[default]
    Rgba16Float,
    /// Full-float RGBA for kernels that need the extra precision.
    Rgba32Float,
    /// 8-bit normalised RGBA.
    Rgba8Unorm,
}

impl SurfaceFormat {
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            SurfaceFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            SurfaceFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            SurfaceFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        }
    }

    /// Texel format name as spelled in WGSL storage texture declarations.
    pub fn wgsl_name(self) -> &'static str {
        match self {
            SurfaceFormat::Rgba16Float => "rgba16float",
            SurfaceFormat::Rgba32Float => "rgba32float",
            SurfaceFormat::Rgba8Unorm => "rgba8unorm",
        }
    }

    pub fn bytes_per_texel(self) -> u32 {
        match self {
            SurfaceFormat::Rgba16Float => 8,
            SurfaceFormat::Rgba32Float => 16,
            SurfaceFormat::Rgba8Unorm => 4,
        }
    }

    /// Rgba32Float is not filterable without an optional device feature.
    pub fn is_filterable(self) -> bool {
        !matches!(self, SurfaceFormat::Rgba32Float)
    }
}

impl fmt::Display for SurfaceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wgsl_name())
    }
}

/// Threads per workgroup along x and y. Depth is always one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkgroupExtent {
    pub x: u32,
    pub y: u32,
}

impl WorkgroupExtent {
    pub const EIGHT: WorkgroupExtent = WorkgroupExtent { x: 8, y: 8 };
    pub const SIXTEEN: WorkgroupExtent = WorkgroupExtent { x: 16, y: 16 };

    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    pub const fn square(size: u32) -> Self {
        Self { x: size, y: size }
    }

    pub fn invocations(self) -> u32 {
        self.x.saturating_mul(self.y)
    }

    /// Checks the extent against the device's compute limits.
    pub fn check_limits(self, limits: &wgpu::Limits) -> Result<(), String> {
        if self.x == 0 || self.y == 0 {
            return Err("workgroup extent must be non-zero on both axes".to_string());
        }
        if self.x > limits.max_compute_workgroup_size_x {
            return Err(format!(
                "x extent {} exceeds device maximum {}",
                self.x, limits.max_compute_workgroup_size_x
            ));
        }
        if self.y > limits.max_compute_workgroup_size_y {
            return Err(format!(
                "y extent {} exceeds device maximum {}",
                self.y, limits.max_compute_workgroup_size_y
            ));
        }
        if self.invocations() > limits.max_compute_invocations_per_workgroup {
            return Err(format!(
                "{} invocations per workgroup exceeds device maximum {}",
                self.invocations(),
                limits.max_compute_invocations_per_workgroup
            ));
        }
        Ok(())
    }
}

impl Default for WorkgroupExtent {
    fn default() -> Self {
        Self::EIGHT
    }
}

impl fmt::Display for WorkgroupExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.x, self.y)
    }
}

/// Built-in effects and the kernel entry points that implement them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProceduralEffect {
    /// Animated escape-time fractal driven by all four effect parameters.
    Fractal,
    /// Banded glow used on the immersive sphere; reads time and intensity.
    EffectSphere,
    /// Endless tunnel; reads time only.
    Tunnel,
}

impl ProceduralEffect {
    pub const ALL: [ProceduralEffect; 3] = [
        ProceduralEffect::Fractal,
        ProceduralEffect::EffectSphere,
        ProceduralEffect::Tunnel,
    ];

    pub fn kernel_name(self) -> &'static str {
        match self {
            ProceduralEffect::Fractal => "fancy_fractal",
            ProceduralEffect::EffectSphere => "effect_sphere",
            ProceduralEffect::Tunnel => "tunnel",
        }
    }

    /// Workgroup extent each effect was tuned for.
    pub fn preferred_workgroup(self) -> WorkgroupExtent {
        match self {
            ProceduralEffect::Fractal => WorkgroupExtent::EIGHT,
            ProceduralEffect::EffectSphere | ProceduralEffect::Tunnel => WorkgroupExtent::SIXTEEN,
        }
    }
}

/// Construction-time configuration of a [`crate::ProceduralRenderer`].
///
/// Everything here is fixed for the renderer's lifetime; only the effect
/// parameters change afterwards, through the renderer's parameter handle.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererDescriptor {
    /// Name used for GPU object labels and log fields.
    pub label: String,
    /// Kernel entry point resolved against the kernel library.
    pub kernel: String,
    pub width: u32,
    pub height: u32,
    pub format: SurfaceFormat,
    pub workgroup: WorkgroupExtent,
    /// Number of physical images the surface rotates through (at least two).
    pub image_count: usize,
    /// Initial effect parameters staged before the first frame.
    pub parameters: EffectParameters,
}

impl RendererDescriptor {
    pub const DEFAULT_RESOLUTION: u32 = 512;
    pub const DEFAULT_IMAGE_COUNT: usize = 2;

    pub fn new(label: impl Into<String>, kernel: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kernel: kernel.into(),
            ..Self::default()
        }
    }

    /// Square surface running one of the built-in effects.
    pub fn for_effect(effect: ProceduralEffect, resolution: u32) -> Self {
        Self {
            label: effect.kernel_name().to_string(),
            kernel: effect.kernel_name().to_string(),
            width: resolution,
            height: resolution,
            workgroup: effect.preferred_workgroup(),
            ..Self::default()
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_workgroup(mut self, workgroup: WorkgroupExtent) -> Self {
        self.workgroup = workgroup;
        self
    }

    pub fn with_format(mut self, format: SurfaceFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_parameters(mut self, parameters: EffectParameters) -> Self {
        self.parameters = parameters;
        self
    }
}

impl Default for RendererDescriptor {
    fn default() -> Self {
        Self {
            label: "procedural".to_string(),
            kernel: ProceduralEffect::Fractal.kernel_name().to_string(),
            width: Self::DEFAULT_RESOLUTION,
            height: Self::DEFAULT_RESOLUTION,
            format: SurfaceFormat::default(),
            workgroup: WorkgroupExtent::default(),
            image_count: Self::DEFAULT_IMAGE_COUNT,
            parameters: EffectParameters::default(),
        }
    }
}

/// Adapter power preference requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    Low,
    #[default]
    High,
}

/// Device memory allocation strategy hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuMemoryMode {
    #[default]
    Balanced,
    Performance,
}

/// Summary of the adapter a [`crate::GpuContext`] was created on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
}

impl AdapterProfile {
    pub fn from_wgpu(info: &wgpu::AdapterInfo) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effects_map_to_distinct_kernels() {
        let names: Vec<_> = ProceduralEffect::ALL
            .iter()
            .map(|effect| effect.kernel_name())
            .collect();
        assert_eq!(names, ["fancy_fractal", "effect_sphere", "tunnel"]);
    }

    #[test]
    fn effect_descriptor_is_square() {
        let descriptor = RendererDescriptor::for_effect(ProceduralEffect::Tunnel, 256);
        assert_eq!((descriptor.width, descriptor.height), (256, 256));
        assert_eq!(descriptor.workgroup, WorkgroupExtent::SIXTEEN);
        assert_eq!(descriptor.kernel, "tunnel");
        assert_eq!(descriptor.image_count, 2);
    }

    #[test]
    fn workgroup_limits_are_enforced() {
        let limits = wgpu::Limits::default();
        assert!(WorkgroupExtent::EIGHT.check_limits(&limits).is_ok());
        assert!(WorkgroupExtent::SIXTEEN.check_limits(&limits).is_ok());
        assert!(WorkgroupExtent::new(0, 8).check_limits(&limits).is_err());
        assert!(WorkgroupExtent::square(32).check_limits(&limits).is_err());
    }

    #[test]
    fn surface_format_names_match_wgsl() {
        assert_eq!(SurfaceFormat::default().wgsl_name(), "rgba16float");
        assert_eq!(SurfaceFormat::Rgba16Float.bytes_per_texel(), 8);
        assert!(!SurfaceFormat::Rgba32Float.is_filterable());
    }
}
