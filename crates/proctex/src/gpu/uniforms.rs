use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytemuck::{Pod, Zeroable};

/// Host mirror of the `EffectUniforms` block every kernel is compiled against.
///
/// The WGSL declaration is generated from [`EffectUniforms::WGSL_STRUCT`] by
/// the kernel prelude, so the two layouts are defined side by side. The three
/// trailing floats pad the block to a 16-byte multiple for uniform binding.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct EffectUniforms {
    pub time: f32,
    pub intensity: f32,
    pub jitter: f32,
    pub density: f32,
    pub amount: f32,
    pub pad0: f32,
    pub pad1: f32,
    pub pad2: f32,
}

impl EffectUniforms {
    pub const SIZE: u64 = std::mem::size_of::<EffectUniforms>() as u64;

    pub const WGSL_STRUCT: &'static str = r"struct EffectUniforms {
    time: f32,
    intensity: f32,
    jitter: f32,
    density: f32,
    amount: f32,
    pad0: f32,
    pad1: f32,
    pad2: f32,
};
";

    pub fn new(time: f32, parameters: EffectParameters) -> Self {
        Self {
            time,
            intensity: parameters.intensity,
            jitter: parameters.jitter,
            density: parameters.density,
            amount: parameters.amount,
            pad0: 0.0,
            pad1: 0.0,
            pad2: 0.0,
        }
    }

    pub fn parameters(&self) -> EffectParameters {
        EffectParameters {
            intensity: self.intensity,
            jitter: self.jitter,
            density: self.density,
            amount: self.amount,
        }
    }
}

impl Default for EffectUniforms {
    fn default() -> Self {
        Self::new(0.0, EffectParameters::default())
    }
}

/// User-adjustable effect parameters.
///
/// Intended ranges: intensity 1–10, jitter 0–0.3, density 0–1, amount 1–5.
/// Values are passed to the kernel as-is; clamping is the caller's business.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectParameters {
    pub intensity: f32,
    pub jitter: f32,
    pub density: f32,
    pub amount: f32,
}

impl EffectParameters {
    pub const fn new(intensity: f32, jitter: f32, density: f32, amount: f32) -> Self {
        Self {
            intensity,
            jitter,
            density,
            amount,
        }
    }
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self::new(2.2, 0.0, 0.0, 1.0)
    }
}

/// Shared staging cell for one renderer's effect parameters.
///
/// Cheap to clone and safe to hand to a UI thread. Writers overwrite whole
/// fields under a short lock and never wait on the GPU; the render thread
/// takes one snapshot per frame.
#[derive(Clone, Debug, Default)]
pub struct ParameterHandle {
    cell: Arc<Mutex<EffectParameters>>,
}

impl ParameterHandle {
    pub fn new(initial: EffectParameters) -> Self {
        Self {
            cell: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn set_parameters(&self, intensity: f32, jitter: f32, density: f32, amount: f32) {
        self.set(EffectParameters::new(intensity, jitter, density, amount));
    }

    pub fn set(&self, parameters: EffectParameters) {
        *self.lock() = parameters;
    }

    /// Overwrites only the intensity, leaving the other fields as staged.
    pub fn set_intensity(&self, intensity: f32) {
        self.lock().intensity = intensity;
    }

    pub fn snapshot(&self) -> EffectParameters {
        *self.lock()
    }

    /// True when both handles stage into the same cell.
    pub fn shares_cell_with(&self, other: &ParameterHandle) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    // A panicking writer cannot leave a half-written `Copy` value behind, so a
    // poisoned lock still holds a consistent block.
    fn lock(&self) -> MutexGuard<'_, EffectParameters> {
        self.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Render-side half of the uniform path: accumulated time plus the staged
/// parameters, folded into a complete block once per frame.
#[derive(Debug)]
pub struct UniformStage {
    time: f32,
    parameters: ParameterHandle,
}

impl UniformStage {
    pub fn new(parameters: EffectParameters) -> Self {
        Self {
            time: 0.0,
            parameters: ParameterHandle::new(parameters),
        }
    }

    /// Accumulates `delta_seconds` and returns the full block for upload.
    pub fn advance(&mut self, delta_seconds: f32) -> EffectUniforms {
        debug_assert!(
            delta_seconds >= 0.0,
            "frame delta must be non-negative, got {delta_seconds}"
        );
        self.time += delta_seconds;
        EffectUniforms::new(self.time, self.parameters.snapshot())
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn handle(&self) -> ParameterHandle {
        self.parameters.clone()
    }
}
