use crate::clock::{delta_source_for, BoxedDeltaSource, TimingPolicy};
use crate::registry::{FrameContext, RendererRegistry};

/// What a single [`FrameDriver::render_frame`] call did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    pub delta_seconds: f32,
    /// Number of systems advanced this frame.
    pub systems: usize,
}

/// Owns the registry and the clock, and turns both into submitted frames.
///
/// Every frame samples one delta, records all systems into a single encoder
/// and submits it once, so uniform writes queued during recording land before
/// the dispatches that read them.
pub struct FrameDriver {
    registry: RendererRegistry,
    clock: BoxedDeltaSource,
    frame_index: u64,
}

impl FrameDriver {
    pub fn new(registry: RendererRegistry, policy: TimingPolicy) -> Self {
        Self::with_clock(registry, delta_source_for(policy))
    }

    pub fn with_clock(registry: RendererRegistry, clock: BoxedDeltaSource) -> Self {
        Self {
            registry,
            clock,
            frame_index: 0,
        }
    }

    pub fn registry(&self) -> &RendererRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut RendererRegistry {
        &mut self.registry
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame_index
    }

    pub fn render_frame(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> FrameReport {
        let delta_seconds = self.clock.next_delta().max(0.0);
        let frame_index = self.frame_index;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("procedural frame encoder"),
        });
        {
            let mut frame = FrameContext::new(delta_seconds, frame_index, queue, &mut encoder);
            self.registry.advance_all(&mut frame);
        }
        queue.submit(Some(encoder.finish()));

        self.frame_index += 1;
        tracing::trace!(frame = frame_index, delta_seconds, "submitted frame");
        FrameReport {
            frame_index,
            delta_seconds,
            systems: self.registry.len(),
        }
    }
}
