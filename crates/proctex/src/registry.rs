//! Explicit ownership of the compute systems driven each frame.
//!
//! The frame driver owns a [`RendererRegistry`] and calls
//! [`RendererRegistry::advance_all`] once per displayed frame. Nothing registers
//! itself implicitly; whoever builds a renderer decides whether it is driven.

use std::fmt;

/// Per-frame recording context handed to every compute system.
pub struct FrameContext<'a> {
    /// Seconds elapsed since the previous frame; never negative.
    pub delta_seconds: f32,
    /// Monotonic frame counter assigned by the driver.
    pub frame_index: u64,
    pub queue: &'a wgpu::Queue,
    /// Encoder that collects every system's work for this frame.
    pub encoder: &'a mut wgpu::CommandEncoder,
}

impl<'a> FrameContext<'a> {
    pub fn new(
        delta_seconds: f32,
        frame_index: u64,
        queue: &'a wgpu::Queue,
        encoder: &'a mut wgpu::CommandEncoder,
    ) -> Self {
        Self {
            delta_seconds,
            frame_index,
            queue,
            encoder,
        }
    }
}

/// Anything that records GPU work once per frame.
pub trait ComputeSystem {
    fn label(&self) -> &str;

    /// Records this frame's work into `frame.encoder`. Called exactly once per
    /// frame and never concurrently for the same system.
    fn advance(&mut self, frame: &mut FrameContext<'_>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RendererId(u64);

impl fmt::Display for RendererId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "renderer#{}", self.0)
    }
}

struct RegistryEntry {
    id: RendererId,
    system: Box<dyn ComputeSystem>,
}

/// Ordered collection of active compute systems.
#[derive(Default)]
pub struct RendererRegistry {
    entries: Vec<RegistryEntry>,
    next_id: u64,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S>(&mut self, system: S) -> RendererId
    where
        S: ComputeSystem + 'static,
    {
        self.register_boxed(Box::new(system))
    }

    pub fn register_boxed(&mut self, system: Box<dyn ComputeSystem>) -> RendererId {
        let id = RendererId(self.next_id);
        self.next_id += 1;
        tracing::debug!(%id, label = system.label(), "registered compute system");
        self.entries.push(RegistryEntry { id, system });
        id
    }

    /// Stops driving a system and hands it back to the caller.
    pub fn remove(&mut self, id: RendererId) -> Option<Box<dyn ComputeSystem>> {
        let position = self.entries.iter().position(|entry| entry.id == id)?;
        let entry = self.entries.remove(position);
        tracing::debug!(%id, label = entry.system.label(), "removed compute system");
        Some(entry.system)
    }

    pub fn get(&self, id: RendererId) -> Option<&dyn ComputeSystem> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.system.as_ref())
    }

    pub fn ids(&self) -> impl Iterator<Item = RendererId> + '_ {
        self.entries.iter().map(|entry| entry.id)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|entry| entry.system.label())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Advances every registered system once, in registration order.
    pub fn advance_all(&mut self, frame: &mut FrameContext<'_>) {
        for entry in &mut self.entries {
            entry.system.advance(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl ComputeSystem for Named {
        fn label(&self) -> &str {
            self.0
        }

        fn advance(&mut self, _frame: &mut FrameContext<'_>) {}
    }

    #[test]
    fn registration_order_is_preserved() {
        let mut registry = RendererRegistry::new();
        registry.register(Named("sky"));
        registry.register(Named("sphere"));
        registry.register(Named("tunnel"));
        assert_eq!(registry.labels().collect::<Vec<_>>(), ["sky", "sphere", "tunnel"]);
    }

    #[test]
    fn removal_returns_system_and_keeps_ids_unique() {
        let mut registry = RendererRegistry::new();
        let first = registry.register(Named("first"));
        let second = registry.register(Named("second"));
        assert_ne!(first, second);

        let removed = registry.remove(first).expect("first system");
        assert_eq!(removed.label(), "first");
        assert!(registry.get(first).is_none());
        assert!(registry.remove(first).is_none());

        let third = registry.register(Named("third"));
        assert_ne!(third, first);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(second).map(|system| system.label()), Some("second"));
        assert_eq!(registry.ids().collect::<Vec<_>>(), [second, third]);
    }

    #[test]
    fn empty_registry_reports_empty() {
        let registry = RendererRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }
}
