use std::time::{Duration, Instant};

/// How frame deltas are produced for the driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimingPolicy {
    /// Measure real elapsed time between frames, clamped to `max_delta`
    /// so a stalled frame does not fast-forward every effect.
    WallClock { max_delta: Duration },
    /// Advance by the same step every frame; output is reproducible.
    Fixed { step: Duration },
}

impl TimingPolicy {
    pub const DEFAULT_MAX_DELTA: Duration = Duration::from_millis(250);
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self::WallClock {
            max_delta: Self::DEFAULT_MAX_DELTA,
        }
    }
}

/// Abstraction over where frame deltas originate from.
pub trait DeltaSource: Send {
    /// Forgets any previous sample; the next delta is measured from now.
    fn reset(&mut self);
    /// Seconds since the previous call. Never negative.
    fn next_delta(&mut self) -> f32;
}

/// Delta source backed by the monotonic system clock.
///
/// The first delta after creation or reset is zero.
#[derive(Debug, Clone, Copy)]
pub struct SystemDeltaSource {
    last: Option<Instant>,
    max_delta: Duration,
}

impl SystemDeltaSource {
    pub fn new(max_delta: Duration) -> Self {
        Self {
            last: None,
            max_delta,
        }
    }

    fn delta_at(&mut self, now: Instant) -> f32 {
        let elapsed = match self.last {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::ZERO,
        };
        self.last = Some(now);
        if elapsed > self.max_delta {
            tracing::trace!(?elapsed, max = ?self.max_delta, "clamped frame delta");
        }
        elapsed.min(self.max_delta).as_secs_f32()
    }
}

impl Default for SystemDeltaSource {
    fn default() -> Self {
        Self::new(TimingPolicy::DEFAULT_MAX_DELTA)
    }
}

impl DeltaSource for SystemDeltaSource {
    fn reset(&mut self) {
        self.last = None;
    }

    fn next_delta(&mut self) -> f32 {
        self.delta_at(Instant::now())
    }
}

/// Delta source that always reports the same step.
#[derive(Debug, Clone, Copy)]
pub struct FixedDeltaSource {
    step: f32,
}

impl FixedDeltaSource {
    pub fn new(step: Duration) -> Self {
        Self {
            step: step.as_secs_f32(),
        }
    }

    pub fn step(&self) -> f32 {
        self.step
    }
}

impl DeltaSource for FixedDeltaSource {
    fn reset(&mut self) {}

    fn next_delta(&mut self) -> f32 {
        self.step
    }
}

pub type BoxedDeltaSource = Box<dyn DeltaSource>;

/// Builds the delta source matching a timing policy.
pub fn delta_source_for(policy: TimingPolicy) -> BoxedDeltaSource {
    match policy {
        TimingPolicy::WallClock { max_delta } => Box::new(SystemDeltaSource::new(max_delta)),
        TimingPolicy::Fixed { step } => Box::new(FixedDeltaSource::new(step)),
    }
}
