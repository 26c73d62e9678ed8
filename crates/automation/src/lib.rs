//! Keyframed effect parameter automation.
//!
//! A [`ParameterTimeline`] holds one track per configured renderer. Each
//! track starts from the renderer's initial parameters at time zero and eases
//! towards every keyframe in turn; values a keyframe leaves unset carry over
//! from the previous one. An [`AutomationPlayer`] samples the timeline against
//! a start instant and reports only the renderers whose values changed.

use std::time::{Duration, Instant};

use texconfig::{Curve, ParameterValues, TexConfig};

#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error("renderer '{renderer}' keyframe #{index} at {at:?} comes before the previous keyframe")]
    OutOfOrder {
        renderer: String,
        index: usize,
        at: Duration,
    },
}

/// Maps linear progress in `0..=1` through an easing curve.
pub fn ease(curve: Curve, t: f32) -> f32 {
    let clamped = t.clamp(0.0, 1.0);
    match curve {
        Curve::Step => {
            if clamped >= 1.0 {
                1.0
            } else {
                0.0
            }
        }
        Curve::Linear => clamped,
        Curve::Smoothstep => clamped * clamped * (3.0 - 2.0 * clamped),
        Curve::EaseInOut => {
            if clamped < 0.5 {
                2.0 * clamped * clamped
            } else {
                -1.0 + (4.0 - 2.0 * clamped) * clamped
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TrackKey {
    at: Duration,
    curve: Curve,
    values: ParameterValues,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterTrack {
    renderer: String,
    initial: ParameterValues,
    keys: Vec<TrackKey>,
}

impl ParameterTrack {
    pub fn renderer(&self) -> &str {
        &self.renderer
    }

    pub fn is_static(&self) -> bool {
        self.keys.is_empty()
    }

    /// Time of the last keyframe; values hold steady afterwards.
    pub fn end(&self) -> Duration {
        self.keys.last().map_or(Duration::ZERO, |key| key.at)
    }

    pub fn sample(&self, elapsed: Duration) -> ParameterValues {
        let mut from_at = Duration::ZERO;
        let mut from = self.initial;
        for key in &self.keys {
            if elapsed < key.at {
                let span = (key.at - from_at).as_secs_f32();
                let progress = (elapsed - from_at).as_secs_f32() / span.max(f32::EPSILON);
                return from.lerp(key.values, ease(key.curve, progress));
            }
            from_at = key.at;
            from = key.values;
        }
        from
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterTimeline {
    tracks: Vec<ParameterTrack>,
}

impl ParameterTimeline {
    pub fn from_config(config: &TexConfig) -> Result<Self, AutomationError> {
        let mut tracks = Vec::with_capacity(config.renderers.len());
        for renderer in &config.renderers {
            let initial = renderer.resolved(&config.defaults).parameters;
            let mut keys: Vec<TrackKey> = Vec::with_capacity(renderer.automation.len());
            let mut carried = initial;
            for (index, keyframe) in renderer.automation.iter().enumerate() {
                if keys.last().is_some_and(|previous| keyframe.at < previous.at) {
                    return Err(AutomationError::OutOfOrder {
                        renderer: renderer.name.clone(),
                        index,
                        at: keyframe.at,
                    });
                }
                carried = keyframe.values().apply_to(carried);
                keys.push(TrackKey {
                    at: keyframe.at,
                    curve: keyframe.curve,
                    values: carried,
                });
            }
            tracks.push(ParameterTrack {
                renderer: renderer.name.clone(),
                initial,
                keys,
            });
        }
        Ok(Self { tracks })
    }

    pub fn tracks(&self) -> &[ParameterTrack] {
        &self.tracks
    }

    pub fn is_static(&self) -> bool {
        self.tracks.iter().all(ParameterTrack::is_static)
    }

    pub fn end(&self) -> Duration {
        self.tracks
            .iter()
            .map(ParameterTrack::end)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    pub fn sample(&self, elapsed: Duration) -> Vec<(&str, ParameterValues)> {
        self.tracks
            .iter()
            .map(|track| (track.renderer(), track.sample(elapsed)))
            .collect()
    }
}

/// New values for one renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterUpdate {
    pub renderer: String,
    pub values: ParameterValues,
}

/// Plays a timeline against wall-clock time, emitting changes only.
pub struct AutomationPlayer {
    timeline: ParameterTimeline,
    started_at: Instant,
    last: Vec<Option<ParameterValues>>,
}

impl AutomationPlayer {
    pub fn new(timeline: ParameterTimeline, started_at: Instant) -> Self {
        let last = vec![None; timeline.tracks.len()];
        Self {
            timeline,
            started_at,
            last,
        }
    }

    pub fn timeline(&self) -> &ParameterTimeline {
        &self.timeline
    }

    /// True once every track has reached its final keyframe and that value
    /// has been reported.
    pub fn finished(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) >= self.timeline.end()
            && self
                .timeline
                .tracks
                .iter()
                .zip(&self.last)
                .all(|(track, last)| track.is_static() || last.is_some())
    }

    pub fn tick(&mut self, now: Instant) -> Vec<ParameterUpdate> {
        self.tick_at(now.saturating_duration_since(self.started_at))
    }

    pub fn tick_at(&mut self, elapsed: Duration) -> Vec<ParameterUpdate> {
        let mut updates = Vec::new();
        for (track, last) in self.timeline.tracks.iter().zip(self.last.iter_mut()) {
            if track.is_static() {
                continue;
            }
            let values = track.sample(elapsed);
            if *last != Some(values) {
                *last = Some(values);
                updates.push(ParameterUpdate {
                    renderer: track.renderer.clone(),
                    values,
                });
            }
        }
        updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
version = 1

[[renderer]]
name = "sphere"
kernel = "fancy_fractal"

[renderer.parameters]
intensity = 2.0

[[renderer.automation]]
at = "2s"
intensity = 4.0
jitter = 0.2

[[renderer.automation]]
at = "3s"
curve = "step"
density = 1.0

[[renderer]]
name = "tunnel"
kernel = "tunnel"
"#;

    fn timeline() -> ParameterTimeline {
        let config = TexConfig::from_toml_str(CONFIG).unwrap();
        ParameterTimeline::from_config(&config).unwrap()
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn linear_track_interpolates_between_keys() {
        let timeline = timeline();
        let track = &timeline.tracks()[0];
        assert_eq!(track.sample(Duration::ZERO).intensity, 2.0);

        let mid = track.sample(Duration::from_secs(1));
        assert!(close(mid.intensity, 3.0));
        assert!(close(mid.jitter, 0.1));

        let at_key = track.sample(Duration::from_secs(2));
        assert!(close(at_key.intensity, 4.0));
        assert!(close(at_key.jitter, 0.2));
    }

    #[test]
    fn step_curve_holds_until_keyframe_and_carries_values() {
        let timeline = timeline();
        let track = &timeline.tracks()[0];
        let before = track.sample(Duration::from_millis(2_999));
        assert_eq!(before.density, 0.0);
        let after = track.sample(Duration::from_secs(3));
        assert_eq!(after.density, 1.0);
        assert!(close(after.intensity, 4.0));
        assert!(close(after.jitter, 0.2));
        assert_eq!(track.sample(Duration::from_secs(60)), after);
    }

    #[test]
    fn timeline_reports_end_and_static_tracks() {
        let timeline = timeline();
        assert_eq!(timeline.end(), Duration::from_secs(3));
        assert!(!timeline.is_static());
        assert!(timeline.tracks()[1].is_static());
        let sampled = timeline.sample(Duration::from_secs(10));
        assert_eq!(sampled[1], ("tunnel", ParameterValues::DEFAULT));
    }

    #[test]
    fn player_emits_only_changes() {
        let mut player = AutomationPlayer::new(timeline(), Instant::now());
        let first = player.tick_at(Duration::ZERO);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].renderer, "sphere");

        assert!(player.tick_at(Duration::ZERO).is_empty());
        assert_eq!(player.tick_at(Duration::from_millis(500)).len(), 1);

        player.tick_at(Duration::from_secs(5));
        assert!(player.tick_at(Duration::from_secs(6)).is_empty());
    }

    #[test]
    fn player_finishes_after_last_keyframe() {
        let start = Instant::now();
        let mut player = AutomationPlayer::new(timeline(), start);
        assert!(!player.finished(start + Duration::from_secs(1)));
        player.tick(start + Duration::from_secs(4));
        assert!(player.finished(start + Duration::from_secs(4)));
    }

    #[test]
    fn out_of_order_keyframes_are_rejected() {
        let config = TexConfig::from_toml_str(
            r#"
version = 1

[[renderer]]
name = "fx"
kernel = "tunnel"

[[renderer.automation]]
at = "3s"
intensity = 1.0

[[renderer.automation]]
at = "1s"
intensity = 2.0
"#,
        )
        .unwrap();
        let err = ParameterTimeline::from_config(&config).unwrap_err();
        assert!(matches!(err, AutomationError::OutOfOrder { index: 1, .. }));
    }

    #[test]
    fn coincident_keyframes_jump() {
        let config = TexConfig::from_toml_str(
            r#"
version = 1

[[renderer]]
name = "fx"
kernel = "tunnel"

[[renderer.automation]]
at = 0
intensity = 9.0
"#,
        )
        .unwrap();
        let timeline = ParameterTimeline::from_config(&config).unwrap();
        assert_eq!(timeline.tracks()[0].sample(Duration::ZERO).intensity, 9.0);
    }

    #[test]
    fn easing_curves_hit_endpoints() {
        for curve in [Curve::Linear, Curve::Smoothstep, Curve::EaseInOut] {
            assert!(close(ease(curve, 0.0), 0.0));
            assert!(close(ease(curve, 1.0), 1.0));
            assert!(close(ease(curve, 0.5), 0.5));
        }
        assert_eq!(ease(Curve::Step, 0.99), 0.0);
        assert_eq!(ease(Curve::Step, 1.0), 1.0);
        assert!(ease(Curve::EaseInOut, 0.25) < 0.25);
    }
}
