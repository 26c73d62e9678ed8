use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TexConfig {
    pub version: u32,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub kernels: KernelSettings,
    #[serde(default)]
    pub run: RunSettings,
    #[serde(default, rename = "renderer")]
    pub renderers: Vec<RendererConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default, deserialize_with = "deserialize_resolution_opt")]
    pub resolution: Option<Resolution>,
    #[serde(default, deserialize_with = "deserialize_workgroup_opt")]
    pub workgroup: Option<Workgroup>,
    #[serde(default)]
    pub format: Option<TextureFormat>,
    #[serde(default)]
    pub images: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KernelSettings {
    /// Extra directories scanned for `.wgsl` kernel files, in order.
    #[serde(default)]
    pub directories: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RunSettings {
    /// Frame rate cap; zero runs uncapped.
    #[serde(default)]
    pub fps: Option<f32>,
    #[serde(default, deserialize_with = "deserialize_duration_opt")]
    pub duration: Option<Duration>,
    #[serde(default)]
    pub frames: Option<u64>,
    /// Advance every frame by this step instead of measuring wall time.
    #[serde(default, deserialize_with = "deserialize_duration_opt")]
    pub fixed_step: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_duration_opt")]
    pub max_delta: Option<Duration>,
}

impl RunSettings {
    pub const DEFAULT_FPS: f32 = 60.0;
    /// Slowest non-zero frame rate; below it the frame interval overflows.
    pub const MIN_FPS: f32 = 0.001;
    pub const DEFAULT_MAX_DELTA: Duration = Duration::from_millis(250);

    pub fn fps(&self) -> f32 {
        self.fps.unwrap_or(Self::DEFAULT_FPS)
    }

    pub fn max_delta(&self) -> Duration {
        self.max_delta.unwrap_or(Self::DEFAULT_MAX_DELTA)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RendererConfig {
    pub name: String,
    pub kernel: String,
    #[serde(default, deserialize_with = "deserialize_resolution_opt")]
    pub resolution: Option<Resolution>,
    #[serde(default, deserialize_with = "deserialize_workgroup_opt")]
    pub workgroup: Option<Workgroup>,
    #[serde(default)]
    pub format: Option<TextureFormat>,
    #[serde(default)]
    pub images: Option<usize>,
    #[serde(default)]
    pub parameters: PartialParameters,
    #[serde(default)]
    pub automation: Vec<Keyframe>,
}

/// Surface size in pixels. Written as `512` (square) or `"1024x512"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const DEFAULT: Resolution = Resolution {
        width: 512,
        height: 512,
    };

    pub const fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Workgroup extent. Written as `8` (square) or `"16x16"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Workgroup {
    pub x: u32,
    pub y: u32,
}

impl fmt::Display for Workgroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureFormat {
    #[default]
    Rgba16Float,
    Rgba32Float,
    Rgba8Unorm,
}

impl std::str::FromStr for TextureFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rgba16float" | "rgba16f" | "half" => Ok(TextureFormat::Rgba16Float),
            "rgba32float" | "rgba32f" | "float" => Ok(TextureFormat::Rgba32Float),
            "rgba8unorm" | "rgba8" => Ok(TextureFormat::Rgba8Unorm),
            other => Err(format!(
                "unknown texture format '{other}'; expected rgba16float, rgba32float or rgba8unorm"
            )),
        }
    }
}

/// Complete effect parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParameterValues {
    pub intensity: f32,
    pub jitter: f32,
    pub density: f32,
    pub amount: f32,
}

impl ParameterValues {
    pub const DEFAULT: ParameterValues = ParameterValues {
        intensity: 2.2,
        jitter: 0.0,
        density: 0.0,
        amount: 1.0,
    };

    pub fn lerp(self, other: ParameterValues, t: f32) -> ParameterValues {
        let mix = |a: f32, b: f32| a + (b - a) * t;
        ParameterValues {
            intensity: mix(self.intensity, other.intensity),
            jitter: mix(self.jitter, other.jitter),
            density: mix(self.density, other.density),
            amount: mix(self.amount, other.amount),
        }
    }
}

impl Default for ParameterValues {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Parameter overrides; unset fields keep whatever value they had.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct PartialParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f32>,
}

impl PartialParameters {
    pub fn apply_to(&self, base: ParameterValues) -> ParameterValues {
        ParameterValues {
            intensity: self.intensity.unwrap_or(base.intensity),
            jitter: self.jitter.unwrap_or(base.jitter),
            density: self.density.unwrap_or(base.density),
            amount: self.amount.unwrap_or(base.amount),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.intensity.is_none()
            && self.jitter.is_none()
            && self.density.is_none()
            && self.amount.is_none()
    }

    fn values(&self) -> impl Iterator<Item = (&'static str, f32)> {
        [
            ("intensity", self.intensity),
            ("jitter", self.jitter),
            ("density", self.density),
            ("amount", self.amount),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|value| (name, value)))
    }
}

/// Easing applied between the previous keyframe and this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Curve {
    /// Jump to the keyframe's values when it is reached.
    Step,
    #[default]
    Linear,
    Smoothstep,
    #[serde(alias = "ease-in-out", alias = "ease_in_out")]
    EaseInOut,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Keyframe {
    /// Offset from the start of the run.
    #[serde(deserialize_with = "deserialize_duration")]
    pub at: Duration,
    #[serde(default)]
    pub curve: Curve,
    #[serde(default)]
    pub intensity: Option<f32>,
    #[serde(default)]
    pub jitter: Option<f32>,
    #[serde(default)]
    pub density: Option<f32>,
    #[serde(default)]
    pub amount: Option<f32>,
}

impl Keyframe {
    pub fn values(&self) -> PartialParameters {
        PartialParameters {
            intensity: self.intensity,
            jitter: self.jitter,
            density: self.density,
            amount: self.amount,
        }
    }
}

/// A renderer entry with every default filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRenderer {
    pub name: String,
    pub kernel: String,
    pub resolution: Resolution,
    /// `None` leaves the choice to the kernel's preferred extent.
    pub workgroup: Option<Workgroup>,
    pub format: TextureFormat,
    pub images: usize,
    pub parameters: ParameterValues,
}

impl RendererConfig {
    pub const DEFAULT_IMAGES: usize = 2;

    pub fn resolved(&self, defaults: &Defaults) -> ResolvedRenderer {
        ResolvedRenderer {
            name: self.name.clone(),
            kernel: self.kernel.clone(),
            resolution: self
                .resolution
                .or(defaults.resolution)
                .unwrap_or(Resolution::DEFAULT),
            workgroup: self.workgroup.or(defaults.workgroup),
            format: self.format.or(defaults.format).unwrap_or_default(),
            images: self
                .images
                .or(defaults.images)
                .unwrap_or(Self::DEFAULT_IMAGES),
            parameters: self.parameters.apply_to(ParameterValues::DEFAULT),
        }
    }
}

impl TexConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: TexConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn renderer(&self, name: &str) -> Option<&RendererConfig> {
        self.renderers.iter().find(|renderer| renderer.name == name)
    }

    pub fn resolved_renderers(&self) -> Vec<ResolvedRenderer> {
        self.renderers
            .iter()
            .map(|renderer| renderer.resolved(&self.defaults))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.renderers.is_empty() {
            return Err(ConfigError::Invalid(
                "config must define at least one [[renderer]]".into(),
            ));
        }

        validate_images("defaults.images", self.defaults.images)?;
        validate_resolution("defaults.resolution", self.defaults.resolution)?;
        validate_workgroup("defaults.workgroup", self.defaults.workgroup)?;

        if let Some(fps) = self.run.fps {
            if !fps.is_finite() || fps < 0.0 {
                return Err(ConfigError::Invalid("run.fps must be >= 0".into()));
            }
            if fps > 0.0 && fps < RunSettings::MIN_FPS {
                return Err(ConfigError::Invalid(format!(
                    "run.fps must be 0 (uncapped) or at least {}, got {fps}",
                    RunSettings::MIN_FPS
                )));
            }
        }
        if matches!(self.run.fixed_step, Some(step) if step.is_zero()) {
            return Err(ConfigError::Invalid(
                "run.fixed_step must be greater than zero".into(),
            ));
        }

        let mut names = BTreeSet::new();
        for renderer in &self.renderers {
            let name = renderer.name.trim();
            if name.is_empty() {
                return Err(ConfigError::Invalid(
                    "renderer name may not be empty".into(),
                ));
            }
            if !names.insert(name) {
                return Err(ConfigError::Invalid(format!(
                    "renderer '{name}' is defined more than once"
                )));
            }
            if renderer.kernel.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "renderer '{name}' must name a kernel"
                )));
            }

            validate_images(&format!("renderer '{name}' images"), renderer.images)?;
            validate_resolution(&format!("renderer '{name}' resolution"), renderer.resolution)?;
            validate_workgroup(&format!("renderer '{name}' workgroup"), renderer.workgroup)?;
            validate_values(&format!("renderer '{name}' parameters"), &renderer.parameters)?;

            for (index, keyframe) in renderer.automation.iter().enumerate() {
                let values = keyframe.values();
                if values.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "renderer '{name}' automation keyframe #{index} sets no parameters"
                    )));
                }
                validate_values(
                    &format!("renderer '{name}' automation keyframe #{index}"),
                    &values,
                )?;
            }
        }

        Ok(())
    }
}

fn validate_images(context: &str, images: Option<usize>) -> Result<(), ConfigError> {
    match images {
        Some(count) if count < 2 => Err(ConfigError::Invalid(format!(
            "{context} must be at least 2, got {count}"
        ))),
        _ => Ok(()),
    }
}

fn validate_resolution(context: &str, resolution: Option<Resolution>) -> Result<(), ConfigError> {
    match resolution {
        Some(size) if size.width == 0 || size.height == 0 => Err(ConfigError::Invalid(format!(
            "{context} must be non-zero, got {size}"
        ))),
        _ => Ok(()),
    }
}

fn validate_workgroup(context: &str, workgroup: Option<Workgroup>) -> Result<(), ConfigError> {
    match workgroup {
        Some(extent) if extent.x == 0 || extent.y == 0 => Err(ConfigError::Invalid(format!(
            "{context} must be non-zero, got {extent}"
        ))),
        _ => Ok(()),
    }
}

fn validate_values(context: &str, values: &PartialParameters) -> Result<(), ConfigError> {
    for (field, value) in values.values() {
        if !value.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "{context} {field} must be a finite number"
            )));
        }
    }
    Ok(())
}

/// Parses `"1024x512"`, `"1024X512"` or a single number for a square size.
pub fn parse_dimensions(raw: &str) -> Result<(u32, u32), String> {
    let trimmed = raw.trim();
    let parse = |part: &str| {
        part.trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid size '{raw}'; expected N or WxH"))
    };
    match trimmed.split_once(['x', 'X']) {
        Some((width, height)) => Ok((parse(width)?, parse(height)?)),
        None => {
            let size = parse(trimmed)?;
            Ok((size, size))
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeHelper {
    Str(String),
    Num(i64),
}

fn deserialize_size_opt<'de, D>(deserializer: D) -> Result<Option<(u32, u32)>, D::Error>
where
    D: Deserializer<'de>,
{
    let helper: Option<SizeHelper> = Option::deserialize(deserializer)?;
    match helper {
        None => Ok(None),
        Some(SizeHelper::Str(raw)) => parse_dimensions(&raw).map(Some).map_err(de::Error::custom),
        Some(SizeHelper::Num(value)) => u32::try_from(value)
            .map(|size| Some((size, size)))
            .map_err(|_| de::Error::custom(format!("size {value} is out of range"))),
    }
}

fn deserialize_resolution_opt<'de, D>(deserializer: D) -> Result<Option<Resolution>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_size_opt(deserializer)?.map(|(width, height)| Resolution { width, height }))
}

fn deserialize_workgroup_opt<'de, D>(deserializer: D) -> Result<Option<Workgroup>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_size_opt(deserializer)?.map(|(x, y)| Workgroup { x, y }))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_duration_opt(deserializer)?
        .ok_or_else(|| de::Error::custom("a duration is required"))
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Duration::try_from_secs_f64(v)
                .map(Some)
                .map_err(|_| E::custom(format!("duration {v} is out of range")))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[defaults]
resolution = 256
workgroup = "16x16"
format = "rgba8unorm"

[kernels]
directories = ["kernels", "/opt/effects"]

[run]
fps = 30
duration = "5s"
fixed_step = "16ms"

[[renderer]]
name = "sphere"
kernel = "fancy_fractal"
resolution = "1024x512"
workgroup = 8

[renderer.parameters]
intensity = 5.0
jitter = 0.1

[[renderer.automation]]
at = "2s"
curve = "smoothstep"
intensity = 8

[[renderer.automation]]
at = 4.5
density = 0.75

[[renderer]]
name = "tunnel"
kernel = "tunnel"
images = 3
"#;

    #[test]
    fn parses_sample_config() {
        let config = TexConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.version, 1);
        assert_eq!(config.renderers.len(), 2);
        assert_eq!(config.kernels.directories.len(), 2);
        assert_eq!(config.run.fps(), 30.0);
        assert_eq!(config.run.duration, Some(Duration::from_secs(5)));
        assert_eq!(config.run.fixed_step, Some(Duration::from_millis(16)));
        assert_eq!(config.run.max_delta(), RunSettings::DEFAULT_MAX_DELTA);

        let sphere = config.renderer("sphere").unwrap();
        assert_eq!(sphere.automation.len(), 2);
        assert_eq!(sphere.automation[0].curve, Curve::Smoothstep);
        assert_eq!(sphere.automation[0].intensity, Some(8.0));
        assert_eq!(sphere.automation[1].at, Duration::from_millis(4500));
        assert_eq!(sphere.automation[1].curve, Curve::Linear);
    }

    #[test]
    fn resolves_renderers_with_defaults() {
        let config = TexConfig::from_toml_str(SAMPLE).unwrap();
        let resolved = config.resolved_renderers();

        let sphere = &resolved[0];
        assert_eq!(sphere.resolution, Resolution { width: 1024, height: 512 });
        assert_eq!(sphere.workgroup, Some(Workgroup { x: 8, y: 8 }));
        assert_eq!(sphere.format, TextureFormat::Rgba8Unorm);
        assert_eq!(sphere.images, 2);
        assert_eq!(
            sphere.parameters,
            ParameterValues {
                intensity: 5.0,
                jitter: 0.1,
                density: 0.0,
                amount: 1.0,
            }
        );

        let tunnel = &resolved[1];
        assert_eq!(tunnel.resolution, Resolution::square(256));
        assert_eq!(tunnel.workgroup, Some(Workgroup { x: 16, y: 16 }));
        assert_eq!(tunnel.images, 3);
        assert_eq!(tunnel.parameters, ParameterValues::DEFAULT);
    }

    #[test]
    fn bare_renderer_uses_builtin_defaults() {
        let config = TexConfig::from_toml_str(
            r#"
version = 1

[[renderer]]
name = "only"
kernel = "tunnel"
"#,
        )
        .unwrap();
        let resolved = config.resolved_renderers().remove(0);
        assert_eq!(resolved.resolution, Resolution::DEFAULT);
        assert_eq!(resolved.workgroup, None);
        assert_eq!(resolved.format, TextureFormat::Rgba16Float);
        assert_eq!(config.run.fps(), RunSettings::DEFAULT_FPS);
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = TexConfig::from_toml_str("version = 2\n[[renderer]]\nname = \"a\"\nkernel = \"k\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("version")));
    }

    #[test]
    fn rejects_config_without_renderers() {
        let err = TexConfig::from_toml_str("version = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_duplicate_renderer_names() {
        let config = r#"
version = 1

[[renderer]]
name = "fx"
kernel = "tunnel"

[[renderer]]
name = "fx"
kernel = "effect_sphere"
"#;
        let err = TexConfig::from_toml_str(config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("more than once")));
    }

    #[test]
    fn rejects_single_image_surface() {
        let config = r#"
version = 1

[[renderer]]
name = "fx"
kernel = "tunnel"
images = 1
"#;
        assert!(matches!(
            TexConfig::from_toml_str(config),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_zero_workgroup_and_empty_keyframe() {
        let zero = r#"
version = 1

[defaults]
workgroup = "0x8"

[[renderer]]
name = "fx"
kernel = "tunnel"
"#;
        assert!(TexConfig::from_toml_str(zero).is_err());

        let empty_keyframe = r#"
version = 1

[[renderer]]
name = "fx"
kernel = "tunnel"

[[renderer.automation]]
at = "1s"
"#;
        assert!(TexConfig::from_toml_str(empty_keyframe).is_err());
    }

    #[test]
    fn rejects_malformed_values() {
        let negative_fps = "version = 1\n[run]\nfps = -1\n[[renderer]]\nname = \"a\"\nkernel = \"k\"\n";
        assert!(matches!(
            TexConfig::from_toml_str(negative_fps),
            Err(ConfigError::Invalid(_))
        ));

        let bad_duration = "version = 1\n[run]\nduration = \"soon\"\n[[renderer]]\nname = \"a\"\nkernel = \"k\"\n";
        assert!(matches!(
            TexConfig::from_toml_str(bad_duration),
            Err(ConfigError::Parse(_))
        ));

        let bad_format = "version = 1\n[[renderer]]\nname = \"a\"\nkernel = \"k\"\nformat = \"bgra8\"\n";
        assert!(matches!(
            TexConfig::from_toml_str(bad_format),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_durations() {
        let infinite = "version = 1\n[run]\nduration = inf\n[[renderer]]\nname = \"a\"\nkernel = \"k\"\n";
        assert!(matches!(
            TexConfig::from_toml_str(infinite),
            Err(ConfigError::Parse(_))
        ));

        let huge_keyframe = "version = 1\n[[renderer]]\nname = \"a\"\nkernel = \"k\"\n[[renderer.automation]]\nat = 1e300\nintensity = 1.0\n";
        assert!(matches!(
            TexConfig::from_toml_str(huge_keyframe),
            Err(ConfigError::Parse(_))
        ));

        let nan_step = "version = 1\n[run]\nfixed_step = nan\n[[renderer]]\nname = \"a\"\nkernel = \"k\"\n";
        assert!(TexConfig::from_toml_str(nan_step).is_err());
    }

    #[test]
    fn rejects_vanishing_frame_rate() {
        let tiny = "version = 1\n[run]\nfps = 1e-40\n[[renderer]]\nname = \"a\"\nkernel = \"k\"\n";
        assert!(matches!(
            TexConfig::from_toml_str(tiny),
            Err(ConfigError::Invalid(message)) if message.contains("run.fps")
        ));

        let slow = "version = 1\n[run]\nfps = 0.5\n[[renderer]]\nname = \"a\"\nkernel = \"k\"\n";
        assert_eq!(TexConfig::from_toml_str(slow).unwrap().run.fps(), 0.5);
    }

    #[test]
    fn parses_dimension_strings() {
        assert_eq!(parse_dimensions("512"), Ok((512, 512)));
        assert_eq!(parse_dimensions("1920x1080"), Ok((1920, 1080)));
        assert_eq!(parse_dimensions(" 32X4 "), Ok((32, 4)));
        assert!(parse_dimensions("wide").is_err());
        assert!(parse_dimensions("10x").is_err());
    }

    #[test]
    fn texture_format_accepts_aliases() {
        assert_eq!("rgba16f".parse(), Ok(TextureFormat::Rgba16Float));
        assert_eq!("RGBA8".parse(), Ok(TextureFormat::Rgba8Unorm));
        assert!("bgra8unorm".parse::<TextureFormat>().is_err());
    }

    #[test]
    fn partial_parameters_fill_from_base() {
        let partial = PartialParameters {
            density: Some(0.5),
            ..PartialParameters::default()
        };
        let applied = partial.apply_to(ParameterValues::DEFAULT);
        assert_eq!(applied.density, 0.5);
        assert_eq!(applied.intensity, 2.2);
        assert!(PartialParameters::default().is_empty());
    }
}
