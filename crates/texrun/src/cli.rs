use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use proctex::GpuPowerPreference;
use texconfig::{parse_dimensions, TextureFormat};

#[derive(Parser, Debug)]
#[command(
    name = "texrun",
    author,
    version,
    about = "Headless driver for GPU compute procedural textures",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Renderer configuration file; defaults to `texrun.toml` in the config directory.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run a single renderer with this kernel instead of loading a config file.
    #[arg(long, value_name = "NAME")]
    pub kernel: Option<String>,

    /// Surface size (e.g. `512` or `1024x512`). Applies to renderers that don't set one.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub resolution: Option<(u32, u32)>,

    /// Workgroup extent (e.g. `8` or `16x16`). Applies to renderers that don't set one.
    #[arg(long, value_name = "XxY", value_parser = parse_size)]
    pub workgroup: Option<(u32, u32)>,

    /// Storage format: `rgba16float` (default), `rgba32float` or `rgba8unorm`.
    #[arg(long, value_name = "FORMAT", value_parser = parse_format)]
    pub format: Option<TextureFormat>,

    /// Number of images each surface rotates through (at least 2).
    #[arg(long, value_name = "COUNT")]
    pub images: Option<usize>,

    /// Initial effect intensity for every renderer (intended range 1-10).
    #[arg(long, value_name = "VALUE", allow_negative_numbers = true)]
    pub intensity: Option<f32>,

    /// Initial effect jitter for every renderer (intended range 0-0.3).
    #[arg(long, value_name = "VALUE", allow_negative_numbers = true)]
    pub jitter: Option<f32>,

    /// Initial effect density for every renderer (intended range 0-1).
    #[arg(long, value_name = "VALUE", allow_negative_numbers = true)]
    pub density: Option<f32>,

    /// Initial effect amount for every renderer (intended range 1-5).
    #[arg(long, value_name = "VALUE", allow_negative_numbers = true)]
    pub amount: Option<f32>,

    /// Stop after this many frames.
    #[arg(long, value_name = "COUNT")]
    pub frames: Option<u64>,

    /// Stop after this much effect time (e.g. `5s`, `1500ms`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Frame rate cap (0=uncapped).
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,

    /// Advance every frame by a fixed step instead of wall-clock time.
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub fixed_step: Option<Duration>,

    /// Additional directory of `.wgsl` kernels (repeatable).
    #[arg(long = "kernel-dir", value_name = "DIR")]
    pub kernel_dirs: Vec<PathBuf>,

    /// Adapter power preference: `low` or `high`.
    #[arg(
        long,
        value_name = "PREFERENCE",
        value_parser = parse_power,
        default_value = "high"
    )]
    pub power: GpuPowerPreference,

    /// Use the software fallback adapter.
    #[arg(long)]
    pub fallback_adapter: bool,

    /// Write each renderer's final image to `<DIR>/<name>.png`.
    #[arg(long, value_name = "DIR")]
    pub export_dir: Option<PathBuf>,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the kernels available to renderers.
    Kernels(KernelsArgs),
    /// Validate a configuration file and print the resolved renderers.
    Check(CheckArgs),
    /// Print the resolved configuration directory and files.
    Where,
}

#[derive(Args, Debug)]
pub struct KernelsArgs {
    /// Also load the kernel directories named by this configuration file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Additional directory of `.wgsl` kernels (repeatable).
    #[arg(long = "kernel-dir", value_name = "DIR")]
    pub kernel_dirs: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Configuration file to check; defaults to `texrun.toml` in the config directory.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("size must not be empty".to_string());
    }
    let (x, y) = parse_dimensions(trimmed)?;
    if x == 0 || y == 0 {
        return Err(format!("size '{trimmed}' must be greater than zero"));
    }
    Ok((x, y))
}

pub fn parse_format(value: &str) -> Result<TextureFormat, String> {
    value.parse()
}

pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if seconds.is_nan() || seconds < 0.0 {
            return Err(format!("duration '{trimmed}' must be non-negative"));
        }
        return Duration::try_from_secs_f64(seconds)
            .map_err(|_| format!("duration '{trimmed}' is out of range"));
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid duration '{trimmed}': {err}"))
}

pub fn parse_power(value: &str) -> Result<GpuPowerPreference, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "low" | "low-power" | "integrated" => Ok(GpuPowerPreference::Low),
        "high" | "high-performance" | "discrete" => Ok(GpuPowerPreference::High),
        other => Err(format!(
            "unknown power preference '{other}'; expected low or high"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("512"), Ok((512, 512)));
        assert_eq!(parse_size("100x64"), Ok((100, 64)));
        assert!(parse_size("0x64").is_err());
        assert!(parse_size("").is_err());
    }

    #[test]
    fn parses_durations_as_seconds_or_humantime() {
        assert_eq!(parse_duration("2.5"), Ok(Duration::from_millis(2500)));
        assert_eq!(parse_duration("16ms"), Ok(Duration::from_millis(16)));
        assert!(parse_duration("-1").is_err());
        assert!(parse_duration("later").is_err());
        assert!(parse_duration("1e300").is_err());
        assert!(parse_duration("inf").is_err());
    }

    #[test]
    fn parses_power_preferences() {
        assert_eq!(parse_power("LOW"), Ok(GpuPowerPreference::Low));
        assert_eq!(parse_power("discrete"), Ok(GpuPowerPreference::High));
        assert!(parse_power("medium").is_err());
    }

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "texrun",
            "--kernel",
            "tunnel",
            "--resolution",
            "100",
            "--workgroup",
            "16x16",
            "--fixed-step",
            "16ms",
            "--frames",
            "3",
            "--kernel-dir",
            "a",
            "--kernel-dir",
            "b",
        ])
        .unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.run.kernel.as_deref(), Some("tunnel"));
        assert_eq!(cli.run.resolution, Some((100, 100)));
        assert_eq!(cli.run.workgroup, Some((16, 16)));
        assert_eq!(cli.run.fixed_step, Some(Duration::from_millis(16)));
        assert_eq!(cli.run.kernel_dirs.len(), 2);
        assert_eq!(cli.run.power, GpuPowerPreference::High);
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["texrun", "check", "--config", "fx.toml"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Check(CheckArgs { config: Some(ref path) })) if path.ends_with("fx.toml")
        ));
    }
}
