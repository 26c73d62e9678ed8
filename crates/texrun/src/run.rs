use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use automation::{AutomationPlayer, ParameterTimeline, ParameterUpdate};
use proctex::{
    DispatchGeometry, EffectParameters, FrameDriver, GpuContext, GpuMemoryMode, GpuOptions,
    KernelCatalog, KernelLibrary, ParameterHandle, ProceduralEffect, ProceduralRenderer,
    RendererDescriptor, RendererRegistry, SurfaceFormat, SurfaceReader, TimingPolicy,
    WorkgroupExtent,
};
use serde::Serialize;
use texconfig::{
    Defaults, KernelSettings, ParameterValues, PartialParameters, RendererConfig,
    ResolvedRenderer, Resolution, RunSettings, TexConfig, TextureFormat, Workgroup,
};
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;
use crate::paths::AppPaths;

/// Frame budget when neither a frame count nor a duration is configured.
pub const DEFAULT_FRAMES: u64 = 60;

const AUTOMATION_TICK: Duration = Duration::from_millis(5);

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// A configuration plus the file it came from, if any. Relative kernel
/// directories resolve against that file's directory.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: TexConfig,
    pub origin: Option<PathBuf>,
}

impl LoadedConfig {
    pub fn kernel_directories(&self) -> Vec<PathBuf> {
        let base = self.origin.as_deref().and_then(Path::parent);
        self.config
            .kernels
            .directories
            .iter()
            .map(|dir| match base {
                Some(base) if dir.is_relative() => base.join(dir),
                _ => dir.clone(),
            })
            .collect()
    }
}

pub fn load_config_file(path: &Path) -> Result<LoadedConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = TexConfig::from_toml_str(&text)
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(LoadedConfig {
        config,
        origin: Some(path.to_path_buf()),
    })
}

/// Picks the configuration for a run: a `--kernel` renderer built from flags,
/// an explicit `--config`, the user's default file, or a lone fractal.
pub fn resolve_run_config(args: &RunArgs, paths: &AppPaths) -> Result<LoadedConfig> {
    let mut loaded = if let Some(kernel) = &args.kernel {
        adhoc_config(kernel)
    } else if let Some(path) = &args.config {
        load_config_file(path)?
    } else if paths.config_file().is_file() {
        load_config_file(&paths.config_file())?
    } else {
        tracing::info!(
            config = %paths.config_file().display(),
            "no configuration found; running the built-in fractal"
        );
        adhoc_config(ProceduralEffect::Fractal.kernel_name())
    };
    apply_overrides(&mut loaded.config, args);
    loaded
        .config
        .validate()
        .context("command line overrides produced an invalid configuration")?;
    Ok(loaded)
}

fn adhoc_config(kernel: &str) -> LoadedConfig {
    LoadedConfig {
        config: TexConfig {
            version: 1,
            defaults: Defaults::default(),
            kernels: KernelSettings::default(),
            run: RunSettings::default(),
            renderers: vec![RendererConfig {
                name: kernel.to_string(),
                kernel: kernel.to_string(),
                resolution: None,
                workgroup: None,
                format: None,
                images: None,
                parameters: PartialParameters::default(),
                automation: Vec::new(),
            }],
        },
        origin: None,
    }
}

fn apply_overrides(config: &mut TexConfig, args: &RunArgs) {
    if let Some((width, height)) = args.resolution {
        config.defaults.resolution = Some(Resolution { width, height });
    }
    if let Some((x, y)) = args.workgroup {
        config.defaults.workgroup = Some(Workgroup { x, y });
    }
    if let Some(format) = args.format {
        config.defaults.format = Some(format);
    }
    if let Some(images) = args.images {
        config.defaults.images = Some(images);
    }

    for renderer in &mut config.renderers {
        let parameters = &mut renderer.parameters;
        parameters.intensity = args.intensity.or(parameters.intensity);
        parameters.jitter = args.jitter.or(parameters.jitter);
        parameters.density = args.density.or(parameters.density);
        parameters.amount = args.amount.or(parameters.amount);
    }

    let run = &mut config.run;
    run.fps = args.fps.or(run.fps);
    run.frames = args.frames.or(run.frames);
    run.duration = args.duration.or(run.duration);
    run.fixed_step = args.fixed_step.or(run.fixed_step);
}

/// Built-in kernels plus every kernel directory that applies to this run.
pub fn build_catalog(directories: &[PathBuf]) -> Result<KernelCatalog> {
    let mut catalog = KernelCatalog::builtin().context("built-in kernels are malformed")?;
    for dir in directories {
        let added = catalog
            .add_directory(dir)
            .with_context(|| format!("failed to load kernels from {}", dir.display()))?;
        tracing::debug!(dir = %dir.display(), added, "loaded kernel directory");
    }
    Ok(catalog)
}

/// Config directories, then the user kernel directory, then `--kernel-dir`s.
pub fn kernel_directories(loaded: &LoadedConfig, extra: &[PathBuf], paths: &AppPaths) -> Vec<PathBuf> {
    let mut dirs = loaded.kernel_directories();
    let user_dir = paths.kernel_dir();
    if user_dir.is_dir() {
        dirs.push(user_dir);
    }
    dirs.extend(extra.iter().cloned());
    dirs
}

pub fn surface_format(format: TextureFormat) -> SurfaceFormat {
    match format {
        TextureFormat::Rgba16Float => SurfaceFormat::Rgba16Float,
        TextureFormat::Rgba32Float => SurfaceFormat::Rgba32Float,
        TextureFormat::Rgba8Unorm => SurfaceFormat::Rgba8Unorm,
    }
}

pub fn effect_parameters(values: ParameterValues) -> EffectParameters {
    EffectParameters::new(values.intensity, values.jitter, values.density, values.amount)
}

fn parameter_values(parameters: EffectParameters) -> ParameterValues {
    ParameterValues {
        intensity: parameters.intensity,
        jitter: parameters.jitter,
        density: parameters.density,
        amount: parameters.amount,
    }
}

/// Extent a built-in effect was tuned for, or 8x8 for anything else.
fn preferred_workgroup(kernel: &str) -> WorkgroupExtent {
    ProceduralEffect::ALL
        .iter()
        .find(|effect| effect.kernel_name() == kernel)
        .map(|effect| effect.preferred_workgroup())
        .unwrap_or_default()
}

pub fn descriptor_for(resolved: &ResolvedRenderer) -> RendererDescriptor {
    RendererDescriptor {
        label: resolved.name.clone(),
        kernel: resolved.kernel.clone(),
        width: resolved.resolution.width,
        height: resolved.resolution.height,
        format: surface_format(resolved.format),
        workgroup: resolved
            .workgroup
            .map(|extent| WorkgroupExtent::new(extent.x, extent.y))
            .unwrap_or_else(|| preferred_workgroup(&resolved.kernel)),
        image_count: resolved.images,
        parameters: effect_parameters(resolved.parameters),
    }
}

/// When to stop and how fast to go.
#[derive(Debug, Clone, PartialEq)]
struct Pacing {
    frame_limit: Option<u64>,
    duration: Option<Duration>,
    frame_interval: Option<Duration>,
    policy: TimingPolicy,
}

impl Pacing {
    fn from_settings(run: &RunSettings) -> Self {
        let frame_limit = match (run.frames, run.duration) {
            (None, None) => Some(DEFAULT_FRAMES),
            (frames, _) => frames,
        };
        let fps = run.fps();
        let frame_interval = if fps > 0.0 {
            Duration::try_from_secs_f32(1.0 / fps).ok()
        } else {
            None
        };
        let policy = match run.fixed_step {
            Some(step) => TimingPolicy::Fixed { step },
            None => TimingPolicy::WallClock {
                max_delta: run.max_delta(),
            },
        };
        Self {
            frame_limit,
            duration: run.duration,
            frame_interval,
            policy,
        }
    }

    fn should_continue(&self, frames: u64, effect_time: Duration) -> bool {
        self.frame_limit.map_or(true, |limit| frames < limit)
            && self.duration.map_or(true, |limit| effect_time < limit)
    }
}

/// Frame delta as a `Duration`, saturating instead of panicking on values
/// `Duration` cannot hold.
fn delta_duration(seconds: f32) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f32(seconds).unwrap_or(Duration::MAX)
}

/// Everything the run keeps about a renderer after handing it to the registry.
struct ActiveRenderer {
    descriptor: RendererDescriptor,
    geometry: DispatchGeometry,
    handle: ParameterHandle,
    reader: SurfaceReader,
}

#[derive(Debug, Serialize)]
struct RunReport {
    adapter: String,
    backend: String,
    frames: u64,
    effect_seconds: f32,
    wall_seconds: f32,
    renderers: Vec<RendererReport>,
}

#[derive(Debug, Serialize)]
struct RendererReport {
    name: String,
    kernel: String,
    width: u32,
    height: u32,
    format: String,
    workgroup: String,
    groups: [u32; 3],
    images: usize,
    parameters: ParameterValues,
    #[serde(skip_serializing_if = "Option::is_none")]
    exported: Option<PathBuf>,
}

pub fn run(args: RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let loaded = resolve_run_config(&args, &paths)?;
    let timeline = ParameterTimeline::from_config(&loaded.config)
        .context("invalid parameter automation")?;
    let pacing = Pacing::from_settings(&loaded.config.run);

    let gpu = GpuContext::new(&GpuOptions {
        power: args.power,
        memory: GpuMemoryMode::default(),
        force_fallback_adapter: args.fallback_adapter,
    })?;
    tracing::info!(
        adapter = %gpu.adapter_profile.name,
        backend = ?gpu.adapter_profile.backend,
        "GPU ready"
    );

    let dirs = kernel_directories(&loaded, &args.kernel_dirs, &paths);
    let library = KernelLibrary::new(&gpu.device, build_catalog(&dirs)?);

    let mut registry = RendererRegistry::new();
    let mut active = Vec::with_capacity(loaded.config.renderers.len());
    for resolved in loaded.config.resolved_renderers() {
        let descriptor = descriptor_for(&resolved);
        let renderer = ProceduralRenderer::new(&gpu.device, &library, &descriptor)
            .with_context(|| format!("failed to create renderer '{}'", resolved.name))?;
        active.push(ActiveRenderer {
            geometry: renderer.geometry(),
            handle: renderer.parameters(),
            reader: renderer.reader(),
            descriptor,
        });
        registry.register(renderer);
    }

    let handles: HashMap<String, ParameterHandle> = active
        .iter()
        .map(|renderer| (renderer.descriptor.label.clone(), renderer.handle.clone()))
        .collect();

    let started = Instant::now();
    let mut inline_player = None;
    let mut worker = None;
    let stop = Arc::new(AtomicBool::new(false));
    if !timeline.is_static() {
        let player = AutomationPlayer::new(timeline, started);
        match pacing.policy {
            // Simulated time only exists on the render thread.
            TimingPolicy::Fixed { .. } => inline_player = Some(player),
            TimingPolicy::WallClock { .. } => {
                worker = Some(spawn_automation(player, handles.clone(), Arc::clone(&stop))?);
            }
        }
    }

    let mut driver = FrameDriver::new(registry, pacing.policy);
    let mut effect_time = Duration::ZERO;
    let mut frames = 0_u64;
    while pacing.should_continue(frames, effect_time) {
        let frame_start = Instant::now();
        if let Some(player) = inline_player.as_mut() {
            apply_updates(player.tick_at(effect_time), &handles);
        }
        let report = driver.render_frame(&gpu.device, &gpu.queue);
        effect_time = effect_time.saturating_add(delta_duration(report.delta_seconds));
        frames += 1;

        if let Some(interval) = pacing.frame_interval {
            let remaining = frame_start
                .checked_add(interval)
                .and_then(|deadline| deadline.checked_duration_since(Instant::now()));
            if let Some(remaining) = remaining {
                thread::sleep(remaining);
            }
        }
    }
    gpu.wait_idle()?;

    stop.store(true, Ordering::Release);
    if let Some(worker) = worker {
        if worker.join().is_err() {
            tracing::warn!("automation thread panicked");
        }
    }

    let exported = match &args.export_dir {
        Some(dir) => export_all(dir, &gpu, &active)?,
        None => vec![None; active.len()],
    };

    let report = RunReport {
        adapter: gpu.adapter_profile.name.clone(),
        backend: format!("{:?}", gpu.adapter_profile.backend),
        frames,
        effect_seconds: effect_time.as_secs_f32(),
        wall_seconds: started.elapsed().as_secs_f32(),
        renderers: active
            .iter()
            .zip(exported)
            .map(|(renderer, exported)| renderer_report(renderer, exported))
            .collect(),
    };
    print_report(&report, args.json)
}

fn spawn_automation(
    mut player: AutomationPlayer,
    handles: HashMap<String, ParameterHandle>,
    stop: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("texrun-automation".into())
        .spawn(move || {
            while !stop.load(Ordering::Acquire) {
                let now = Instant::now();
                apply_updates(player.tick(now), &handles);
                if player.finished(now) {
                    tracing::debug!("parameter automation finished");
                    break;
                }
                thread::sleep(AUTOMATION_TICK);
            }
        })
        .context("failed to spawn automation thread")
}

fn apply_updates(updates: Vec<ParameterUpdate>, handles: &HashMap<String, ParameterHandle>) {
    for update in updates {
        match handles.get(&update.renderer) {
            Some(handle) => {
                handle.set(effect_parameters(update.values));
                tracing::trace!(renderer = %update.renderer, values = ?update.values, "staged automation");
            }
            None => tracing::warn!(renderer = %update.renderer, "automation targets unknown renderer"),
        }
    }
}

fn export_all(dir: &Path, gpu: &GpuContext, active: &[ActiveRenderer]) -> Result<Vec<Option<PathBuf>>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create export directory {}", dir.display()))?;
    active
        .iter()
        .map(|renderer| {
            let path = dir.join(format!("{}.png", renderer.descriptor.label));
            renderer
                .reader
                .export_png(&gpu.device, &gpu.queue, &path)
                .with_context(|| format!("failed to export '{}'", renderer.descriptor.label))?;
            Ok(Some(path))
        })
        .collect()
}

fn renderer_report(renderer: &ActiveRenderer, exported: Option<PathBuf>) -> RendererReport {
    let descriptor = &renderer.descriptor;
    let (groups_x, groups_y, groups_z) = renderer.geometry.group_counts();
    RendererReport {
        name: descriptor.label.clone(),
        kernel: descriptor.kernel.clone(),
        width: descriptor.width,
        height: descriptor.height,
        format: descriptor.format.to_string(),
        workgroup: descriptor.workgroup.to_string(),
        groups: [groups_x, groups_y, groups_z],
        images: descriptor.image_count,
        parameters: parameter_values(renderer.handle.snapshot()),
        exported,
    }
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("failed to serialise run report")?
        );
        return Ok(());
    }

    println!(
        "Rendered {} frame(s) on {} ({}): {:.3}s effect time, {:.3}s wall time",
        report.frames, report.adapter, report.backend, report.effect_seconds, report.wall_seconds
    );
    for renderer in &report.renderers {
        println!(
            "  {:<16} kernel={:<16} {}x{} {} workgroup={} groups={}x{}",
            renderer.name,
            renderer.kernel,
            renderer.width,
            renderer.height,
            renderer.format,
            renderer.workgroup,
            renderer.groups[0],
            renderer.groups[1],
        );
        if let Some(path) = &renderer.exported {
            println!("  {:<16} exported to {}", "", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::Cli;

    fn run_args(flags: &[&str]) -> RunArgs {
        let mut argv = vec!["texrun"];
        argv.extend_from_slice(flags);
        Cli::try_parse_from(argv).unwrap().run
    }

    #[test]
    fn kernel_flag_builds_single_renderer() {
        let mut loaded = adhoc_config("tunnel");
        apply_overrides(
            &mut loaded.config,
            &run_args(&["--resolution", "100", "--intensity", "4", "--frames", "3"]),
        );
        loaded.config.validate().unwrap();

        let resolved = loaded.config.resolved_renderers();
        assert_eq!(resolved.len(), 1);
        let descriptor = descriptor_for(&resolved[0]);
        assert_eq!(descriptor.kernel, "tunnel");
        assert_eq!((descriptor.width, descriptor.height), (100, 100));
        assert_eq!(descriptor.workgroup, WorkgroupExtent::SIXTEEN);
        assert_eq!(descriptor.parameters.intensity, 4.0);
        assert_eq!(loaded.config.run.frames, Some(3));
    }

    #[test]
    fn explicit_workgroup_beats_effect_preference() {
        let mut loaded = adhoc_config("tunnel");
        apply_overrides(&mut loaded.config, &run_args(&["--workgroup", "8x4"]));
        let descriptor = descriptor_for(&loaded.config.resolved_renderers()[0]);
        assert_eq!(descriptor.workgroup, WorkgroupExtent::new(8, 4));
    }

    #[test]
    fn unknown_kernels_default_to_eight_by_eight() {
        assert_eq!(preferred_workgroup("custom_glow"), WorkgroupExtent::EIGHT);
        assert_eq!(preferred_workgroup("fancy_fractal"), WorkgroupExtent::EIGHT);
        assert_eq!(preferred_workgroup("effect_sphere"), WorkgroupExtent::SIXTEEN);
    }

    #[test]
    fn relative_kernel_directories_follow_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("texrun.toml");
        fs::write(
            &path,
            "version = 1\n[kernels]\ndirectories = [\"fx\", \"/abs/fx\"]\n[[renderer]]\nname = \"a\"\nkernel = \"tunnel\"\n",
        )
        .unwrap();
        let loaded = load_config_file(&path).unwrap();
        assert_eq!(
            loaded.kernel_directories(),
            [dir.path().join("fx"), PathBuf::from("/abs/fx")]
        );
    }

    #[test]
    fn pacing_defaults_to_a_frame_budget() {
        let pacing = Pacing::from_settings(&RunSettings::default());
        assert_eq!(pacing.frame_limit, Some(DEFAULT_FRAMES));
        assert!(pacing.should_continue(DEFAULT_FRAMES - 1, Duration::ZERO));
        assert!(!pacing.should_continue(DEFAULT_FRAMES, Duration::ZERO));
        assert!(matches!(pacing.policy, TimingPolicy::WallClock { .. }));
    }

    #[test]
    fn pacing_honours_duration_and_fixed_step() {
        let run = RunSettings {
            fps: Some(0.0),
            duration: Some(Duration::from_secs(1)),
            fixed_step: Some(Duration::from_millis(100)),
            ..RunSettings::default()
        };
        let pacing = Pacing::from_settings(&run);
        assert_eq!(pacing.frame_limit, None);
        assert_eq!(pacing.frame_interval, None);
        assert!(pacing.should_continue(1_000, Duration::from_millis(900)));
        assert!(!pacing.should_continue(1_000, Duration::from_secs(1)));
        assert_eq!(
            pacing.policy,
            TimingPolicy::Fixed {
                step: Duration::from_millis(100)
            }
        );
    }

    #[test]
    fn pacing_survives_unrepresentable_intervals() {
        let run = RunSettings {
            fps: Some(1e-40),
            ..RunSettings::default()
        };
        assert_eq!(Pacing::from_settings(&run).frame_interval, None);
    }

    #[test]
    fn frame_deltas_saturate() {
        assert_eq!(delta_duration(0.25), Duration::from_millis(250));
        assert_eq!(delta_duration(-1.0), Duration::ZERO);
        assert_eq!(delta_duration(f32::NAN), Duration::ZERO);
        assert_eq!(delta_duration(f32::INFINITY), Duration::MAX);
        assert_eq!(delta_duration(1e30), Duration::MAX);
    }

    #[test]
    fn vanishing_fps_flag_is_rejected() {
        let mut loaded = adhoc_config("tunnel");
        apply_overrides(&mut loaded.config, &run_args(&["--fps", "1e-40"]));
        assert!(loaded.config.validate().is_err());
    }

    #[test]
    fn updates_reach_the_named_handle_only() {
        let sphere = ParameterHandle::new(EffectParameters::default());
        let tunnel = ParameterHandle::new(EffectParameters::default());
        let handles = HashMap::from([
            ("sphere".to_string(), sphere.clone()),
            ("tunnel".to_string(), tunnel.clone()),
        ]);
        apply_updates(
            vec![ParameterUpdate {
                renderer: "sphere".into(),
                values: ParameterValues {
                    intensity: 7.0,
                    jitter: 0.1,
                    density: 0.5,
                    amount: 3.0,
                },
            }],
            &handles,
        );
        assert_eq!(sphere.snapshot(), EffectParameters::new(7.0, 0.1, 0.5, 3.0));
        assert_eq!(tunnel.snapshot(), EffectParameters::default());
    }

    #[test]
    fn format_mapping_is_total() {
        assert_eq!(surface_format(TextureFormat::default()), SurfaceFormat::default());
        assert_eq!(surface_format(TextureFormat::Rgba8Unorm), SurfaceFormat::Rgba8Unorm);
        assert_eq!(surface_format(TextureFormat::Rgba32Float), SurfaceFormat::Rgba32Float);
    }
}
