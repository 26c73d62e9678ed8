mod cli;
mod paths;
mod run;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use automation::ParameterTimeline;
use cli::{CheckArgs, Command, KernelsArgs};
use paths::AppPaths;
use proctex::DispatchGeometry;
use run::LoadedConfig;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Kernels(args)) => list_kernels(args),
        Some(Command::Check(args)) => check_config(args),
        Some(Command::Where) => print_paths(),
        None => run::run(cli.run),
    }
}

fn config_or_default(config: Option<PathBuf>, paths: &AppPaths) -> PathBuf {
    config.unwrap_or_else(|| paths.config_file())
}

fn list_kernels(args: KernelsArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let loaded = match args.config {
        Some(path) => Some(run::load_config_file(&path)?),
        None => None,
    };

    let mut dirs = loaded
        .as_ref()
        .map(LoadedConfig::kernel_directories)
        .unwrap_or_default();
    let user_dir = paths.kernel_dir();
    if user_dir.is_dir() {
        dirs.push(user_dir);
    }
    dirs.extend(args.kernel_dirs);

    let catalog = run::build_catalog(&dirs)?;
    for (name, source) in catalog.kernels() {
        println!("{name:<24} {source}");
    }
    Ok(())
}

fn check_config(args: CheckArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let path = config_or_default(args.config, &paths);
    let loaded = run::load_config_file(&path)?;
    ParameterTimeline::from_config(&loaded.config)
        .with_context(|| format!("invalid automation in {}", path.display()))?;

    let catalog = run::build_catalog(&run::kernel_directories(&loaded, &[], &paths))?;
    let mut missing = Vec::new();
    for resolved in loaded.config.resolved_renderers() {
        if !catalog.contains(&resolved.kernel) {
            missing.push(format!("'{}' (renderer '{}')", resolved.kernel, resolved.name));
            continue;
        }
        let descriptor = run::descriptor_for(&resolved);
        let geometry = DispatchGeometry::new(descriptor.width, descriptor.height, descriptor.workgroup);
        let (groups_x, groups_y, _) = geometry.group_counts();
        println!(
            "{:<16} kernel={:<16} {}x{} {} images={} workgroup={} groups={}x{}",
            resolved.name,
            resolved.kernel,
            descriptor.width,
            descriptor.height,
            descriptor.format,
            descriptor.image_count,
            descriptor.workgroup,
            groups_x,
            groups_y,
        );
    }

    if !missing.is_empty() {
        bail!("unknown kernel(s): {}", missing.join(", "));
    }
    println!("{} is valid", path.display());
    Ok(())
}

fn print_paths() -> Result<()> {
    let paths = AppPaths::discover()?;
    println!("Config directory: {}", paths.config_dir().display());
    println!("Config file:      {}", paths.config_file().display());
    println!("Kernel directory: {}", paths.kernel_dir().display());
    Ok(())
}
