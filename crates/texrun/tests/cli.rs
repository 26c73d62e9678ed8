use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const GLOW_KERNEL: &str = r#"
@compute @workgroup_size(WORKGROUP_X, WORKGROUP_Y, 1)
fn custom_glow(@builtin(global_invocation_id) id: vec3<u32>) {
    let size = textureDimensions(output_texture);
    if (id.x >= size.x || id.y >= size.y) {
        return;
    }
    textureStore(output_texture, vec2<i32>(id.xy), vec4<f32>(params.intensity, 0.0, 0.0, 1.0));
}
"#;

fn texrun(config_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_texrun"))
        .env("TEXRUN_CONFIG_DIR", config_dir)
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("failed to run texrun")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn kernels_lists_builtin_effects() {
    let root = TempDir::new().unwrap();
    let output = texrun(root.path(), &["kernels"]);
    assert!(output.status.success());

    let listing = stdout(&output);
    for name in ["fancy_fractal", "effect_sphere", "tunnel"] {
        assert!(listing.contains(name), "missing {name} in:\n{listing}");
    }
}

#[test]
fn kernels_picks_up_extra_directories() {
    let root = TempDir::new().unwrap();
    let fx = root.path().join("fx");
    fs::create_dir_all(&fx).unwrap();
    fs::write(fx.join("glow.wgsl"), GLOW_KERNEL).unwrap();

    let output = texrun(root.path(), &["kernels", "--kernel-dir", fx.to_str().unwrap()]);
    assert!(output.status.success());
    let listing = stdout(&output);
    assert!(listing.contains("custom_glow"));
    assert!(listing.contains("glow.wgsl"));
}

#[test]
fn kernels_loads_the_user_kernel_directory() {
    let root = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("kernels")).unwrap();
    fs::write(root.path().join("kernels/glow.wgsl"), GLOW_KERNEL).unwrap();

    let output = texrun(root.path(), &["kernels"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("custom_glow"));
}

#[test]
fn check_accepts_valid_config() {
    let root = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("fx")).unwrap();
    fs::write(root.path().join("fx/glow.wgsl"), GLOW_KERNEL).unwrap();
    fs::write(
        root.path().join("texrun.toml"),
        r#"
version = 1

[kernels]
directories = ["fx"]

[[renderer]]
name = "sphere"
kernel = "effect_sphere"
resolution = 100

[[renderer]]
name = "glow"
kernel = "custom_glow"
resolution = "64x32"
workgroup = 8

[[renderer.automation]]
at = "1s"
intensity = 6.0
"#,
    )
    .unwrap();

    let output = texrun(root.path(), &["check"]);
    assert!(
        output.status.success(),
        "stderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report = stdout(&output);
    assert!(report.contains("sphere"));
    assert!(report.contains("groups=7x7"));
    assert!(report.contains("glow"));
    assert!(report.contains("groups=8x4"));
    assert!(report.contains("is valid"));
}

#[test]
fn check_rejects_invalid_config() {
    let root = TempDir::new().unwrap();
    let path = root.path().join("broken.toml");
    fs::write(&path, "version = 1\n[[renderer]]\nname = \"a\"\nkernel = \"tunnel\"\nimages = 1\n").unwrap();

    let output = texrun(root.path(), &["check", "--config", path.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn check_rejects_unknown_kernels() {
    let root = TempDir::new().unwrap();
    let path = root.path().join("fx.toml");
    fs::write(&path, "version = 1\n[[renderer]]\nname = \"a\"\nkernel = \"missing_kernel\"\n").unwrap();

    let output = texrun(root.path(), &["check", "--config", path.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing_kernel"));
}

#[test]
fn where_reports_override_directory() {
    let root = TempDir::new().unwrap();
    let output = texrun(root.path(), &["where"]);
    assert!(output.status.success());
    let report = stdout(&output);
    assert!(report.contains(&root.path().join("texrun.toml").display().to_string()));
    assert!(report.contains(&root.path().join("kernels").display().to_string()));
}
