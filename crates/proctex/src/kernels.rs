//! Kernel sources and the names they are resolved by.
//!
//! A [`KernelCatalog`] is a device-independent list of WGSL sources. Every
//! `@compute` entry point in a source becomes a kernel name. Before
//! compilation each source is wrapped with a prelude that declares the
//! uniform block, the two bindings every kernel uses, and the workgroup
//! extent constants, so kernel authors only write the entry point body.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::gpu::EffectUniforms;
use crate::types::{SurfaceFormat, WorkgroupExtent};

const BUILTIN_SOURCE: &str = include_str!("../shaders/builtin.wgsl");
const BUILTIN_LABEL: &str = "builtin";

#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("kernel '{0}' is not present in the kernel library")]
    UnknownKernel(String),
    #[error("kernel '{name}' is defined by both '{first}' and '{second}'")]
    DuplicateKernel {
        name: String,
        first: String,
        second: String,
    },
    #[error("kernel source '{0}' has no @compute entry points")]
    NoEntryPoints(String),
    #[error("failed to read kernel source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("kernel '{name}' failed to compile: {message}")]
    Compilation { name: String, message: String },
    #[error("kernel '{name}' declares workgroup size {declared:?} but is dispatched with {extent}x1")]
    WorkgroupMismatch {
        name: String,
        declared: [u32; 3],
        extent: WorkgroupExtent,
    },
}

/// One WGSL source file and the kernels it defines.
#[derive(Debug, Clone)]
pub struct KernelSource {
    label: String,
    source: String,
    entry_points: Vec<String>,
}

impl KernelSource {
    pub fn new(label: impl Into<String>, source: impl Into<String>) -> Result<Self, KernelError> {
        let label = label.into();
        let source = source.into();
        let entry_points = discover_entry_points(&source);
        if entry_points.is_empty() {
            return Err(KernelError::NoEntryPoints(label));
        }
        Ok(Self {
            label,
            source,
            entry_points,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn entry_points(&self) -> &[String] {
        &self.entry_points
    }

    /// Full WGSL module text for the given surface format and extent.
    pub fn wrapped(&self, format: SurfaceFormat, extent: WorkgroupExtent) -> String {
        wrap_kernel_source(&self.source, format, extent)
    }
}

/// Kernel names resolved to the source that defines them.
#[derive(Debug, Clone, Default)]
pub struct KernelCatalog {
    sources: Vec<KernelSource>,
    index: BTreeMap<String, usize>,
}

impl KernelCatalog {
    /// Empty catalog; most callers want [`KernelCatalog::builtin`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the kernels shipped with the crate.
    pub fn builtin() -> Result<Self, KernelError> {
        let mut catalog = Self::new();
        catalog.add_source(KernelSource::new(BUILTIN_LABEL, BUILTIN_SOURCE)?)?;
        Ok(catalog)
    }

    pub fn add_source(&mut self, source: KernelSource) -> Result<(), KernelError> {
        for name in source.entry_points() {
            if let Some(&existing) = self.index.get(name) {
                return Err(KernelError::DuplicateKernel {
                    name: name.clone(),
                    first: self.sources[existing].label.clone(),
                    second: source.label.clone(),
                });
            }
        }
        let position = self.sources.len();
        for name in source.entry_points() {
            self.index.insert(name.clone(), position);
        }
        tracing::debug!(
            source = %source.label,
            kernels = ?source.entry_points,
            "added kernel source"
        );
        self.sources.push(source);
        Ok(())
    }

    pub fn add_file(&mut self, path: &Path) -> Result<(), KernelError> {
        let text = fs::read_to_string(path).map_err(|source| KernelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.add_source(KernelSource::new(path.display().to_string(), text)?)
    }

    /// Adds every `.wgsl` file in `directory`, in file name order.
    pub fn add_directory(&mut self, directory: &Path) -> Result<usize, KernelError> {
        let io_error = |source| KernelError::Io {
            path: directory.to_path_buf(),
            source,
        };
        let mut files = Vec::new();
        for entry in fs::read_dir(directory).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("wgsl") {
                files.push(path);
            }
        }
        files.sort();
        for path in &files {
            self.add_file(path)?;
        }
        Ok(files.len())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn source_for(&self, name: &str) -> Result<(usize, &KernelSource), KernelError> {
        self.index
            .get(name)
            .map(|&position| (position, &self.sources[position]))
            .ok_or_else(|| KernelError::UnknownKernel(name.to_string()))
    }

    /// Kernel names with the label of the source defining each, sorted by name.
    pub fn kernels(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.index
            .iter()
            .map(|(name, &position)| (name.as_str(), self.sources[position].label.as_str()))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Finds the function names annotated with `@compute`.
pub fn discover_entry_points(source: &str) -> Vec<String> {
    let code = strip_comments(source);
    let mut names = Vec::new();
    let mut rest = code.as_str();
    while let Some(position) = rest.find("@compute") {
        rest = &rest[position + "@compute".len()..];
        let Some(name) = next_function_name(rest) else {
            break;
        };
        names.push(name.to_string());
    }
    names
}

/// Removes `//` line comments and (nestable) `/* */` block comments,
/// keeping line breaks.
fn strip_comments(source: &str) -> String {
    let mut code = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut block_depth = 0_usize;
    while let Some(ch) = chars.next() {
        match (ch, chars.peek().copied()) {
            ('/', Some('*')) => {
                chars.next();
                block_depth += 1;
            }
            ('*', Some('/')) if block_depth > 0 => {
                chars.next();
                block_depth -= 1;
            }
            ('/', Some('/')) if block_depth == 0 => {
                while chars.next_if(|&next| next != '\n').is_some() {}
            }
            ('\n', _) => code.push('\n'),
            (_, _) if block_depth > 0 => {}
            _ => code.push(ch),
        }
    }
    code
}

fn next_function_name(text: &str) -> Option<&str> {
    let mut search = text;
    loop {
        let position = search.find("fn")?;
        let before_ok = search[..position]
            .chars()
            .next_back()
            .map_or(true, |ch| !is_ident_char(ch));
        let after = &search[position + 2..];
        if before_ok && after.starts_with(char::is_whitespace) {
            let after = after.trim_start();
            let end = after
                .find(|ch: char| !is_ident_char(ch))
                .unwrap_or(after.len());
            return (end > 0).then(|| &after[..end]);
        }
        search = after;
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// Builds the compilable module: generated prelude followed by the
/// sanitised kernel source.
pub fn wrap_kernel_source(source: &str, format: SurfaceFormat, extent: WorkgroupExtent) -> String {
    format!(
        "{prelude}\n{body}",
        prelude = kernel_prelude(format, extent),
        body = sanitize_kernel_source(source)
    )
}

fn kernel_prelude(format: SurfaceFormat, extent: WorkgroupExtent) -> String {
    format!(
        "{uniforms}
const WORKGROUP_X: u32 = {x}u;
const WORKGROUP_Y: u32 = {y}u;

@group(0) @binding(0) var output_texture: texture_storage_2d<{format}, write>;
@group(0) @binding(1) var<uniform> params: EffectUniforms;
",
        uniforms = EffectUniforms::WGSL_STRUCT,
        x = extent.x,
        y = extent.y,
        format = format.wgsl_name(),
    )
}

/// Drops declarations the prelude provides, so standalone kernel files that
/// declare them for editor tooling still compile once wrapped.
fn sanitize_kernel_source(source: &str) -> String {
    let mut sanitized = String::with_capacity(source.len());
    let mut in_uniform_struct = false;
    for line in source.lines() {
        let trimmed = line.trim_start();
        if in_uniform_struct {
            if trimmed.starts_with('}') {
                in_uniform_struct = false;
            }
            continue;
        }
        if trimmed.starts_with("struct EffectUniforms") {
            in_uniform_struct = !trimmed.contains('}');
            continue;
        }
        let provided = trimmed.starts_with("const WORKGROUP_X")
            || trimmed.starts_with("const WORKGROUP_Y")
            || (trimmed.starts_with("@group(0)")
                && (trimmed.contains("var output_texture") || trimmed.contains("var<uniform> params")));
        if provided {
            continue;
        }
        sanitized.push_str(line);
        sanitized.push('\n');
    }
    sanitized
}
