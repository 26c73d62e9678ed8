use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::registry::FrameContext;
use crate::types::SurfaceFormat;

use super::capture_errors;
use super::renderer::RendererError;

struct SurfaceImage {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct SurfaceShared {
    label: String,
    width: u32,
    height: u32,
    format: SurfaceFormat,
    images: Vec<SurfaceImage>,
    /// Index of the image consumers sample; never the in-progress write target.
    published: AtomicUsize,
}

/// Fixed-size GPU image set written by a compute kernel and sampled by
/// everything else.
///
/// The surface rotates through at least two physical images. Each frame the
/// kernel writes the image after the published one, and only once the
/// dispatch has been recorded does that image become the sampled one.
pub struct TextureSurface {
    shared: Arc<SurfaceShared>,
}

/// The image a kernel writes during one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a write target must be published after the dispatch is recorded"]
pub struct WriteTarget {
    index: usize,
    frame_index: u64,
}

impl WriteTarget {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }
}

impl TextureSurface {
    pub const USAGE: wgpu::TextureUsages = wgpu::TextureUsages::STORAGE_BINDING
        .union(wgpu::TextureUsages::TEXTURE_BINDING)
        .union(wgpu::TextureUsages::COPY_SRC);

    pub fn new(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: SurfaceFormat,
        image_count: usize,
    ) -> Result<Self, RendererError> {
        check_surface(&device.limits(), width, height, image_count)?;

        let (images, error) = capture_errors(device, || {
            (0..image_count)
                .map(|index| {
                    let texture = device.create_texture(&wgpu::TextureDescriptor {
                        label: Some(&format!("{label} surface image #{index}")),
                        size: wgpu::Extent3d {
                            width,
                            height,
                            depth_or_array_layers: 1,
                        },
                        mip_level_count: 1,
                        sample_count: 1,
                        dimension: wgpu::TextureDimension::D2,
                        format: format.to_wgpu(),
                        usage: Self::USAGE,
                        view_formats: &[],
                    });
                    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                    SurfaceImage { texture, view }
                })
                .collect::<Vec<_>>()
        });
        if let Some(error) = error {
            return Err(RendererError::Allocation {
                resource: "texture surface",
                message: error.to_string(),
            });
        }

        tracing::debug!(
            label,
            width,
            height,
            %format,
            image_count,
            "allocated procedural texture surface"
        );

        Ok(Self {
            shared: Arc::new(SurfaceShared {
                label: label.to_string(),
                width,
                height,
                format,
                images,
                published: AtomicUsize::new(0),
            }),
        })
    }

    /// Picks the image this frame's kernel writes: the one after the
    /// currently published image, so readers never observe a partial write.
    pub fn acquire_write_target(&mut self, frame: &FrameContext<'_>) -> WriteTarget {
        let published = self.shared.published.load(Ordering::Acquire);
        WriteTarget {
            index: next_write_index(published, self.shared.images.len()),
            frame_index: frame.frame_index,
        }
    }

    /// Makes a written target the sampled image for all work recorded after
    /// this point.
    pub fn publish(&mut self, target: WriteTarget) {
        self.shared.published.store(target.index, Ordering::Release);
        tracing::trace!(
            label = %self.shared.label,
            index = target.index,
            frame = target.frame_index,
            "published surface image"
        );
    }

    pub(crate) fn storage_view(&self, index: usize) -> &wgpu::TextureView {
        &self.shared.images[index].view
    }

    pub fn reader(&self) -> SurfaceReader {
        SurfaceReader {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn width(&self) -> u32 {
        self.shared.width
    }

    pub fn height(&self) -> u32 {
        self.shared.height
    }

    pub fn format(&self) -> SurfaceFormat {
        self.shared.format
    }

    pub fn image_count(&self) -> usize {
        self.shared.images.len()
    }
}

/// Size and image-count rules shared by surfaces and the renderers that own
/// them.
pub(crate) fn check_surface(
    limits: &wgpu::Limits,
    width: u32,
    height: u32,
    image_count: usize,
) -> Result<(), RendererError> {
    let max = limits.max_texture_dimension_2d;
    if width == 0 || height == 0 || width > max || height > max {
        return Err(RendererError::InvalidDimensions { width, height, max });
    }
    if image_count < 2 {
        return Err(RendererError::ImageCount(image_count));
    }
    Ok(())
}

fn next_write_index(published: usize, image_count: usize) -> usize {
    (published + 1) % image_count
}

/// Read-only view of a surface for sampling consumers.
///
/// Content may change between any two frames; consumers that cache bind
/// groups should build one per image from [`SurfaceReader::view`] and pick
/// the one matching [`SurfaceReader::sampled_index`].
#[derive(Clone)]
pub struct SurfaceReader {
    shared: Arc<SurfaceShared>,
}

impl SurfaceReader {
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn width(&self) -> u32 {
        self.shared.width
    }

    pub fn height(&self) -> u32 {
        self.shared.height
    }

    pub fn format(&self) -> SurfaceFormat {
        self.shared.format
    }

    pub fn image_count(&self) -> usize {
        self.shared.images.len()
    }

    /// Index of the most recently finalized image.
    pub fn sampled_index(&self) -> usize {
        self.shared.published.load(Ordering::Acquire)
    }

    pub fn sampled_view(&self) -> wgpu::TextureView {
        self.shared.images[self.sampled_index()].view.clone()
    }

    pub fn view(&self, index: usize) -> Option<&wgpu::TextureView> {
        self.shared.images.get(index).map(|image| &image.view)
    }

    /// Every image's view, in surface index order.
    pub fn views(&self) -> impl Iterator<Item = &wgpu::TextureView> + '_ {
        self.shared.images.iter().map(|image| &image.view)
    }

    pub(crate) fn sampled_texture(&self) -> &wgpu::Texture {
        &self.shared.images[self.sampled_index()].texture
    }

    /// Clamp-to-edge sampler suited to the surface format.
    pub fn create_sampler(&self, device: &wgpu::Device) -> wgpu::Sampler {
        let filter = if self.shared.format.is_filterable() {
            wgpu::FilterMode::Linear
        } else {
            wgpu::FilterMode::Nearest
        };
        device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{} sampler", self.shared.label)),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        })
    }

    /// Layout entry for binding the sampled view in a fragment shader.
    pub fn texture_binding_type(&self) -> wgpu::BindingType {
        wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float {
                filterable: self.shared.format.is_filterable(),
            },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_target_never_aliases_published_image() {
        for image_count in 2..=4 {
            let mut published = 0;
            for _ in 0..10 {
                let next = next_write_index(published, image_count);
                assert_ne!(next, published);
                assert!(next < image_count);
                published = next;
            }
        }
    }

    #[test]
    fn double_buffer_alternates() {
        let sequence: Vec<usize> = std::iter::successors(Some(0), |&published| {
            Some(next_write_index(published, 2))
        })
        .take(5)
        .collect();
        assert_eq!(sequence, [0, 1, 0, 1, 0]);
    }

    #[test]
    fn surface_checks_size_and_image_count() {
        let limits = wgpu::Limits::default();
        let max = limits.max_texture_dimension_2d;
        assert!(check_surface(&limits, 512, 512, 2).is_ok());
        assert!(check_surface(&limits, max, 1, 3).is_ok());
        assert!(matches!(
            check_surface(&limits, 0, 64, 2),
            Err(RendererError::InvalidDimensions { width: 0, .. })
        ));
        assert!(matches!(
            check_surface(&limits, max + 1, 64, 2),
            Err(RendererError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            check_surface(&limits, 64, 64, 1),
            Err(RendererError::ImageCount(1))
        ));
    }

    #[test]
    fn surface_usage_allows_storage_sampling_and_copy() {
        assert!(TextureSurface::USAGE.contains(wgpu::TextureUsages::STORAGE_BINDING));
        assert!(TextureSurface::USAGE.contains(wgpu::TextureUsages::TEXTURE_BINDING));
        assert!(TextureSurface::USAGE.contains(wgpu::TextureUsages::COPY_SRC));
    }
}
