use std::path::Path;
use std::sync::mpsc;

use half::f16;

use crate::types::SurfaceFormat;

use super::surface::SurfaceReader;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to map readback buffer: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
    #[error("device poll failed while waiting for readback: {0}")]
    Poll(String),
    #[error("readback callback was dropped before completion")]
    Disconnected,
    #[error("readback of {width}x{height} produced an image buffer of the wrong size")]
    Decode { width: u32, height: u32 },
    #[error("failed to encode image: {0}")]
    Image(#[from] image::ImageError),
}

impl SurfaceReader {
    /// Copies the currently published image back to the host as 8-bit RGBA.
    ///
    /// Float texels are clamped to `0..=1` before quantising. Blocks until
    /// the copy has completed.
    pub fn read_rgba8(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<image::RgbaImage, ExportError> {
        let (width, height, format) = (self.width(), self.height(), self.format());
        let padded_row = padded_bytes_per_row(width, format);

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{} readback", self.label())),
            size: u64::from(padded_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("surface readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: self.sampled_texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| ExportError::Poll(err.to_string()))?;
        receiver.recv().map_err(|_| ExportError::Disconnected)??;

        let pixels = {
            let mapped = slice.get_mapped_range();
            decode_rows(&mapped, width, height, padded_row, format)
        };
        buffer.unmap();

        tracing::debug!(label = self.label(), width, height, %format, "read back surface");
        image::RgbaImage::from_raw(width, height, pixels)
            .ok_or(ExportError::Decode { width, height })
    }

    /// Reads the published image and writes it as a PNG.
    pub fn export_png(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: &Path,
    ) -> Result<(), ExportError> {
        let image = self.read_rgba8(device, queue)?;
        image.save_with_format(path, image::ImageFormat::Png)?;
        tracing::info!(label = self.label(), path = %path.display(), "exported surface");
        Ok(())
    }
}

fn padded_bytes_per_row(width: u32, format: SurfaceFormat) -> u32 {
    let unpadded = width * format.bytes_per_texel();
    unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

fn decode_rows(bytes: &[u8], width: u32, height: u32, padded_row: u32, format: SurfaceFormat) -> Vec<u8> {
    let texel = format.bytes_per_texel() as usize;
    let row_len = width as usize * texel;
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for row in bytes.chunks(padded_row as usize).take(height as usize) {
        for texel_bytes in row[..row_len].chunks_exact(texel) {
            match format {
                SurfaceFormat::Rgba8Unorm => pixels.extend_from_slice(texel_bytes),
                SurfaceFormat::Rgba16Float => {
                    for channel in texel_bytes.chunks_exact(2) {
                        let value = f16::from_bits(u16::from_le_bytes([channel[0], channel[1]]));
                        pixels.push(quantize(value.to_f32()));
                    }
                }
                SurfaceFormat::Rgba32Float => {
                    for channel in texel_bytes.chunks_exact(4) {
                        let value =
                            f32::from_le_bytes([channel[0], channel[1], channel[2], channel[3]]);
                        pixels.push(quantize(value));
                    }
                }
            }
        }
    }
    pixels
}

fn quantize(value: f32) -> u8 {
    // NaN maps to zero through the saturating cast.
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}
