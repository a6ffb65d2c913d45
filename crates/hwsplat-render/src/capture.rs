//! Output image readback

use glam::Vec4;
use half::f16;
use hwsplat_raster::{BlendEquation, Image};

use crate::context::RenderContext;
use crate::error::RenderResult;
use crate::readback::map_blocking;

/// Bytes per `Rgba16Float` texel
const BYTES_PER_PIXEL: u32 = 8;

/// One frame read back from the output image
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    /// RGBA8, premultiplied color and coverage alpha
    pub data: Vec<u8>,
    /// Resolved float image (premultiplied rgb, coverage)
    pub image: Image,
}

/// Copies the output texture into a mappable staging buffer
pub struct FrameCapture {
    staging_buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    /// Bytes per row (aligned)
    bytes_per_row: u32,
}

impl FrameCapture {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        // WGPU requires 256-byte row alignment
        let bytes_per_row = (width * BYTES_PER_PIXEL).next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Capture Staging Buffer"),
            size: bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            staging_buffer,
            width,
            height,
            bytes_per_row,
        }
    }

    /// Read the current output image and resolve it with `equation`
    pub fn capture(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        ctx: &RenderContext,
        equation: BlendEquation,
    ) -> RenderResult<CapturedFrame> {
        let (width, height) = ctx.dimensions();
        if (width, height) != (self.width, self.height) {
            *self = Self::new(device, width, height);
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Capture Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: ctx.output_texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &self.staging_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(self.bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = self.staging_buffer.slice(..);
        map_blocking(device, slice)?;
        let data = slice.get_mapped_range();

        // Remove row padding
        let mut pixels = Vec::with_capacity((self.width * self.height) as usize);
        for row in 0..self.height {
            let start = (row * self.bytes_per_row) as usize;
            let end = start + (self.width * BYTES_PER_PIXEL) as usize;
            for texel in data[start..end].chunks_exact(BYTES_PER_PIXEL as usize) {
                let c: [f16; 4] = bytemuck::pod_read_unaligned(texel);
                let accumulated = Vec4::new(c[0].to_f32(), c[1].to_f32(), c[2].to_f32(), c[3].to_f32());
                pixels.push(equation.resolve(accumulated));
            }
        }

        drop(data);
        self.staging_buffer.unmap();

        let image = Image {
            width: self.width,
            height: self.height,
            pixels,
        };
        tracing::debug!("Captured {}x{} frame", image.width, image.height);

        Ok(CapturedFrame {
            width: self.width,
            height: self.height,
            data: image.to_rgba8(),
            image,
        })
    }
}
