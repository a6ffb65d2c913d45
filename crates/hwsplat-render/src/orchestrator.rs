//! Per-frame stage sequencing on the GPU
//!
//! `Init -> Visibility -> ReadbackVisibleCount -> Sort -> Footprint -> Color
//! -> Composite -> Done`, with the point path after the quad path when both
//! are enabled. The visible count readback is the only host/GPU sync point.

use glam::Vec4;
use hwsplat_raster::{
    BlendEquation, CompositeStrategy, Footprint, FrameCamera, FrameReport, FrameStage,
    FrameUniforms, RenderSettings, SelectedFootprint, SlotParams,
};

use crate::composite::{clear_output, InterlockedPass, PointPass, QuadPass};
use crate::context::RenderContext;
use crate::error::RenderResult;
use crate::passes::{ColorPass, ColorTarget, FootprintPass, SortPass, VisibilityPass};
use crate::readback::{read_buffer_range, read_u32};

/// Every pipeline a frame may run
pub struct FrameOrchestrator {
    visibility: VisibilityPass,
    sort: SortPass,
    footprint: FootprintPass,
    color: ColorPass,
    quads: QuadPass,
    interlocked: InterlockedPass,
    points: PointPass,
}

impl FrameOrchestrator {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            visibility: VisibilityPass::new(device),
            sort: SortPass::new(device),
            footprint: FootprintPass::new(device),
            color: ColorPass::new(device),
            quads: QuadPass::new(device),
            interlocked: InterlockedPass::new(device),
            points: PointPass::new(device),
        }
    }

    /// Render one frame into `ctx`'s output image
    ///
    /// The output image follows the camera's framebuffer size and is
    /// reallocated when it differs. Stage times in the report cover host-side
    /// recording and the count readback, not GPU execution.
    pub fn render(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        ctx: &mut RenderContext,
        camera: &FrameCamera,
        settings: &RenderSettings,
    ) -> RenderResult<FrameReport> {
        if ctx.dimensions() != (camera.width, camera.height) {
            ctx.resize(device, camera.width, camera.height);
        }
        let ctx = &*ctx;

        let mut report = FrameReport::new();
        let n = ctx.num_gaussians();
        let equation = BlendEquation::new(settings.depth_order());

        let uniforms = FrameUniforms::new(camera, settings, n);
        queue.write_buffer(&ctx.frame_uniforms, 0, bytemuck::bytes_of(&uniforms));
        queue.write_buffer(&ctx.buffers.visible_count, 0, &[0u8; 4]);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Visibility Encoder"),
        });
        report.time(FrameStage::Visibility, || {
            self.visibility.record(device, &mut encoder, ctx)
        });
        queue.submit(std::iter::once(encoder.finish()));

        let count = report.time(FrameStage::ReadbackVisibleCount, || {
            read_u32(device, queue, &ctx.buffers.visible_count)
        })?;
        report.visible_count = count;
        queue.write_buffer(&ctx.slots, 0, bytemuck::bytes_of(&SlotParams::new(count)));
        queue.write_buffer(&ctx.buffers.selected_slot, 0, bytemuck::bytes_of(&u32::MAX));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

        let quads_drawn = settings.render_quads && count > 0;
        if quads_drawn {
            report.time(FrameStage::Sort, || self.sort.record(device, &mut encoder, ctx, count));
            report.time(FrameStage::Footprint, || {
                self.footprint.record(device, &mut encoder, ctx, count)
            });
            report.time(FrameStage::Color, || {
                self.color.record(device, &mut encoder, ctx, ColorTarget::SortedSlots, count)
            });
            report.time(FrameStage::Composite, || {
                match CompositeStrategy::from_software_blending(settings.software_blending) {
                    CompositeStrategy::Hardware => {
                        self.quads.record(device, &mut encoder, ctx, equation, count)
                    }
                    CompositeStrategy::Interlocked => {
                        self.interlocked.record(device, &mut encoder, ctx)
                    }
                }
            });
        }

        let points_drawn = settings.render_points && n > 0;
        if points_drawn {
            report.time(FrameStage::Points, || {
                self.color.record(device, &mut encoder, ctx, ColorTarget::AllGaussians, n);
                self.points.record(device, &mut encoder, ctx, equation, quads_drawn);
            });
        }

        if !quads_drawn && !points_drawn {
            clear_output(&mut encoder, ctx, equation);
        }

        queue.submit(std::iter::once(encoder.finish()));

        if let Some(index) = settings.selected_in(n as usize) {
            if quads_drawn {
                report.selected = read_selected(device, queue, ctx, index as u32)?;
            }
            match &report.selected {
                Some(s) => tracing::info!("Selected gaussian {}: slot {} -> {:?}", index, s.slot, s.footprint),
                None => tracing::info!("Selected gaussian {} was not drawn", index),
            }
        }

        report.finish();
        Ok(report)
    }
}

/// Read back the footprint the GPU computed for `index`, if it got a slot
fn read_selected(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    ctx: &RenderContext,
    index: u32,
) -> RenderResult<Option<SelectedFootprint>> {
    let slot = read_u32(device, queue, &ctx.buffers.selected_slot)?;
    if slot == u32::MAX {
        return Ok(None);
    }

    let record = |buffer: &wgpu::Buffer| -> RenderResult<Vec4> {
        let values = read_buffer_range::<[f32; 4]>(device, queue, buffer, slot as usize, 1)?;
        Ok(values.first().copied().map_or(Vec4::ZERO, Vec4::from_array))
    };
    let footprint = Footprint::from_packed(
        record(&ctx.buffers.bounding_boxes)?,
        record(&ctx.buffers.conic_opacity)?,
        record(&ctx.buffers.oriented_boxes)?,
    );

    Ok(Some(SelectedFootprint {
        index,
        slot,
        footprint,
    }))
}
