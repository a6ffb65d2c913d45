//! Compute passes: visibility, sort, footprint and color
//!
//! Each pass owns its bind group layout and pipelines and records one or
//! more compute passes into the caller's encoder. wgpu orders passes within
//! a submission, which provides the full barrier between stages.

use hwsplat_raster::sort::{bitonic_steps, next_pow2};
use hwsplat_raster::{
    dispatch_size, shaders, SortParams, SH_LANES, SORT_WORKGROUP_SIZE, WORKGROUP_SIZE,
};
use wgpu::util::DeviceExt;
use wgpu::ShaderStages;

use crate::bindings;
use crate::context::RenderContext;

fn dispatch(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    pipeline: &wgpu::ComputePipeline,
    bind_group: &wgpu::BindGroup,
    groups: (u32, u32),
) {
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.dispatch_workgroups(groups.0, groups.1, 1);
}

/// Depth-range and opacity test with atomic compaction
pub struct VisibilityPass {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

impl VisibilityPass {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Visibility Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::VISIBILITY.into()),
        });

        let mut entries = vec![bindings::frame_uniforms(ShaderStages::COMPUTE)];
        // positions, opacities, counter, indices, depths
        entries.extend(bindings::compute_storage(1, &[true, true, false, false, false]));
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Visibility Bind Group Layout"),
            entries: &entries,
        });

        let pipeline_layout = bindings::pipeline_layout(device, "Visibility Pipeline Layout", &layout);
        let pipeline = bindings::compute_pipeline(device, "Visibility Pipeline", &pipeline_layout, &shader, "main");

        Self { layout, pipeline }
    }

    /// The visible counter must be zeroed before this runs
    pub fn record(&self, device: &wgpu::Device, encoder: &mut wgpu::CommandEncoder, ctx: &RenderContext) {
        let n = ctx.num_gaussians();
        if n == 0 {
            return;
        }
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Visibility Bind Group"),
            layout: &self.layout,
            entries: &bindings::buffer_entries(&[
                &ctx.frame_uniforms,
                &ctx.scene.positions,
                &ctx.scene.opacities,
                &ctx.buffers.visible_count,
                &ctx.buffers.visible_indices,
                &ctx.buffers.visible_depths,
            ]),
        });
        dispatch(encoder, "Visibility Pass", &self.pipeline, &bind_group, dispatch_size(n, WORKGROUP_SIZE));
    }
}

/// Bitonic sort of the compacted list by depth key
pub struct SortPass {
    layout: wgpu::BindGroupLayout,
    prepare_pipeline: wgpu::ComputePipeline,
    step_pipeline: wgpu::ComputePipeline,
    gather_pipeline: wgpu::ComputePipeline,
}

impl SortPass {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Sort Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::SORT.into()),
        });

        let mut entries = vec![
            bindings::frame_uniforms(ShaderStages::COMPUTE),
            bindings::uniform(1, ShaderStages::COMPUTE),
        ];
        // visible indices/depths in, keys, values, sorted indices/depths and selected slot out
        entries.extend(bindings::compute_storage(2, &[true, true, false, false, false, false, false]));
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Sort Bind Group Layout"),
            entries: &entries,
        });

        let pipeline_layout = bindings::pipeline_layout(device, "Sort Pipeline Layout", &layout);
        let prepare_pipeline = bindings::compute_pipeline(device, "Sort Prepare Pipeline", &pipeline_layout, &shader, "prepare_keys");
        let step_pipeline = bindings::compute_pipeline(device, "Bitonic Step Pipeline", &pipeline_layout, &shader, "bitonic_step");
        let gather_pipeline = bindings::compute_pipeline(device, "Sort Gather Pipeline", &pipeline_layout, &shader, "gather");

        Self {
            layout,
            prepare_pipeline,
            step_pipeline,
            gather_pipeline,
        }
    }

    fn bind_group(&self, device: &wgpu::Device, ctx: &RenderContext, params: SortParams) -> wgpu::BindGroup {
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sort Params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Sort Bind Group"),
            layout: &self.layout,
            entries: &bindings::buffer_entries(&[
                &ctx.frame_uniforms,
                &params_buffer,
                &ctx.buffers.visible_indices,
                &ctx.buffers.visible_depths,
                &ctx.buffers.keys,
                &ctx.buffers.values,
                &ctx.buffers.sorted_indices,
                &ctx.buffers.sorted_depths,
                &ctx.buffers.selected_slot,
            ]),
        })
    }

    /// Sort the first `count` compacted entries
    pub fn record(&self, device: &wgpu::Device, encoder: &mut wgpu::CommandEncoder, ctx: &RenderContext, count: u32) {
        if count == 0 {
            return;
        }
        let padded = next_pow2(count);
        let params = SortParams {
            count,
            padded,
            k: 0,
            j: 0,
        };
        let groups = dispatch_size(padded, SORT_WORKGROUP_SIZE);

        let bind_group = self.bind_group(device, ctx, params);
        dispatch(encoder, "Sort Prepare Pass", &self.prepare_pipeline, &bind_group, groups);

        for step in bitonic_steps(padded) {
            let bind_group = self.bind_group(
                device,
                ctx,
                SortParams {
                    k: step.k,
                    j: step.j,
                    ..params
                },
            );
            dispatch(encoder, "Bitonic Step Pass", &self.step_pipeline, &bind_group, groups);
        }

        let bind_group = self.bind_group(device, ctx, params);
        dispatch(encoder, "Sort Gather Pass", &self.gather_pipeline, &bind_group, dispatch_size(count, SORT_WORKGROUP_SIZE));
    }
}

/// Per-slot conic, center and screen extents
pub struct FootprintPass {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

impl FootprintPass {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Footprint Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::FOOTPRINT.into()),
        });

        let mut entries = vec![
            bindings::frame_uniforms(ShaderStages::COMPUTE),
            bindings::uniform(1, ShaderStages::COMPUTE),
        ];
        entries.extend(bindings::compute_storage(
            2,
            &[true, true, true, true, true, false, false, false],
        ));
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Footprint Bind Group Layout"),
            entries: &entries,
        });

        let pipeline_layout = bindings::pipeline_layout(device, "Footprint Pipeline Layout", &layout);
        let pipeline = bindings::compute_pipeline(device, "Footprint Pipeline", &pipeline_layout, &shader, "main");

        Self { layout, pipeline }
    }

    pub fn record(&self, device: &wgpu::Device, encoder: &mut wgpu::CommandEncoder, ctx: &RenderContext, count: u32) {
        if count == 0 {
            return;
        }
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Footprint Bind Group"),
            layout: &self.layout,
            entries: &bindings::buffer_entries(&[
                &ctx.frame_uniforms,
                &ctx.slots,
                &ctx.buffers.sorted_indices,
                &ctx.scene.positions,
                &ctx.scene.scales,
                &ctx.scene.rotations,
                &ctx.scene.opacities,
                &ctx.buffers.bounding_boxes,
                &ctx.buffers.conic_opacity,
                &ctx.buffers.oriented_boxes,
            ]),
        });
        dispatch(encoder, "Footprint Pass", &self.pipeline, &bind_group, dispatch_size(count, WORKGROUP_SIZE));
    }
}

/// Which gaussians the color pass evaluates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorTarget {
    /// Sorted visible slots, for the quad path
    SortedSlots,
    /// Every gaussian in load order, for the point path
    AllGaussians,
}

/// Spherical-harmonic color, 16 lanes per gaussian
pub struct ColorPass {
    layout: wgpu::BindGroupLayout,
    sorted_pipeline: wgpu::ComputePipeline,
    all_pipeline: wgpu::ComputePipeline,
}

impl ColorPass {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Color Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::COLORS.into()),
        });

        let mut entries = vec![
            bindings::frame_uniforms(ShaderStages::COMPUTE),
            bindings::uniform(1, ShaderStages::COMPUTE),
        ];
        entries.extend(bindings::compute_storage(2, &[true, true, true, true, false]));
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Color Bind Group Layout"),
            entries: &entries,
        });

        let pipeline_layout = bindings::pipeline_layout(device, "Color Pipeline Layout", &layout);
        let sorted_pipeline = bindings::compute_pipeline(device, "Sorted Color Pipeline", &pipeline_layout, &shader, "sorted_colors");
        let all_pipeline = bindings::compute_pipeline(device, "All Color Pipeline", &pipeline_layout, &shader, "all_colors");

        Self {
            layout,
            sorted_pipeline,
            all_pipeline,
        }
    }

    pub fn record(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        ctx: &RenderContext,
        target: ColorTarget,
        count: u32,
    ) {
        if count == 0 {
            return;
        }
        let (pipeline, output) = match target {
            ColorTarget::SortedSlots => (&self.sorted_pipeline, &ctx.buffers.colors),
            ColorTarget::AllGaussians => (&self.all_pipeline, &ctx.buffers.point_colors),
        };
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Color Bind Group"),
            layout: &self.layout,
            entries: &bindings::buffer_entries(&[
                &ctx.frame_uniforms,
                &ctx.slots,
                &ctx.buffers.sorted_indices,
                &ctx.scene.positions,
                &ctx.scene.opacities,
                &ctx.scene.sh_coeffs,
                output,
            ]),
        });
        dispatch(encoder, "Color Pass", pipeline, &bind_group, dispatch_size(count * SH_LANES, WORKGROUP_SIZE));
    }
}
