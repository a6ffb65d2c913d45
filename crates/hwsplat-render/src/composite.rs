//! Render paths and compositing strategies
//!
//! The quad path draws one screen-aligned quad per sorted slot and blends it
//! either with fixed-function blending ([`QuadPass`]) or in a compute
//! compositor where each pixel is owned by one invocation
//! ([`InterlockedPass`]). The point path ([`PointPass`]) draws every gaussian
//! as one depth-tested point.

use glam::Vec4;
use hwsplat_raster::{shaders, BlendEquation, DepthOrder, COMPOSITE_TILE_SIZE};
use wgpu::ShaderStages;

use crate::bindings;
use crate::context::{RenderContext, DEPTH_FORMAT, OUTPUT_FORMAT};

fn to_wgpu_color(c: Vec4) -> wgpu::Color {
    wgpu::Color {
        r: c.x as f64,
        g: c.y as f64,
        b: c.z as f64,
        a: c.w as f64,
    }
}

/// Fixed-function blend state realizing [`BlendEquation::apply`]
pub fn blend_state(order: DepthOrder) -> wgpu::BlendState {
    match order {
        // color = src * dst.a + dst, alpha = dst.a * (1 - src.a)
        DepthOrder::FrontToBack => wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::DstAlpha,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::Zero,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
        },
        DepthOrder::BackToFront => wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
    }
}

/// Clear the output image to the accumulation clear color without drawing
pub fn clear_output(encoder: &mut wgpu::CommandEncoder, ctx: &RenderContext, equation: BlendEquation) {
    let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Clear Output Pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: ctx.output_view(),
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(to_wgpu_color(equation.clear_color())),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
}

/// Instanced quads blended by the output merger in slot order
pub struct QuadPass {
    layout: wgpu::BindGroupLayout,
    front_to_back: wgpu::RenderPipeline,
    back_to_front: wgpu::RenderPipeline,
}

impl QuadPass {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Quad Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::QUAD.into()),
        });

        let both = ShaderStages::VERTEX | ShaderStages::FRAGMENT;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Quad Bind Group Layout"),
            entries: &[
                bindings::frame_uniforms(both),
                // bounding boxes
                bindings::storage(1, both, true),
                // conic + opacity
                bindings::storage(2, ShaderStages::FRAGMENT, true),
                // colors
                bindings::storage(3, ShaderStages::FRAGMENT, true),
            ],
        });
        let pipeline_layout = bindings::pipeline_layout(device, "Quad Pipeline Layout", &layout);

        let pipeline = |label: &str, order: DepthOrder| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: OUTPUT_FORMAT,
                        blend: Some(blend_state(order)),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        Self {
            front_to_back: pipeline("Quad Pipeline (front-to-back)", DepthOrder::FrontToBack),
            back_to_front: pipeline("Quad Pipeline (back-to-front)", DepthOrder::BackToFront),
            layout,
        }
    }

    pub fn record(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        ctx: &RenderContext,
        equation: BlendEquation,
        count: u32,
    ) {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Quad Bind Group"),
            layout: &self.layout,
            entries: &bindings::buffer_entries(&[
                &ctx.frame_uniforms,
                &ctx.buffers.bounding_boxes,
                &ctx.buffers.conic_opacity,
                &ctx.buffers.colors,
            ]),
        });
        let pipeline = match equation.order {
            DepthOrder::FrontToBack => &self.front_to_back,
            DepthOrder::BackToFront => &self.back_to_front,
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Quad Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: ctx.output_view(),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(to_wgpu_color(equation.clear_color())),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        // instances are submitted in slot order
        pass.draw(0..6, 0..count);
    }
}

/// Compute compositor with one owning invocation per pixel
pub struct InterlockedPass {
    layout: wgpu::BindGroupLayout,
    clear_pipeline: wgpu::ComputePipeline,
    composite_pipeline: wgpu::ComputePipeline,
    resolve_pipeline: wgpu::ComputePipeline,
}

impl InterlockedPass {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Interlocked Composite Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::QUAD_INTERLOCK.into()),
        });

        let mut entries = vec![
            bindings::frame_uniforms(ShaderStages::COMPUTE),
            bindings::uniform(1, ShaderStages::COMPUTE),
        ];
        // boxes, conics, colors, accumulation image
        entries.extend(bindings::compute_storage(2, &[true, true, true, false]));
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 6,
            visibility: ShaderStages::COMPUTE,
            ty: wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: OUTPUT_FORMAT,
                view_dimension: wgpu::TextureViewDimension::D2,
            },
            count: None,
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Interlocked Bind Group Layout"),
            entries: &entries,
        });

        let pipeline_layout = bindings::pipeline_layout(device, "Interlocked Pipeline Layout", &layout);
        Self {
            clear_pipeline: bindings::compute_pipeline(device, "Interlocked Clear Pipeline", &pipeline_layout, &shader, "clear"),
            composite_pipeline: bindings::compute_pipeline(device, "Interlocked Composite Pipeline", &pipeline_layout, &shader, "composite"),
            resolve_pipeline: bindings::compute_pipeline(device, "Interlocked Resolve Pipeline", &pipeline_layout, &shader, "resolve"),
            layout,
        }
    }

    /// Clear, composite the first `slots.count` slots, then copy to the output texture
    pub fn record(&self, device: &wgpu::Device, encoder: &mut wgpu::CommandEncoder, ctx: &RenderContext) {
        let mut entries = bindings::buffer_entries(&[
            &ctx.frame_uniforms,
            &ctx.slots,
            &ctx.buffers.bounding_boxes,
            &ctx.buffers.conic_opacity,
            &ctx.buffers.colors,
            &ctx.targets.image,
        ]);
        entries.push(wgpu::BindGroupEntry {
            binding: 6,
            resource: wgpu::BindingResource::TextureView(ctx.output_view()),
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Interlocked Bind Group"),
            layout: &self.layout,
            entries: &entries,
        });

        let (width, height) = ctx.dimensions();
        let tiles_x = width.div_ceil(COMPOSITE_TILE_SIZE);
        let tiles_y = height.div_ceil(COMPOSITE_TILE_SIZE);

        for (label, pipeline) in [
            ("Interlocked Clear Pass", &self.clear_pipeline),
            ("Interlocked Composite Pass", &self.composite_pipeline),
            ("Interlocked Resolve Pass", &self.resolve_pipeline),
        ] {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(tiles_x, tiles_y, 1);
        }
    }
}

/// One depth-tested point per gaussian
pub struct PointPass {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
}

impl PointPass {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Point Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::POINT.into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Point Bind Group Layout"),
            entries: &[
                bindings::frame_uniforms(ShaderStages::VERTEX | ShaderStages::FRAGMENT),
                bindings::storage(1, ShaderStages::VERTEX, true),
                bindings::storage(2, ShaderStages::VERTEX, true),
            ],
        });
        let pipeline_layout = bindings::pipeline_layout(device, "Point Pipeline Layout", &layout);

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Point Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: OUTPUT_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::PointList,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self { layout, pipeline }
    }

    /// Draw every gaussian; keeps the existing image when `load_existing`
    pub fn record(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        ctx: &RenderContext,
        equation: BlendEquation,
        load_existing: bool,
    ) {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Point Bind Group"),
            layout: &self.layout,
            entries: &bindings::buffer_entries(&[
                &ctx.frame_uniforms,
                &ctx.scene.positions,
                &ctx.buffers.point_colors,
            ]),
        });
        let load = if load_existing {
            wgpu::LoadOp::Load
        } else {
            wgpu::LoadOp::Clear(to_wgpu_color(equation.clear_color()))
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Point Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: ctx.output_view(),
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &ctx.targets.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..ctx.num_gaussians(), 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_back_to_front_is_premultiplied_over() {
        let state = blend_state(DepthOrder::BackToFront);
        assert_eq!(state.color.src_factor, wgpu::BlendFactor::One);
        assert_eq!(state.color.dst_factor, wgpu::BlendFactor::OneMinusSrcAlpha);
        assert_eq!(state.alpha.dst_factor, wgpu::BlendFactor::OneMinusSrcAlpha);
    }

    #[test]
    fn test_front_to_back_keeps_transmittance() {
        let state = blend_state(DepthOrder::FrontToBack);
        assert_eq!(state.color.src_factor, wgpu::BlendFactor::DstAlpha);
        assert_eq!(state.color.dst_factor, wgpu::BlendFactor::One);
        assert_eq!(state.alpha.src_factor, wgpu::BlendFactor::Zero);
    }
}
