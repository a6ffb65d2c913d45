//! GPU pipeline checks against the CPU reference; skipped without an adapter

use approx::assert_relative_eq;
use glam::Vec4;
use hwsplat_raster::sh::predict_color;
use hwsplat_raster::synthetic::{axis_camera, axis_line, random_cloud};
use hwsplat_raster::*;
use hwsplat_render::readback::read_buffer;
use hwsplat_render::{HeadlessConfig, HeadlessRenderer, RenderError};

fn headless(store: &GaussianStore, width: u32, height: u32) -> Option<HeadlessRenderer> {
    match pollster::block_on(HeadlessRenderer::new(HeadlessConfig { width, height }, store)) {
        Ok(renderer) => Some(renderer),
        Err(RenderError::NoAdapter) => {
            eprintln!("no GPU adapter, skipping");
            None
        }
        Err(e) => panic!("headless renderer: {e}"),
    }
}

fn quads_only(front_to_back: bool, software_blending: bool) -> RenderSettings {
    RenderSettings {
        render_quads: true,
        render_points: false,
        front_to_back,
        software_blending,
        min_opacity: 0.1,
        ..Default::default()
    }
}

fn off_axis_camera(width: u32, height: u32) -> FrameCamera {
    OrbitCamera {
        theta: 0.7,
        phi: 0.4,
        ..Default::default()
    }
    .frame(width, height)
}

/// Random cloud with view-dependent color in every higher-order SH band
fn shaded_cloud(count: usize, seed: u64) -> GaussianStore {
    let mut store = random_cloud(count, seed);
    for (g, coeffs) in store.sh_coeffs.chunks_exact_mut(SH_COEFFS_PER_GAUSSIAN).enumerate() {
        for (c, channel) in coeffs.chunks_exact_mut(SH_COEFFS_PER_CHANNEL).enumerate() {
            for (k, value) in channel.iter_mut().enumerate().skip(1) {
                *value = 0.05 * ((g * 7 + c * 3 + k) as f32).sin();
            }
        }
    }
    store
}

fn read_vec4s(renderer: &HeadlessRenderer, buffer: &wgpu::Buffer, count: u32) -> Vec<Vec4> {
    read_buffer::<[f32; 4]>(renderer.device(), renderer.queue(), buffer, count as usize)
        .unwrap()
        .into_iter()
        .map(Vec4::from_array)
        .collect()
}

fn cpu_footprint(store: &GaussianStore, index: usize, camera: &FrameCamera, settings: &RenderSettings) -> Footprint {
    project_footprint(
        store.position(index),
        store.scale(index),
        store.rotation(index),
        store.opacities[index],
        camera,
        settings,
    )
    .unwrap()
}

fn assert_footprints_match(gpu: &Footprint, cpu: &Footprint) {
    assert_relative_eq!(gpu.center.x, cpu.center.x, epsilon = 1e-2);
    assert_relative_eq!(gpu.center.y, cpu.center.y, epsilon = 1e-2);
    assert_relative_eq!(gpu.conic.x, cpu.conic.x, epsilon = 1e-5, max_relative = 2e-3);
    assert_relative_eq!(gpu.conic.y, cpu.conic.y, epsilon = 1e-4 * (cpu.conic.x + cpu.conic.z), max_relative = 2e-3);
    assert_relative_eq!(gpu.conic.z, cpu.conic.z, epsilon = 1e-5, max_relative = 2e-3);
    assert_relative_eq!(gpu.opacity, cpu.opacity, epsilon = 1e-5, max_relative = 1e-3);
    // whole pixels, rounding at the boundary may differ
    assert!((gpu.aabb - cpu.aabb).abs().max_element() <= 1.0);
    assert_relative_eq!(gpu.eigen_vec.length(), 1.0, epsilon = 1e-3);
}

fn sorted_on_gpu(renderer: &HeadlessRenderer, count: u32) -> (Vec<u32>, Vec<f32>) {
    let ctx = renderer.context();
    let indices = read_buffer(renderer.device(), renderer.queue(), &ctx.buffers.sorted_indices, count as usize).unwrap();
    let depths = read_buffer(renderer.device(), renderer.queue(), &ctx.buffers.sorted_depths, count as usize).unwrap();
    (indices, depths)
}

#[test]
fn test_axis_line_order() {
    let store = axis_line(&[1.0, 2.0, 3.0], 0.5);
    let camera = axis_camera(64, 64);
    let Some(mut renderer) = headless(&store, 64, 64) else {
        return;
    };

    let (report, _) = renderer.render(&camera, &quads_only(true, false)).unwrap();
    assert_eq!(report.visible_count, 3);
    assert_eq!(
        report.sequence(),
        vec![
            FrameStage::Init,
            FrameStage::Visibility,
            FrameStage::ReadbackVisibleCount,
            FrameStage::Sort,
            FrameStage::Footprint,
            FrameStage::Color,
            FrameStage::Composite,
            FrameStage::Done,
        ]
    );
    let (indices, depths) = sorted_on_gpu(&renderer, 3);
    assert_eq!(indices, vec![0, 1, 2]);
    assert_relative_eq!(depths[0], 1.0, epsilon = 1e-5);
    assert_relative_eq!(depths[2], 3.0, epsilon = 1e-5);

    renderer.render(&camera, &quads_only(false, false)).unwrap();
    let (indices, _) = sorted_on_gpu(&renderer, 3);
    assert_eq!(indices, vec![2, 1, 0]);
}

#[test]
fn test_visible_and_sorted_match_reference() {
    let store = random_cloud(4_000, 3);
    let camera = OrbitCamera::default().frame(128, 96);
    let Some(mut renderer) = headless(&store, 128, 96) else {
        return;
    };

    for front_to_back in [true, false] {
        let settings = quads_only(front_to_back, false);
        let reference = render_reference(&store, &camera, &settings);
        let report = renderer.render_frame(&camera, &settings).unwrap();
        assert_eq!(report.visible_count, reference.report.visible_count);

        let (mut indices, depths) = sorted_on_gpu(&renderer, report.visible_count);
        for (gpu, cpu) in depths.iter().zip(&reference.sorted.depths) {
            assert_relative_eq!(*gpu, *cpu, epsilon = 1e-4);
        }
        let sorted = SortedSet {
            indices: indices.clone(),
            depths,
            order: settings.depth_order(),
        };
        assert!(sorted.is_monotonic());

        let mut expected = reference.visible.indices.clone();
        expected.sort_unstable();
        indices.sort_unstable();
        assert_eq!(indices, expected);
    }
}

#[test]
fn test_image_matches_reference() {
    let store = axis_line(&[1.0, 2.0], 0.8);
    let camera = axis_camera(48, 48);
    let Some(mut renderer) = headless(&store, 48, 48) else {
        return;
    };

    for software_blending in [false, true] {
        let settings = quads_only(true, software_blending);
        let reference = render_reference(&store, &camera, &settings);
        let (_, frame) = renderer.render(&camera, &settings).unwrap();
        assert_eq!((frame.width, frame.height), (48, 48));

        // f16 storage and rasterizer rounding
        for (gpu, cpu) in frame.image.pixels.iter().zip(&reference.image.pixels) {
            assert_relative_eq!(gpu.w, cpu.w, epsilon = 2e-2);
            assert_relative_eq!(gpu.x, cpu.x, epsilon = 2e-2);
        }
    }
}

#[test]
fn test_zero_visible_clears() {
    let store = axis_line(&[-1.0, 500.0], 0.9);
    let camera = axis_camera(16, 16);
    let Some(mut renderer) = headless(&store, 16, 16) else {
        return;
    };

    let (report, frame) = renderer.render(&camera, &quads_only(true, false)).unwrap();
    assert_eq!(report.visible_count, 0);
    assert!(!report.ran(FrameStage::Sort));
    assert!(frame.image.pixels.iter().all(|p| p.w == 0.0));
}

#[test]
fn test_resize_reallocates_output() {
    let store = axis_line(&[2.0], 0.9);
    let Some(mut renderer) = headless(&store, 32, 32) else {
        return;
    };

    renderer.resize(40, 24);
    assert_eq!(renderer.context().dimensions(), (40, 24));
    let size = renderer.context().output_texture().size();
    assert_eq!((size.width, size.height), (40, 24));

    let (_, frame) = renderer
        .render(&axis_camera(40, 24), &RenderSettings::default())
        .unwrap();
    assert_eq!((frame.width, frame.height), (40, 24));
    assert_eq!(frame.data.len(), 40 * 24 * 4);
}

#[test]
fn test_footprints_and_colors_match_reference() {
    let store = shaded_cloud(2_000, 9);
    let camera = off_axis_camera(160, 120);
    let Some(mut renderer) = headless(&store, 160, 120) else {
        return;
    };

    for antialiasing in [false, true] {
        let settings = RenderSettings {
            antialiasing,
            ..quads_only(true, false)
        };
        let report = renderer.render_frame(&camera, &settings).unwrap();
        let count = report.visible_count;
        assert!(count > 1_000);

        let (indices, _) = sorted_on_gpu(&renderer, count);
        let ctx = renderer.context();
        let boxes = read_vec4s(&renderer, &ctx.buffers.bounding_boxes, count);
        let conics = read_vec4s(&renderer, &ctx.buffers.conic_opacity, count);
        let oriented = read_vec4s(&renderer, &ctx.buffers.oriented_boxes, count);
        let colors = read_vec4s(&renderer, &ctx.buffers.colors, count);

        for (slot, &index) in indices.iter().enumerate() {
            let index = index as usize;
            let gpu = Footprint::from_packed(boxes[slot], conics[slot], oriented[slot]);
            assert_footprints_match(&gpu, &cpu_footprint(&store, index, &camera, &settings));

            let expected = predict_color(&store, index, camera.position);
            assert_relative_eq!(colors[slot].x, expected.x, epsilon = 1e-4);
            assert_relative_eq!(colors[slot].y, expected.y, epsilon = 1e-4);
            assert_relative_eq!(colors[slot].z, expected.z, epsilon = 1e-4);
        }
    }
}

#[test]
fn test_off_axis_image_matches_reference() {
    let store = shaded_cloud(300, 4);
    let camera = off_axis_camera(64, 48);
    let Some(mut renderer) = headless(&store, 64, 48) else {
        return;
    };

    for (front_to_back, software_blending) in [(true, false), (true, true), (false, false), (false, true)] {
        let settings = RenderSettings {
            antialiasing: true,
            ..quads_only(front_to_back, software_blending)
        };
        let reference = render_reference(&store, &camera, &settings);
        let (_, frame) = renderer.render(&camera, &settings).unwrap();

        for (gpu, cpu) in frame.image.pixels.iter().zip(&reference.image.pixels) {
            assert_relative_eq!(gpu.x, cpu.x, epsilon = 3e-2);
            assert_relative_eq!(gpu.y, cpu.y, epsilon = 3e-2);
            assert_relative_eq!(gpu.z, cpu.z, epsilon = 3e-2);
            assert_relative_eq!(gpu.w, cpu.w, epsilon = 3e-2);
        }
    }
}

#[test]
fn test_selected_footprint_readback() {
    let store = random_cloud(500, 13);
    let camera = off_axis_camera(96, 72);
    let Some(mut renderer) = headless(&store, 96, 72) else {
        return;
    };

    let settings = quads_only(true, false);
    let reference = render_reference(&store, &camera, &settings);
    let visible = reference.visible.indices[reference.visible.len() / 2];

    for antialiasing in [false, true] {
        let settings = RenderSettings {
            antialiasing,
            selected_gaussian: Some(visible),
            ..settings.clone()
        };
        let report = renderer.render_frame(&camera, &settings).unwrap();
        let selected = report.selected.unwrap();
        assert_eq!(selected.index, visible);

        let (indices, _) = sorted_on_gpu(&renderer, report.visible_count);
        assert_eq!(indices[selected.slot as usize], visible);
        assert_footprints_match(
            &selected.footprint,
            &cpu_footprint(&store, visible as usize, &camera, &settings),
        );
    }

    // below min opacity, so never gets a slot
    let hidden = (0..store.len() as u32).find(|&i| store.opacities[i as usize] < settings.min_opacity);
    if let Some(hidden) = hidden {
        let report = renderer
            .render_frame(
                &camera,
                &RenderSettings {
                    selected_gaussian: Some(hidden),
                    ..settings.clone()
                },
            )
            .unwrap();
        assert!(report.selected.is_none());
    }

    // points only: no quad footprints to report
    let report = renderer
        .render_frame(
            &camera,
            &RenderSettings {
                selected_gaussian: Some(visible),
                ..RenderSettings::default()
            },
        )
        .unwrap();
    assert!(report.selected.is_none());
}

#[test]
fn test_camera_size_drives_output() {
    let store = axis_line(&[1.0, 2.0], 0.8);
    let Some(mut renderer) = headless(&store, 32, 32) else {
        return;
    };

    let camera = axis_camera(64, 64);
    for software_blending in [false, true] {
        let settings = quads_only(true, software_blending);
        let reference = render_reference(&store, &camera, &settings);
        let (_, frame) = renderer.render(&camera, &settings).unwrap();

        assert_eq!((frame.width, frame.height), (64, 64));
        assert_eq!(renderer.context().dimensions(), (64, 64));
        assert_eq!((renderer.config().width, renderer.config().height), (64, 64));
        for (gpu, cpu) in frame.image.pixels.iter().zip(&reference.image.pixels) {
            assert_relative_eq!(gpu.x, cpu.x, epsilon = 2e-2);
            assert_relative_eq!(gpu.w, cpu.w, epsilon = 2e-2);
        }
        // centered at (32, 32), not at the old 16x16 center
        assert!(frame.image.get(32, 32).w > 0.5);
        assert!(frame.image.get(16, 16).w < 1e-2);
    }
}

#[test]
fn test_points_match_reference() {
    let store = axis_line(&[2.0, 3.0], 0.9);
    let camera = axis_camera(9, 9);
    let Some(mut renderer) = headless(&store, 9, 9) else {
        return;
    };

    for front_to_back in [true, false] {
        let settings = RenderSettings {
            front_to_back,
            ..Default::default()
        };
        let reference = render_reference(&store, &camera, &settings);
        let (report, frame) = renderer.render(&camera, &settings).unwrap();
        assert!(report.ran(FrameStage::Points));
        assert!(!report.ran(FrameStage::Composite));

        // the nearer red point wins the depth test
        let center = frame.image.get(4, 4);
        assert_relative_eq!(center.w, 1.0, epsilon = 1e-3);
        assert_relative_eq!(center.x, 1.0, epsilon = 1e-2);
        assert_relative_eq!(center.y, 0.2, epsilon = 1e-2);

        for (gpu, cpu) in frame.image.pixels.iter().zip(&reference.image.pixels) {
            assert_relative_eq!(gpu.x, cpu.x, epsilon = 1e-2);
            assert_relative_eq!(gpu.y, cpu.y, epsilon = 1e-2);
            assert_relative_eq!(gpu.w, cpu.w, epsilon = 1e-3);
        }
    }
}
