use std::collections::HashMap;

use approx::assert_relative_eq;
use glam::Vec2;
use hwsplat_raster::composite::QuadPrimitive;
use hwsplat_raster::synthetic::{axis_camera, axis_line, random_cloud};
use hwsplat_raster::*;

fn quads_only(front_to_back: bool) -> RenderSettings {
    RenderSettings {
        render_quads: true,
        render_points: false,
        front_to_back,
        min_opacity: 0.1,
        ..Default::default()
    }
}

#[test]
fn test_end_to_end_axis_line() {
    let store = axis_line(&[1.0, 2.0, 3.0], 0.5);
    let camera = axis_camera(64, 64);

    let f2b = render_reference(&store, &camera, &quads_only(true));
    assert_eq!(f2b.report.visible_count, 3);
    assert_eq!(f2b.sorted.depths, vec![1.0, 2.0, 3.0]);
    assert_eq!(f2b.sorted.indices, vec![0, 1, 2]);

    let b2f = render_reference(&store, &camera, &quads_only(false));
    assert_eq!(b2f.report.visible_count, 3);
    assert_eq!(b2f.sorted.depths, vec![3.0, 2.0, 1.0]);
    assert_eq!(b2f.sorted.indices, vec![2, 1, 0]);

    assert_eq!(
        f2b.report.sequence(),
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
}

#[test]
fn test_sorted_is_permutation_of_visible() {
    let store = random_cloud(5_000, 11);
    let camera = OrbitCamera::default().frame(128, 96);

    for front_to_back in [true, false] {
        let frame = render_reference(&store, &camera, &quads_only(front_to_back));
        assert_eq!(frame.sorted.len(), frame.visible.len());
        assert!(frame.sorted.is_monotonic());

        let mut a = frame.visible.indices.clone();
        let mut b = frame.sorted.indices.clone();
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, b);

        let depth_of: HashMap<u32, f32> = frame
            .visible
            .indices
            .iter()
            .copied()
            .zip(frame.visible.depths.iter().copied())
            .collect();
        for (i, d) in frame.sorted.indices.iter().zip(&frame.sorted.depths) {
            assert_eq!(depth_of[i].to_bits(), d.to_bits());
        }
    }
}

#[test]
fn test_two_gaussians_over() {
    let store = axis_line(&[1.0, 2.0], 0.8);
    let camera = axis_camera(64, 64);
    let frame = render_reference(&store, &camera, &quads_only(true));
    assert_eq!(frame.sorted.indices, vec![0, 1]);

    let pixel = Vec2::new(32.5, 32.5);
    let prim = |slot: usize| QuadPrimitive {
        center: frame.footprints[slot].center,
        half_extent: frame.footprints[slot].aabb,
        conic: frame.footprints[slot].conic,
        opacity: frame.footprints[slot].opacity,
        color: frame.colors[slot].truncate(),
    };
    let (a, b) = (prim(0), prim(1));
    let (alpha_a, alpha_b) = (a.alpha_at(pixel), b.alpha_at(pixel));
    assert!(alpha_a > 0.1 && alpha_b > 0.1);

    let expected = a.color * alpha_a + (1.0 - alpha_a) * alpha_b * b.color;
    let out = frame.image.get(32, 32);
    assert_relative_eq!(out.x, expected.x, epsilon = 1e-5);
    assert_relative_eq!(out.y, expected.y, epsilon = 1e-5);
    assert_relative_eq!(out.z, expected.z, epsilon = 1e-5);
    assert_relative_eq!(out.w, 1.0 - (1.0 - alpha_a) * (1.0 - alpha_b), epsilon = 1e-5);
}

#[test]
fn test_composite_strategies_agree() {
    let store = random_cloud(3_000, 5);
    let camera = OrbitCamera::default().frame(96, 64);

    for front_to_back in [true, false] {
        let hardware = render_reference(&store, &camera, &quads_only(front_to_back));
        let interlocked = render_reference(
            &store,
            &camera,
            &RenderSettings {
                software_blending: true,
                ..quads_only(front_to_back)
            },
        );
        for (h, s) in hardware.image.pixels.iter().zip(&interlocked.image.pixels) {
            assert_relative_eq!(h.x, s.x, epsilon = 1e-5);
            assert_relative_eq!(h.y, s.y, epsilon = 1e-5);
            assert_relative_eq!(h.z, s.z, epsilon = 1e-5);
            assert_relative_eq!(h.w, s.w, epsilon = 1e-5);
        }
    }
}

#[test]
fn test_blend_directions_agree() {
    let store = random_cloud(1_000, 21);
    let camera = OrbitCamera::default().frame(64, 64);

    let f2b = render_reference(&store, &camera, &quads_only(true));
    let b2f = render_reference(&store, &camera, &quads_only(false));
    for (a, b) in f2b.image.pixels.iter().zip(&b2f.image.pixels) {
        assert_relative_eq!(a.x, b.x, epsilon = 1e-3);
        assert_relative_eq!(a.w, b.w, epsilon = 1e-3);
    }
}

#[test]
fn test_min_opacity_filters_quads() {
    let store = axis_line(&[1.0, 2.0, 3.0], 0.5);
    let camera = axis_camera(32, 32);
    let settings = RenderSettings {
        min_opacity: 0.6,
        ..quads_only(true)
    };
    let frame = render_reference(&store, &camera, &settings);
    assert_eq!(frame.report.visible_count, 0);
    assert!(frame.image.pixels.iter().all(|p| p.w == 0.0));
}

fn covariance_of(conic: glam::Vec3) -> glam::Vec3 {
    glam::Vec3::new(conic.z, -conic.y, conic.x) / (conic.x * conic.z - conic.y * conic.y)
}

#[test]
fn test_antialiasing_dilates_and_compensates() {
    let store = random_cloud(400, 17);
    let camera = OrbitCamera {
        theta: 0.7,
        phi: 0.4,
        ..Default::default()
    }
    .frame(160, 120);
    let plain = quads_only(true);
    let filtered = RenderSettings {
        antialiasing: true,
        ..plain.clone()
    };

    let mut checked = 0;
    for i in 0..store.len() {
        let project = |settings: &RenderSettings| {
            project_footprint(
                store.position(i),
                store.scale(i),
                store.rotation(i),
                store.opacities[i],
                &camera,
                settings,
            )
        };
        let (Some(off), Some(on)) = (project(&plain), project(&filtered)) else {
            continue;
        };

        let (cov_off, cov_on) = (covariance_of(off.conic), covariance_of(on.conic));
        // inverting twice loses precision in proportion to the footprint size
        let tol = 1e-5 * (cov_off.x + cov_off.z + 1.0);
        assert_relative_eq!(cov_on.x, cov_off.x + LOW_PASS_FILTER, epsilon = tol, max_relative = 1e-3);
        assert_relative_eq!(cov_on.y, cov_off.y, epsilon = tol, max_relative = 1e-3);
        assert_relative_eq!(cov_on.z, cov_off.z + LOW_PASS_FILTER, epsilon = tol, max_relative = 1e-3);

        let det_off = cov_off.x * cov_off.z - cov_off.y * cov_off.y;
        let det_on = cov_on.x * cov_on.z - cov_on.y * cov_on.y;
        assert_relative_eq!(on.opacity, off.opacity * (det_off / det_on).sqrt(), max_relative = 1e-3);
        assert!(on.opacity < off.opacity);
        assert_relative_eq!(off.opacity, store.opacities[i]);
        checked += 1;
    }
    assert!(checked > 100);
}

#[test]
fn test_antialiasing_widens_small_footprints() {
    // about one pixel wide at this depth
    let store = axis_line(&[10.0], 0.9);
    let camera = axis_camera(64, 64);
    let plain = render_reference(&store, &camera, &quads_only(true));
    let filtered = render_reference(
        &store,
        &camera,
        &RenderSettings {
            antialiasing: true,
            ..quads_only(true)
        },
    );

    let (a, b) = (plain.footprints[0], filtered.footprints[0]);
    assert!(b.aabb.x >= a.aabb.x && b.aabb.y >= a.aabb.y);
    assert!(b.opacity < a.opacity);
    assert!(covariance_of(b.conic).x > covariance_of(a.conic).x);
}
