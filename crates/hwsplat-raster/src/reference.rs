//! CPU reference implementation of the whole frame
//!
//! Runs the same stages as the GPU backend, in the same order and with the
//! same arithmetic, so GPU output can be checked against it and the CLI can
//! render without an adapter.

use glam::{Vec2, Vec4};
use rayon::prelude::*;

use crate::camera::FrameCamera;
use crate::composite::{BlendEquation, CompositeStrategy, Image, QuadPrimitive};
use crate::covariance::{project_footprint, Footprint};
use crate::frame::{FrameReport, FrameStage};
use crate::gaussian::{Gaussian, GaussianStore};
use crate::settings::RenderSettings;
use crate::sh::predict_color;
use crate::sort::{sort_visible, SortedSet};
use crate::visibility::{filter_visible, VisibleSet};

/// Everything one reference frame produced
#[derive(Clone, Debug)]
pub struct ReferenceFrame {
    pub visible: VisibleSet,
    pub sorted: SortedSet,
    /// Per sorted slot
    pub footprints: Vec<Footprint>,
    /// Per sorted slot, straight RGB + opacity
    pub colors: Vec<Vec4>,
    /// Premultiplied RGB + coverage
    pub image: Image,
    pub report: FrameReport,
    pub selected: Option<(Gaussian, Option<Footprint>)>,
}

/// Render one frame on the CPU
pub fn render_reference(
    store: &GaussianStore,
    camera: &FrameCamera,
    settings: &RenderSettings,
) -> ReferenceFrame {
    let mut report = FrameReport::new();
    let equation = BlendEquation::new(settings.depth_order());
    let mut accum = Image::new(camera.width, camera.height, equation.clear_color());

    let visible = report.time(FrameStage::Visibility, || {
        filter_visible(store, camera, settings.min_opacity)
    });
    report.visible_count = report.time(FrameStage::ReadbackVisibleCount, || visible.len() as u32);

    let mut sorted = SortedSet {
        order: settings.depth_order(),
        ..Default::default()
    };
    let mut footprints = Vec::new();
    let mut colors = Vec::new();

    if settings.render_quads && !visible.is_empty() {
        sorted = report.time(FrameStage::Sort, || sort_visible(&visible, settings.depth_order()));

        footprints = report.time(FrameStage::Footprint, || {
            sorted
                .indices
                .par_iter()
                .map(|&i| {
                    let i = i as usize;
                    project_footprint(
                        store.position(i),
                        store.scale(i),
                        store.rotation(i),
                        store.opacities[i],
                        camera,
                        settings,
                    )
                    .unwrap_or_default()
                })
                .collect()
        });

        colors = report.time(FrameStage::Color, || {
            sorted
                .indices
                .par_iter()
                .map(|&i| predict_color(store, i as usize, camera.position))
                .collect()
        });

        report.time(FrameStage::Composite, || {
            let primitives: Vec<QuadPrimitive> = footprints
                .iter()
                .zip(&colors)
                .map(|(fp, color)| QuadPrimitive {
                    center: fp.center,
                    half_extent: fp.aabb,
                    conic: fp.conic,
                    opacity: fp.opacity,
                    color: color.truncate(),
                })
                .collect();
            CompositeStrategy::from_software_blending(settings.software_blending)
                .accumulator()
                .accumulate(&mut accum, &primitives, equation, settings.min_opacity);
        });
    }

    if settings.render_points && !store.is_empty() {
        report.time(FrameStage::Points, || {
            draw_points(&mut accum, store, camera, equation)
        });
    }

    let image = Image {
        pixels: accum.pixels.iter().map(|&p| equation.resolve(p)).collect(),
        ..accum
    };

    let selected = settings.selected_in(store.len()).and_then(|i| {
        let g = store.get(i)?;
        let fp = project_footprint(g.position, g.scale, g.rotation, g.opacity, camera, settings);
        tracing::info!("Selected gaussian {}: {:?} -> {:?}", i, g.position, fp);
        Some((g, fp))
    });

    report.finish();

    ReferenceFrame {
        visible,
        sorted,
        footprints,
        colors,
        image,
        report,
        selected,
    }
}

/// One opaque point per gaussian, nearest wins
///
/// Writes accumulation-space values so the later resolve reports full
/// coverage for the point pixel.
fn draw_points(accum: &mut Image, store: &GaussianStore, camera: &FrameCamera, equation: BlendEquation) {
    let (width, height) = (camera.width as usize, camera.height as usize);
    let mut depth = vec![1.0f32; width * height];
    let view_proj = camera.proj * camera.view;

    for i in 0..store.len() {
        let clip = view_proj * store.position(i).extend(1.0);
        if clip.w <= 0.0 {
            continue;
        }
        let ndc = clip.truncate() / clip.w;
        if ndc.x.abs() > 1.0 || ndc.y.abs() > 1.0 || !(0.0..=1.0).contains(&ndc.z) {
            continue;
        }
        let px = Vec2::new(
            (ndc.x * 0.5 + 0.5) * camera.width as f32,
            (1.0 - (ndc.y * 0.5 + 0.5)) * camera.height as f32,
        )
        .floor();
        let (x, y) = (px.x as usize, px.y as usize);
        if x >= width || y >= height {
            continue;
        }
        let slot = y * width + x;
        if ndc.z < depth[slot] {
            depth[slot] = ndc.z;
            let rgb = predict_color(store, i, camera.position).truncate();
            accum.pixels[slot] = equation.opaque(rgb);
        }
    }
}
