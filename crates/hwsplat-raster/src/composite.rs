//! Order-dependent alpha compositing of screen-space quads
//!
//! Two strategies produce the same image:
//!
//! - [`SequentialBlender`] walks primitives in submission order and blends
//!   every covered pixel, which is what fixed-function blending does.
//! - [`PixelOwnedAccumulator`] gives each pixel to exactly one worker, which
//!   walks the primitive list in order. This is the ordered critical section
//!   the GPU compute compositor implements.

use glam::{Vec2, Vec3, Vec4};
use rayon::prelude::*;

use crate::gpu_types::COMPOSITE_TILE_SIZE;
use crate::sort::DepthOrder;

/// RGBA float image, row-major, origin top-left
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Vec4>,
}

impl Image {
    pub fn new(width: u32, height: u32, clear: Vec4) -> Self {
        Self {
            width,
            height,
            pixels: vec![clear; width as usize * height as usize],
        }
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Vec4 {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Quantize to 8-bit RGBA, clamping to [0, 1]
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|p| p.clamp(Vec4::ZERO, Vec4::ONE).to_array())
            .map(|c| (c * 255.0 + 0.5) as u8)
            .collect()
    }
}

/// Fixed-function blend state for one depth order
///
/// Sources are premultiplied `(rgb * alpha, alpha)`.
///
/// Front-to-back: color = src * dst.a + dst, alpha = dst.a * (1 - src.a),
/// cleared to (0, 0, 0, 1) so alpha carries the remaining transmittance.
/// Back-to-front: the usual "over", cleared to transparent black.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlendEquation {
    pub order: DepthOrder,
}

impl BlendEquation {
    pub fn new(order: DepthOrder) -> Self {
        Self { order }
    }

    pub fn clear_color(&self) -> Vec4 {
        match self.order {
            DepthOrder::FrontToBack => Vec4::new(0.0, 0.0, 0.0, 1.0),
            DepthOrder::BackToFront => Vec4::ZERO,
        }
    }

    #[inline]
    pub fn apply(&self, dst: Vec4, src: Vec4) -> Vec4 {
        match self.order {
            DepthOrder::FrontToBack => {
                let rgb = src.truncate() * dst.w + dst.truncate();
                rgb.extend(dst.w * (1.0 - src.w))
            }
            DepthOrder::BackToFront => src + dst * (1.0 - src.w),
        }
    }

    /// Accumulation-space value of a fully opaque straight color
    #[inline]
    pub fn opaque(&self, rgb: Vec3) -> Vec4 {
        match self.order {
            // alpha holds transmittance
            DepthOrder::FrontToBack => rgb.extend(0.0),
            DepthOrder::BackToFront => rgb.extend(1.0),
        }
    }

    /// Convert an accumulated pixel to output (premultiplied rgb, coverage)
    #[inline]
    pub fn resolve(&self, pixel: Vec4) -> Vec4 {
        match self.order {
            DepthOrder::FrontToBack => pixel.truncate().extend(1.0 - pixel.w),
            DepthOrder::BackToFront => pixel,
        }
    }
}

/// One projected gaussian ready for rasterization
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadPrimitive {
    pub center: Vec2,
    pub half_extent: Vec2,
    pub conic: Vec3,
    pub opacity: f32,
    pub color: Vec3,
}

impl QuadPrimitive {
    /// Pixel rectangle `[x0, x1) x [y0, y1)` whose centers fall inside the quad
    pub fn pixel_bounds(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let lo = (self.center - self.half_extent - Vec2::splat(0.5)).ceil().max(Vec2::ZERO);
        let hi = (self.center + self.half_extent - Vec2::splat(0.5)).floor() + Vec2::ONE;
        let hi = hi.min(Vec2::new(width as f32, height as f32));
        let (x0, y0) = (lo.x as u32, lo.y as u32);
        (x0, hi.x.max(lo.x) as u32, y0, hi.y.max(lo.y) as u32)
    }

    /// Whether the quad rectangle touches the box `[min, max]`
    #[inline]
    pub fn overlaps(&self, min: Vec2, max: Vec2) -> bool {
        let lo = self.center - self.half_extent;
        let hi = self.center + self.half_extent;
        lo.x <= max.x && lo.y <= max.y && hi.x >= min.x && hi.y >= min.y
    }

    #[inline]
    pub fn covers(&self, pixel: Vec2) -> bool {
        let d = (pixel - self.center).abs();
        d.x <= self.half_extent.x && d.y <= self.half_extent.y
    }

    /// Gaussian density at `pixel` times the stored opacity
    #[inline]
    pub fn alpha_at(&self, pixel: Vec2) -> f32 {
        let d = pixel - self.center;
        let power = -0.5 * (self.conic.x * d.x * d.x + 2.0 * self.conic.y * d.x * d.y + self.conic.z * d.y * d.y);
        self.opacity * power.exp()
    }

    /// Premultiplied fragment at a pixel center, `None` if discarded
    #[inline]
    pub fn shade(&self, pixel: Vec2, min_opacity: f32) -> Option<Vec4> {
        let alpha = self.alpha_at(pixel);
        if alpha < min_opacity {
            return None;
        }
        Some((self.color * alpha).extend(alpha))
    }
}

#[inline]
fn pixel_center(x: u32, y: u32) -> Vec2 {
    Vec2::new(x as f32 + 0.5, y as f32 + 0.5)
}

/// Blend an ordered primitive list into an image
pub trait OrderedAccumulate {
    fn accumulate(
        &self,
        image: &mut Image,
        primitives: &[QuadPrimitive],
        equation: BlendEquation,
        min_opacity: f32,
    );
}

/// Primitive-major blending, the fixed-function ordering guarantee
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialBlender;

impl OrderedAccumulate for SequentialBlender {
    fn accumulate(
        &self,
        image: &mut Image,
        primitives: &[QuadPrimitive],
        equation: BlendEquation,
        min_opacity: f32,
    ) {
        let width = image.width;
        for prim in primitives {
            let (x0, x1, y0, y1) = prim.pixel_bounds(image.width, image.height);
            for y in y0..y1 {
                for x in x0..x1 {
                    if let Some(src) = prim.shade(pixel_center(x, y), min_opacity) {
                        let dst = &mut image.pixels[(y * width + x) as usize];
                        *dst = equation.apply(*dst, src);
                    }
                }
            }
        }
    }
}

/// Pixel-major blending: each pixel is owned by one worker for the whole list
#[derive(Clone, Copy, Debug, Default)]
pub struct PixelOwnedAccumulator;

impl OrderedAccumulate for PixelOwnedAccumulator {
    /// Works in square tiles; primitives whose rectangle misses a tile are
    /// dropped for that tile before the per-pixel walk, keeping their order.
    fn accumulate(
        &self,
        image: &mut Image,
        primitives: &[QuadPrimitive],
        equation: BlendEquation,
        min_opacity: f32,
    ) {
        let width = image.width as usize;
        if width == 0 {
            return;
        }
        let tile = COMPOSITE_TILE_SIZE as usize;

        image
            .pixels
            .par_chunks_mut(width * tile)
            .enumerate()
            .for_each(|(tile_y, rows)| {
                for tile_x in 0..width.div_ceil(tile) {
                    let tile_min = Vec2::new((tile_x * tile) as f32, (tile_y * tile) as f32);
                    let tile_max = tile_min + Vec2::splat(tile as f32);
                    let live: Vec<&QuadPrimitive> = primitives
                        .iter()
                        .filter(|p| p.overlaps(tile_min, tile_max))
                        .collect();
                    if live.is_empty() {
                        continue;
                    }

                    let columns = tile_x * tile..((tile_x + 1) * tile).min(width);
                    for (dy, row) in rows.chunks_mut(width).enumerate() {
                        let y = (tile_y * tile + dy) as u32;
                        for x in columns.clone() {
                            let p = pixel_center(x as u32, y);
                            let dst = &mut row[x];
                            for prim in &live {
                                if !prim.covers(p) {
                                    continue;
                                }
                                if let Some(src) = prim.shade(p, min_opacity) {
                                    *dst = equation.apply(*dst, src);
                                }
                            }
                        }
                    }
                }
            });
    }
}

/// How ordered blending is realized
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompositeStrategy {
    /// Fixed-function blend state, primitives submitted in sorted order
    #[default]
    Hardware,
    /// Per-pixel ordered read-modify-write in a compute pass
    Interlocked,
}

impl CompositeStrategy {
    pub fn from_software_blending(enabled: bool) -> Self {
        if enabled {
            CompositeStrategy::Interlocked
        } else {
            CompositeStrategy::Hardware
        }
    }

    pub fn accumulator(self) -> &'static dyn OrderedAccumulate {
        match self {
            CompositeStrategy::Hardware => &SequentialBlender,
            CompositeStrategy::Interlocked => &PixelOwnedAccumulator,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompositeStrategy::Hardware => "hardware",
            CompositeStrategy::Interlocked => "interlocked",
        }
    }
}
