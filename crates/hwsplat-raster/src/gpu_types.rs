//! GPU-compatible data types shared with the WGSL kernels

use bytemuck::{Pod, Zeroable};

use crate::camera::FrameCamera;
use crate::settings::RenderSettings;

/// Invocations per workgroup for the per-gaussian kernels
pub const WORKGROUP_SIZE: u32 = 128;

/// Invocations per workgroup for the sort kernels
pub const SORT_WORKGROUP_SIZE: u32 = 256;

/// Lanes that cooperate on one gaussian's color
pub const SH_LANES: u32 = 16;

/// Gaussians colored per workgroup (`WORKGROUP_SIZE / SH_LANES`)
pub const SH_GAUSSIANS_PER_WORKGROUP: u32 = WORKGROUP_SIZE / SH_LANES;

/// Interlocked compositor tile edge in pixels (16x16 = 256 invocations)
pub const COMPOSITE_TILE_SIZE: u32 = 16;

/// Largest workgroup count per dispatch dimension
pub const MAX_DISPATCH_DIM: u32 = 65_535;

/// Per-frame uniforms read by every kernel
///
/// Matches `struct Frame` in `shaders/common.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view: [[f32; 4]; 4],       // offset 0
    pub proj: [[f32; 4]; 4],       // offset 64
    /// xyz, w unused
    pub camera_pos: [f32; 4],      // offset 128
    pub num_gaussians: u32,        // offset 144
    pub near: f32,
    pub far: f32,
    pub scale_modifier: f32,
    /// -1 when nothing is selected
    pub selected: i32,             // offset 160
    pub min_opacity: f32,
    pub width: f32,
    pub height: f32,
    pub focal_x: f32,              // offset 176
    pub focal_y: f32,
    pub antialiasing: u32,
    pub front_to_back: u32,
    // Total: 192 bytes
}

impl FrameUniforms {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(camera: &FrameCamera, settings: &RenderSettings, num_gaussians: u32) -> Self {
        Self {
            view: camera.view.to_cols_array_2d(),
            proj: camera.proj.to_cols_array_2d(),
            camera_pos: camera.position.extend(1.0).to_array(),
            num_gaussians,
            near: camera.near,
            far: camera.far,
            scale_modifier: settings.scale_modifier,
            selected: settings
                .selected_in(num_gaussians as usize)
                .map_or(-1, |s| s as i32),
            min_opacity: settings.min_opacity,
            width: camera.width as f32,
            height: camera.height as f32,
            focal_x: camera.focal_x(),
            focal_y: camera.focal_y(),
            antialiasing: settings.antialiasing as u32,
            front_to_back: settings.front_to_back as u32,
        }
    }
}

/// One bitonic compare-exchange step
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct SortParams {
    /// Visible count (real elements)
    pub count: u32,
    /// Power-of-two padded length
    pub padded: u32,
    pub k: u32,
    pub j: u32,
}

impl SortParams {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Visible-slot count for the per-slot kernels, written after the readback
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct SlotParams {
    pub count: u32,
    /// Power-of-two padded length of the sort arrays
    pub padded: u32,
    pub _pad: [u32; 2],
}

impl SlotParams {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(count: u32) -> Self {
        Self {
            count,
            padded: crate::sort::next_pow2(count),
            _pad: [0; 2],
        }
    }
}

/// Parameters of the final blit to the display target
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct BlitParams {
    /// Nonzero when the image alpha holds transmittance
    pub front_to_back: u32,
    pub _pad: [u32; 3],
}

impl BlitParams {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Workgroup grid for `invocations` threads, split over x and y so neither
/// dimension exceeds [`MAX_DISPATCH_DIM`]
///
/// Kernels rebuild the linear id as `gid.x + gid.y * num_workgroups.x * size`.
pub fn dispatch_size(invocations: u32, workgroup_size: u32) -> (u32, u32) {
    let groups = invocations.div_ceil(workgroup_size).max(1);
    if groups <= MAX_DISPATCH_DIM {
        (groups, 1)
    } else {
        let y = groups.div_ceil(MAX_DISPATCH_DIM);
        (groups.div_ceil(y), y)
    }
}
