//! Hardware-rasterized 3D Gaussian Splatting
//!
//! This crate provides the GPU-agnostic half of the renderer: the scene data
//! model, the projection mathematics, and the WGSL kernels executed by
//! `hwsplat-render`. Every kernel has a CPU mirror here so the pipeline can be
//! checked without a GPU.
//!
//! # Architecture
//!
//! A frame runs these stages in strict order:
//! 1. **Visibility**: depth/opacity test, atomic compaction into an unordered list
//! 2. **Readback**: the visible count is read back to the host (the only sync point)
//! 3. **Sort**: bitonic sort of the visible list by view-space depth
//! 4. **Footprint**: 3D covariance to 2D conic and screen-space extents
//! 5. **Color**: spherical-harmonic color per visible gaussian
//! 6. **Composite**: one quad per gaussian, blended in sorted order

pub mod camera;
pub mod composite;
pub mod covariance;
pub mod error;
pub mod frame;
pub mod gaussian;
pub mod gpu_types;
pub mod reference;
pub mod settings;
pub mod sh;
pub mod sort;
pub mod synthetic;
pub mod visibility;

// Kernels share the declarations in `common.wgsl`.
pub mod shaders {
    pub const VISIBILITY: &str = concat!(
        include_str!("shaders/common.wgsl"),
        include_str!("shaders/visibility.wgsl")
    );
    pub const SORT: &str = concat!(
        include_str!("shaders/common.wgsl"),
        include_str!("shaders/sort.wgsl")
    );
    pub const FOOTPRINT: &str = concat!(
        include_str!("shaders/common.wgsl"),
        include_str!("shaders/footprint.wgsl")
    );
    pub const COLORS: &str = concat!(
        include_str!("shaders/common.wgsl"),
        include_str!("shaders/colors.wgsl")
    );
    pub const QUAD: &str = concat!(
        include_str!("shaders/common.wgsl"),
        include_str!("shaders/quad.wgsl")
    );
    pub const QUAD_INTERLOCK: &str = concat!(
        include_str!("shaders/common.wgsl"),
        include_str!("shaders/quad_interlock.wgsl")
    );
    pub const POINT: &str = concat!(
        include_str!("shaders/common.wgsl"),
        include_str!("shaders/point.wgsl")
    );
}

pub use camera::{FrameCamera, OrbitCamera, UPRIGHT_FLIP};
pub use composite::{BlendEquation, CompositeStrategy, Image, OrderedAccumulate, QuadPrimitive};
pub use covariance::*;
pub use error::{RasterError, RasterResult};
pub use frame::{FrameReport, FrameStage, SelectedFootprint};
pub use gaussian::{Gaussian, GaussianStore, SceneIngest, SH_COEFFS_PER_CHANNEL, SH_COEFFS_PER_GAUSSIAN};
pub use gpu_types::*;
pub use reference::{render_reference, ReferenceFrame};
pub use settings::RenderSettings;
pub use sort::{depth_to_key, key_to_depth, sort_visible, DepthOrder, SortedSet};
pub use visibility::{filter_visible, VisibleSet};
