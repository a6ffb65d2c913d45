//! wgpu backend for hardware-rasterized 3D Gaussian splatting
//!
//! Runs the kernels from `hwsplat-raster` on the GPU, either into a window
//! ([`run`]) or offscreen ([`HeadlessRenderer`]).

pub mod bindings;
pub mod blit;
pub mod capture;
pub mod composite;
pub mod context;
pub mod error;
pub mod headless;
pub mod orchestrator;
pub mod passes;
pub mod readback;
pub mod renderer;
pub mod window;

pub use capture::CapturedFrame;
pub use context::RenderContext;
pub use error::{RenderError, RenderResult};
pub use headless::{HeadlessConfig, HeadlessRenderer};
pub use orchestrator::FrameOrchestrator;
pub use renderer::Renderer;
pub use window::run;
