//! Error types for the GPU backend

use thiserror::Error;

/// Result type for GPU operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors that can occur while setting up or driving the GPU
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("No GPU adapter found")]
    NoAdapter,

    #[error("Device request failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("Surface creation failed: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    #[error("Surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("Surface reports no supported formats")]
    NoSurfaceFormat,

    #[error("Buffer map failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("Readback channel closed before the map callback fired")]
    ReadbackChannel,

    #[error(transparent)]
    Raster(#[from] hwsplat_raster::RasterError),
}

impl From<std::sync::mpsc::RecvError> for RenderError {
    fn from(_: std::sync::mpsc::RecvError) -> Self {
        RenderError::ReadbackChannel
    }
}
