//! Error types for scene ingest and configuration

use thiserror::Error;

/// Result type for raster-side operations
pub type RasterResult<T> = Result<T, RasterError>;

/// Errors that can occur before a frame is ever rendered
#[derive(Error, Debug)]
pub enum RasterError {
    #[error("attribute `{attribute}` has {actual} values, expected {expected}")]
    AttributeLength {
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("gaussian {index} has a zero-length rotation quaternion")]
    DegenerateRotation { index: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
