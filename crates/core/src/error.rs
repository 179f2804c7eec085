//! Error types for the tilescale pipeline.

use thiserror::Error;

/// Main error type for the tilescale-core library.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid construction-time parameter.
    #[error("invalid configuration for {name}: {reason}")]
    Config { name: &'static str, reason: String },

    /// The recomputed output grid does not line up with the inference results.
    #[error("output grid expects {expected} tiles but inference produced {actual}")]
    GridMismatch { expected: usize, actual: usize },

    /// A result tile does not fit its destination rectangle.
    #[error("tile shape mismatch: expected {expected}, got {actual}")]
    TileShape { expected: String, actual: String },

    /// The inference engine failed. Never retried by the pipeline.
    #[error("tile inference failed")]
    Inference(#[source] anyhow::Error),

    /// An image buffer is inconsistent with its stated dimensions.
    #[error("image buffer for {width}x{height} should hold {expected} bytes, got {actual}")]
    ImageShape {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Result type alias for tilescale-core operations.
pub type Result<T> = std::result::Result<T, Error>;
