use thiserror::Error;

/// Failures raised while resolving or rasterizing a field.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("unknown algorithm '{0}'")]
    UnknownAlgorithm(String),
    #[error("unknown renderer '{0}'")]
    UnknownRenderer(String),
    #[error("invalid parameters for '{algorithm}': {reason}")]
    InvalidParameters { algorithm: String, reason: String },
    #[error("field produced a non-finite value at ({x}, {y}) channel {channel}")]
    NonFinite { x: u32, y: u32, channel: usize },
    #[error("pixel buffer holds {actual} bytes but {expected} are required")]
    BufferSize { expected: usize, actual: usize },
    #[error("invalid dimension '{0}'; expected WxH, e.g. 800x160")]
    InvalidDimension(String),
    #[error("{width}x{height} exceeds the {limit} pixel limit")]
    TooLarge { width: u32, height: u32, limit: usize },
}

impl FieldError {
    pub(crate) fn invalid(algorithm: &str, reason: impl Into<String>) -> Self {
        FieldError::InvalidParameters {
            algorithm: algorithm.to_string(),
            reason: reason.into(),
        }
    }
}
