//! Error taxonomy for the image pipeline.
//!
//! Pipeline code returns `Result<_, ImageError>` internally. Nothing in the
//! playback or fetch path hands an `ImageError` back to the caller: failures end
//! in a retry, a log line, the default image, or a silent skip.

/// Unified error for loading, fetching and decoding image sources.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ImageError {
    #[error("network error: {0}")]
    Network(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid source: {0}")]
    InvalidSource(String),

    #[error("file error: {0}")]
    FileSystem(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("resource limit: {0}")]
    ResourceLimit(String),
}

impl ImageError {
    /// Decode failures are the only class the retry controller reattempts.
    pub fn is_transient(&self) -> bool {
        matches!(self, ImageError::Decode(_))
    }
}

impl From<image::ImageError> for ImageError {
    fn from(err: image::ImageError) -> Self {
        ImageError::Decode(err.to_string())
    }
}

impl From<std::io::Error> for ImageError {
    fn from(err: std::io::Error) -> Self {
        ImageError::FileSystem(err.to_string())
    }
}
