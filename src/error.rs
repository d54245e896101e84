//! Typed errors for every pipeline operation.
//!
//! Each variant maps to exactly one HTTP status via [`PipelineError::status_code`],
//! so the server never has to inspect messages to pick a response code.
//!
//! | Variant | Status |
//! |---------|--------|
//! | `Decode`, `UnsupportedFilename`, `InvalidMapping`, `InvalidRequest` | 400 |
//! | `ArtifactNotFound` | 404 |
//! | `Encode`, `Transform`, `Io` | 500 |

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// Bytes are not a readable GIF container (or hold zero frames)
    #[error("Cannot read GIF file: {0}")]
    Decode(String),
    /// Uploaded file name lacks a `.gif` suffix
    #[error("Only GIF files are supported, got '{0}'")]
    UnsupportedFilename(String),
    /// `rgb_map` is not a permutation of r/g/b
    #[error("Invalid RGB map '{0}': must be a permutation of 'rgb', e.g. 'gbr'")]
    InvalidMapping(String),
    /// Malformed request input (missing multipart field or query parameter)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// No stored artifact under that name
    #[error("File not found: {0}")]
    ArtifactNotFound(String),
    #[error("Cannot encode GIF: {0}")]
    Encode(String),
    /// Pixel or metadata work on an already stored artifact failed
    #[error("Processing failed: {0}")]
    Transform(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::Decode(_)
            | PipelineError::UnsupportedFilename(_)
            | PipelineError::InvalidMapping(_)
            | PipelineError::InvalidRequest(_) => 400,
            PipelineError::ArtifactNotFound(_) => 404,
            PipelineError::Encode(_) | PipelineError::Transform(_) | PipelineError::Io(_) => 500,
        }
    }
}

impl From<gif::DecodingError> for PipelineError {
    fn from(e: gif::DecodingError) -> Self {
        PipelineError::Decode(e.to_string())
    }
}

impl From<gif::EncodingError> for PipelineError {
    fn from(e: gif::EncodingError) -> Self {
        PipelineError::Encode(e.to_string())
    }
}
