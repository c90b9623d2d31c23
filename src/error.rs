//! Error types for volchunk operations

use thiserror::Error;

/// Main error type for encode/decode operations
#[derive(Error, Debug)]
pub enum VolchunkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    #[error("Corrupt block: {0}")]
    CorruptBlock(String),

    #[error("Missing metadata: {0}")]
    MissingMetadata(String),

    #[error("Unsupported container variant: {0}")]
    UnsupportedContainerVariant(String),

    #[error("Compression backend error: {0}")]
    CompressionBackend(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Specialized Result type for volchunk operations
pub type Result<T> = std::result::Result<T, VolchunkError>;

impl From<bincode::Error> for VolchunkError {
    fn from(err: bincode::Error) -> Self {
        VolchunkError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for VolchunkError {
    fn from(err: serde_json::Error) -> Self {
        VolchunkError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for VolchunkError {
    fn from(err: ndarray::ShapeError) -> Self {
        VolchunkError::InvalidShape(err.to_string())
    }
}

impl VolchunkError {
    /// Whether retrying the operation that produced this error may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            VolchunkError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}
