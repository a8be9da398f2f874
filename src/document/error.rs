//! Document error types
//!
//! Unified error handling for all book formats and the reader cache.

use thiserror::Error;

/// Unified document error type
#[derive(Debug, Error)]
pub enum DocumentError {
    /// No converter registered for the format code
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Input bytes are not a well-formed book
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// Book not known to the book source
    #[error("Book not found: {0}")]
    BookNotFound(String),

    /// Chapter id not present in the parsed book
    #[error("Chapter not found: {0}")]
    ChapterNotFound(String),

    /// Image id not present in the parsed book
    #[error("Image not found: {0}")]
    ImageNotFound(String),

    /// Embedded resource payload could not be decoded
    #[error("Failed to decode resource {id}: {reason}")]
    ResourceDecodeFailure { id: String, reason: String },

    /// Cache storage error
    #[error("Cache error: {0}")]
    CacheError(String),

    /// IO error (std::io::Error)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Timeout error
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Blocking task failed to complete
    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl DocumentError {
    /// Whether the error means "the requested thing does not exist"
    ///
    /// Resource decode failures count as missing for callers.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::BookNotFound(_)
                | Self::ChapterNotFound(_)
                | Self::ImageNotFound(_)
                | Self::ResourceDecodeFailure { .. }
        )
    }
}

/// Result type alias for document operations
pub type Result<T> = std::result::Result<T, DocumentError>;

/// Alias for Result
pub type DocumentResult<T> = Result<T>;

impl From<zip::result::ZipError> for DocumentError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::FileNotFound => {
                DocumentError::BookNotFound("file not found in archive".to_string())
            }
            other => DocumentError::IoError(std::io::Error::other(other.to_string())),
        }
    }
}
