//! Error types for complaint-lens
//!
//! One error enum covers every stage of the enrichment pipeline: extraction,
//! embedding, vector search, storage and the external service boundary.

use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum LensError {
    /// Structured extraction errors
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Embedding generation errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector search errors
    #[error("Search error: {0}")]
    Search(String),

    /// Database/storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller input
    #[error("Validation error: {0}")]
    Validation(String),

    /// External service (generation, embedding) errors
    #[error("Service error: {0}")]
    Service(String),

    /// A stage exhausted its attempts; nothing was written
    #[error("Stage '{stage}' failed: {reason}")]
    StageFailed { stage: String, reason: String },

    /// A stage attempt exceeded its time budget
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic errors
    #[error("Generic error: {0}")]
    Generic(String),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, LensError>;

impl From<anyhow::Error> for LensError {
    fn from(err: anyhow::Error) -> Self {
        LensError::Generic(err.to_string())
    }
}

impl From<reqwest::Error> for LensError {
    fn from(err: reqwest::Error) -> Self {
        LensError::Service(err.to_string())
    }
}

impl From<async_openai::error::OpenAIError> for LensError {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        LensError::Service(err.to_string())
    }
}

impl From<image::ImageError> for LensError {
    fn from(err: image::ImageError) -> Self {
        LensError::Generic(format!("image: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = LensError::Extraction("bad output".to_string());
        assert_eq!(error.to_string(), "Extraction error: bad output");

        let error = LensError::StageFailed {
            stage: "embedding".to_string(),
            reason: "service unavailable".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Stage 'embedding' failed: service unavailable"
        );
    }

    #[test]
    fn test_error_chain() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let lens_error = LensError::from(io_error);

        match lens_error {
            LensError::Io(_) => (),
            _ => panic!("Expected Io error"),
        }
    }
}
