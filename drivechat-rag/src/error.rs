//! Error types for the `drivechat-rag` crate.

use thiserror::Error;

/// Errors that can occur in DriveChat operations.
///
/// Variants that describe a single unit of work (one file, one question) are
/// contained by the pipeline and turned into a skip or an empty result. The
/// others mark a missing precondition and propagate to the caller.
#[derive(Debug, Error)]
pub enum RagError {
    /// Credentials could not be obtained or refreshed.
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Required configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The file list could not be enumerated.
    #[error("Listing error: {0}")]
    ListingError(String),

    /// A file could not be exported or downloaded.
    #[error("Storage error (file {file_id}): {message}")]
    StorageError {
        /// The external identifier of the file.
        file_id: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The generative model call failed.
    #[error("Generation error ({provider}): {message}")]
    GenerationError {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error in the pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RagError {
    /// Whether this error aborts the surrounding operation instead of
    /// skipping a single unit of work.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RagError::AuthenticationError(_) | RagError::ConfigError(_) | RagError::ListingError(_)
        )
    }
}

/// A convenience result type for DriveChat operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_failures_are_fatal() {
        assert!(RagError::AuthenticationError("expired".into()).is_fatal());
        assert!(RagError::ConfigError("missing key".into()).is_fatal());
        assert!(RagError::ListingError("403".into()).is_fatal());
    }

    #[test]
    fn unit_of_work_failures_are_not_fatal() {
        let err = RagError::StorageError { file_id: "abc".into(), message: "404".into() };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "Storage error (file abc): 404");

        let err = RagError::EmbeddingError { provider: "Gemini".into(), message: "quota".into() };
        assert!(!err.is_fatal());
    }
}
