use thiserror::Error;

use crate::document::DocumentStatus;

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Document not found: {document_id}")]
    DocumentNotFound { document_id: String },

    #[error("Document not ready: {document_id} is {status}")]
    DocumentNotReady {
        document_id: String,
        status: DocumentStatus,
    },

    #[error(
        "Embedding space mismatch: collection was indexed with '{indexed}' but the query embedder is '{current}'"
    )]
    EmbeddingSpaceMismatch { indexed: String, current: String },

    #[error("Invalid document: {message}")]
    InvalidDocument { message: String },

    #[error("Content extraction failed")]
    Extraction(#[from] ExtractionError),

    #[error("{0}")]
    Capability(#[from] CapabilityError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Content extraction errors (fatal for the whole document)
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Document is not valid UTF-8 text")]
    InvalidEncoding(#[source] std::str::Utf8Error),

    #[error("Unsupported file format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Invalid embedded image data")]
    InvalidImageData(#[source] base64::DecodeError),

    #[error("Extraction failed: {message}")]
    Failed { message: String },
}

/// Errors from external capability providers (summarization, embedding,
/// answer generation)
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("Connection failed to capability endpoint {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    #[error("Generation failed (status {status}): {message}")]
    Generation { status: u16, message: String },

    #[error("Invalid response from capability endpoint")]
    InvalidResponse {
        #[source]
        source: serde_json::Error,
    },

    #[error("Capability unavailable: {message}")]
    Unavailable { message: String },
}

impl CapabilityError {
    /// Whether a retry has any chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            CapabilityError::Connection { .. } | CapabilityError::Unavailable { .. } => true,
            CapabilityError::Generation { status, .. } => *status >= 500 || *status == 429,
            CapabilityError::ModelNotFound { .. } | CapabilityError::InvalidResponse { .. } => {
                false
            }
        }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
