use crate::models::DocumentStatus;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("docx parse error: {0}")]
    DocxParse(String),

    #[error("legacy doc parse error: {0}")]
    DocParse(String),

    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),
}

impl ExtractError {
    /// An unsupported declared format is permanent for the document;
    /// everything else may be a corrupt file or a transient read fault.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ExtractError::UnsupportedFormat(_))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("topic {0} already has a consumer")]
    AlreadySubscribed(String),

    #[error("publish failed: {0}")]
    Publish(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("request is not authenticated")]
    Unauthenticated,

    #[error("document not found: {0}")]
    DocumentNotFound(Uuid),

    #[error("access denied to document: {0}")]
    AccessDenied(Uuid),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: DocumentStatus,
        to: DocumentStatus,
    },

    #[error("a failed document requires an error message")]
    MissingErrorMessage,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
