use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Failed)
    }

    /// Admissible source states for a transition into `self`.
    ///
    /// Pending is only ever entered at creation; Failed accepts the
    /// fail-fast edge taken when dispatch itself cannot be scheduled.
    pub fn admissible_sources(self) -> &'static [DocumentStatus] {
        match self {
            DocumentStatus::Pending => &[],
            DocumentStatus::Processing => &[DocumentStatus::Pending],
            DocumentStatus::Completed => &[DocumentStatus::Processing],
            DocumentStatus::Failed => &[DocumentStatus::Pending, DocumentStatus::Processing],
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DocumentStatus::Pending => "PENDING",
            DocumentStatus::Processing => "PROCESSING",
            DocumentStatus::Completed => "COMPLETED",
            DocumentStatus::Failed => "FAILED",
        };
        formatter.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentType {
    pub id: Uuid,
    pub name: String,
}

impl DocumentType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Keyword {
    pub id: Uuid,
    pub name: String,
}

impl Keyword {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

/// The aggregate root of the pipeline. Created Pending by the ingestion
/// coordinator; mutated only through the status ledger and the
/// processing pipeline afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub content: String,
    pub content_type: String,
    pub file_size: u64,
    pub status: DocumentStatus,
    pub owner_id: Uuid,
    pub author: String,
    pub error_message: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub document_type: DocumentType,
    pub title: String,
    pub description: String,
    pub language: String,
    pub page_count: Option<u32>,
    pub keywords: Vec<Keyword>,
}

impl Document {
    pub fn keyword_names(&self) -> Vec<String> {
        self.keywords
            .iter()
            .map(|keyword| keyword.name.clone())
            .collect()
    }
}

/// Declared metadata accompanying an upload. An absent document type
/// resolves to "UNKNOWN".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub title: String,
    pub description: String,
    pub language: String,
    pub document_type: Option<String>,
    pub keywords: Vec<String>,
}

/// An already-validated principal, supplied by the authentication layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub display_name: String,
}

/// Denormalized search projection of a document. Rebuilt wholesale on
/// every (re)index; never partially patched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentIndex {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub file_name: String,
    pub content_type: String,
    pub file_size: u64,
    pub document_type: String,
    pub language: String,
    pub keywords: Vec<String>,
    pub content: String,
    pub owner_id: Uuid,
    pub uploaded_at: DateTime<Utc>,
}

impl DocumentIndex {
    pub fn from_document(document: &Document) -> Self {
        Self {
            id: document.id,
            title: document.title.clone(),
            description: document.description.clone(),
            file_name: document.file_name.clone(),
            content_type: document.content_type.clone(),
            file_size: document.file_size,
            document_type: document.document_type.name.clone(),
            language: document.language.clone(),
            keywords: document.keyword_names(),
            content: document.content.clone(),
            owner_id: document.owner_id,
            uploaded_at: document.uploaded_at,
        }
    }
}

/// Lightweight cache entry for a document. Strictly a performance
/// layer; its absence never means the document does not exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub file_name: String,
    pub document_type: String,
    pub language: String,
    pub keywords: Vec<String>,
    pub status: DocumentStatus,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub file_size: u64,
}

impl DocumentSummary {
    pub fn from_document(document: &Document) -> Self {
        Self {
            id: document.id,
            owner_id: document.owner_id,
            title: document.title.clone(),
            description: document.description.clone(),
            file_name: document.file_name.clone(),
            document_type: document.document_type.name.clone(),
            language: document.language.clone(),
            keywords: document.keyword_names(),
            status: document.status,
            uploaded_at: document.uploaded_at,
            processed_at: document.processed_at,
            file_size: document.file_size,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventAction {
    Ingest,
    Process,
    UpdateStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Topic {
    Ingestion,
    Processing,
    Status,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Ingestion => "document.ingestion",
            Topic::Processing => "document.processing",
            Topic::Status => "document.status",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Message describing a document lifecycle change, published for
/// downstream observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub document_id: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub owner_id: Uuid,
    pub status: DocumentStatus,
    pub timestamp: DateTime<Utc>,
    pub error_message: Option<String>,
    pub action: EventAction,
}

impl LifecycleEvent {
    pub fn for_document(document: &Document, action: EventAction) -> Self {
        Self {
            document_id: document.id,
            file_name: document.file_name.clone(),
            file_path: document.file_path.clone(),
            owner_id: document.owner_id,
            status: document.status,
            timestamp: Utc::now(),
            error_message: document.error_message.clone(),
            action,
        }
    }
}
