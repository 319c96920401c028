use crate::error::{BusError, IndexError, StoreError};
use crate::models::{
    Document, DocumentIndex, DocumentStatus, DocumentType, Keyword, LifecycleEvent, Topic,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// The durable primary record store. Every call is an atomic
/// single-row transaction; `update_status` is the compare-and-set the
/// status ledger serializes all per-document transitions through.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn save(&self, document: &Document) -> Result<Document, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Document>, StoreError>;

    async fn find_by_status(&self, status: DocumentStatus) -> Result<Vec<Document>, StoreError>;

    async fn find_by_owner(&self, owner_id: Uuid) -> Result<Vec<Document>, StoreError>;

    async fn find_by_owner_and_status(
        &self,
        owner_id: Uuid,
        status: DocumentStatus,
    ) -> Result<Vec<Document>, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    /// Atomically move a document into `next` if its current status is
    /// one of `allowed_from`. On a mismatch the error carries the
    /// actual current status so callers can tell a lost race from a
    /// broken invariant.
    async fn update_status(
        &self,
        id: Uuid,
        allowed_from: &[DocumentStatus],
        next: DocumentStatus,
        error_message: Option<String>,
        processed_at: Option<DateTime<Utc>>,
    ) -> Result<Document, StatusWriteError>;

    async fn find_type_by_name(&self, name: &str) -> Result<Option<DocumentType>, StoreError>;

    /// Fails with `StoreError::Conflict` when the name is taken; the
    /// caller re-reads instead of checking first.
    async fn insert_type(&self, document_type: &DocumentType) -> Result<DocumentType, StoreError>;

    async fn find_keyword_by_name(&self, name: &str) -> Result<Option<Keyword>, StoreError>;

    async fn insert_keyword(&self, keyword: &Keyword) -> Result<Keyword, StoreError>;
}

/// Outcome of a failed status compare-and-set.
#[derive(Debug, thiserror::Error)]
pub enum StatusWriteError {
    #[error("record not found")]
    NotFound,

    #[error("document is {actual}, not in an admissible source state")]
    Contention { actual: DocumentStatus },

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Owner-scoped criteria the search engine accepts. Text terms are
/// OR-matched against title, description, and content; the type filter
/// is an exact match on the document-type name.
#[derive(Debug, Clone)]
pub struct SearchCriteria {
    pub owner_id: Uuid,
    pub terms: Vec<String>,
    pub document_type: Option<String>,
}

impl SearchCriteria {
    /// Tokenize a free-text query on whitespace.
    pub fn text(owner_id: Uuid, query: &str) -> Self {
        Self {
            owner_id,
            terms: query
                .split_whitespace()
                .map(|term| term.to_string())
                .collect(),
            document_type: None,
        }
    }

    pub fn document_type(owner_id: Uuid, type_name: impl Into<String>) -> Self {
        Self {
            owner_id,
            terms: Vec::new(),
            document_type: Some(type_name.into()),
        }
    }
}

/// The full-text search engine. Derived and disposable: no consistency
/// guarantee with the primary store.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn upsert(&self, entry: &DocumentIndex) -> Result<(), IndexError>;

    async fn delete(&self, id: Uuid) -> Result<(), IndexError>;

    async fn query(&self, criteria: &SearchCriteria) -> Result<Vec<Uuid>, IndexError>;
}

/// At-least-once message bus with manual acknowledgement.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Fire-and-forget; callers log delivery failures and move on.
    async fn publish(&self, topic: Topic, event: LifecycleEvent) -> Result<(), BusError>;

    async fn subscribe(&self, topic: Topic) -> Result<Box<dyn TopicStream>, BusError>;
}

/// A single consumer's view of one topic.
#[async_trait]
pub trait TopicStream: Send {
    /// Next delivery, or `None` once the topic is closed.
    async fn next(&mut self) -> Option<Delivery>;
}

/// One delivered message. Dropping a delivery without acknowledging it
/// counts as an ack for the in-process bus; durable brokers redeliver.
pub struct Delivery {
    pub event: LifecycleEvent,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(event: LifecycleEvent, acker: Box<dyn Acker>) -> Self {
        Self { event, acker }
    }

    pub fn ack(self) {
        self.acker.ack();
    }

    /// Negative-acknowledge: the message is redelivered after `delay`.
    pub fn nack(self, delay: Duration) {
        self.acker.nack(self.event, delay);
    }
}

pub trait Acker: Send {
    fn ack(self: Box<Self>);

    fn nack(self: Box<Self>, event: LifecycleEvent, delay: Duration);
}
