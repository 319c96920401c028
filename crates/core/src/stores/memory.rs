use crate::error::StoreError;
use crate::models::{Document, DocumentStatus, DocumentType, Keyword};
use crate::traits::{DocumentStore, StatusWriteError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process primary store. Single-row atomicity falls out of holding
/// the write lock for the whole mutation; the unique name constraint on
/// types and keywords is enforced the way a relational store would,
/// surfacing `Conflict` for the caller to retry on.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<Uuid, Document>>,
    types_by_name: RwLock<HashMap<String, DocumentType>>,
    keywords_by_name: RwLock<HashMap<String, Keyword>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn save(&self, document: &Document) -> Result<Document, StoreError> {
        let mut documents = self.documents.write().await;
        documents.insert(document.id, document.clone());
        Ok(document.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        Ok(self.documents.read().await.get(&id).cloned())
    }

    async fn find_by_status(&self, status: DocumentStatus) -> Result<Vec<Document>, StoreError> {
        let documents = self.documents.read().await;
        let mut matching: Vec<Document> = documents
            .values()
            .filter(|document| document.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|document| document.uploaded_at);
        Ok(matching)
    }

    async fn find_by_owner(&self, owner_id: Uuid) -> Result<Vec<Document>, StoreError> {
        let documents = self.documents.read().await;
        let mut matching: Vec<Document> = documents
            .values()
            .filter(|document| document.owner_id == owner_id)
            .cloned()
            .collect();
        matching.sort_by_key(|document| document.uploaded_at);
        Ok(matching)
    }

    async fn find_by_owner_and_status(
        &self,
        owner_id: Uuid,
        status: DocumentStatus,
    ) -> Result<Vec<Document>, StoreError> {
        let documents = self.documents.read().await;
        let mut matching: Vec<Document> = documents
            .values()
            .filter(|document| document.owner_id == owner_id && document.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|document| document.uploaded_at);
        Ok(matching)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        documents.remove(&id).ok_or(StoreError::NotFound)?;
        Ok(())
    }

    async fn update_status(
        &self,
        id: Uuid,
        allowed_from: &[DocumentStatus],
        next: DocumentStatus,
        error_message: Option<String>,
        processed_at: Option<DateTime<Utc>>,
    ) -> Result<Document, StatusWriteError> {
        let mut documents = self.documents.write().await;
        let document = documents.get_mut(&id).ok_or(StatusWriteError::NotFound)?;

        if !allowed_from.contains(&document.status) {
            return Err(StatusWriteError::Contention {
                actual: document.status,
            });
        }

        document.status = next;
        document.error_message = error_message;
        if processed_at.is_some() {
            document.processed_at = processed_at;
        }
        Ok(document.clone())
    }

    async fn find_type_by_name(&self, name: &str) -> Result<Option<DocumentType>, StoreError> {
        Ok(self.types_by_name.read().await.get(name).cloned())
    }

    async fn insert_type(&self, document_type: &DocumentType) -> Result<DocumentType, StoreError> {
        let mut types = self.types_by_name.write().await;
        if types.contains_key(&document_type.name) {
            return Err(StoreError::Conflict(document_type.name.clone()));
        }
        types.insert(document_type.name.clone(), document_type.clone());
        Ok(document_type.clone())
    }

    async fn find_keyword_by_name(&self, name: &str) -> Result<Option<Keyword>, StoreError> {
        Ok(self.keywords_by_name.read().await.get(name).cloned())
    }

    async fn insert_keyword(&self, keyword: &Keyword) -> Result<Keyword, StoreError> {
        let mut keywords = self.keywords_by_name.write().await;
        if keywords.contains_key(&keyword.name) {
            return Err(StoreError::Conflict(keyword.name.clone()));
        }
        keywords.insert(keyword.name.clone(), keyword.clone());
        Ok(keyword.clone())
    }
}
