use crate::cache::SummaryCache;
use crate::error::{IndexError, Result};
use crate::models::{Document, DocumentIndex, Principal};
use crate::traits::{DocumentStore, SearchBackend, SearchCriteria};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Keeps the derived search index in step with the primary store and
/// answers owner-scoped queries. The index is disposable: a stale or
/// missing entry is tolerated over blocking ingestion, and ids the
/// index returns that the primary store no longer knows are dropped.
pub struct SearchSynchronizer {
    backend: Arc<dyn SearchBackend>,
    store: Arc<dyn DocumentStore>,
    cache: Arc<SummaryCache>,
}

impl SearchSynchronizer {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        store: Arc<dyn DocumentStore>,
        cache: Arc<SummaryCache>,
    ) -> Self {
        Self {
            backend,
            store,
            cache,
        }
    }

    /// Rebuild the projection wholesale and upsert it. The processing
    /// pipeline treats a failure here as a processing failure for the
    /// document, so the error propagates.
    pub async fn index_document(&self, document: &Document) -> Result<(), IndexError> {
        let entry = DocumentIndex::from_document(document);
        self.backend.upsert(&entry).await?;
        info!(document_id = %document.id, "indexed document");
        Ok(())
    }

    /// Upsert where the owning operation must not fail on index
    /// trouble (upload stub, re-listing); failures are logged only.
    pub async fn index_document_best_effort(&self, document: &Document) {
        if let Err(cause) = self.index_document(document).await {
            warn!(document_id = %document.id, %cause, "index upsert failed, continuing");
        }
    }

    /// Remove the index entry; tolerant, the entry may already be gone
    /// or the backend may be briefly unavailable.
    pub async fn remove(&self, document_id: Uuid) {
        match self.backend.delete(document_id).await {
            Ok(()) => info!(%document_id, "deleted document index entry"),
            Err(cause) => warn!(%document_id, %cause, "index delete failed, entry may lag"),
        }
    }

    /// Tokenized OR search over title, description, and content,
    /// scoped to the caller. Result-id lists are cached write-through;
    /// ids that no longer resolve against the primary store are
    /// silently dropped.
    pub async fn search(&self, query: &str, principal: &Principal) -> Result<Vec<Document>> {
        let owner_id = principal.user_id;

        let ids = match self.cache.search_results(query, owner_id).await {
            Some(ids) => ids,
            None => {
                let criteria = SearchCriteria::text(owner_id, query);
                let ids = self.backend.query(&criteria).await?;
                self.cache
                    .put_search_results(query, owner_id, ids.clone())
                    .await;
                ids
            }
        };

        self.resolve(ids).await
    }

    /// Owner-scoped listing by exact document-type name.
    pub async fn documents_by_type(
        &self,
        type_name: &str,
        principal: &Principal,
    ) -> Result<Vec<Document>> {
        let criteria = SearchCriteria::document_type(principal.user_id, type_name);
        let ids = self.backend.query(&criteria).await?;
        self.resolve(ids).await
    }

    async fn resolve(&self, ids: Vec<Uuid>) -> Result<Vec<Document>> {
        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.find_by_id(id).await? {
                Some(document) => {
                    self.cache.put_summary(&document).await;
                    documents.push(document);
                }
                None => {
                    // Index/store drift: the entry outlived the row.
                    debug!(document_id = %id, "dropping index hit absent from primary store");
                }
            }
        }
        Ok(documents)
    }
}
