use crate::models::{Document, DocumentSummary};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Derived read-through cache of document summaries and search-result
/// id lists. Strictly a performance layer: a miss means nothing beyond
/// "go ask the primary store". Entries carry no expiry; staleness
/// between explicit writes is accepted, eviction happens on delete.
#[derive(Default)]
pub struct SummaryCache {
    summaries: RwLock<HashMap<Uuid, DocumentSummary>>,
    search_results: RwLock<HashMap<String, Vec<Uuid>>>,
}

fn search_key(query: &str, owner_id: Uuid) -> String {
    format!("{query}:{owner_id}")
}

impl SummaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn summary(&self, document_id: Uuid) -> Option<DocumentSummary> {
        let cached = self.summaries.read().await.get(&document_id).cloned();
        if cached.is_none() {
            debug!(%document_id, "cache miss for document summary");
        }
        cached
    }

    pub async fn put_summary(&self, document: &Document) -> DocumentSummary {
        let summary = DocumentSummary::from_document(document);
        let mut summaries = self.summaries.write().await;
        summaries.insert(document.id, summary.clone());
        summary
    }

    pub async fn evict_summary(&self, document_id: Uuid) {
        debug!(%document_id, "evicting document summary");
        self.summaries.write().await.remove(&document_id);
    }

    pub async fn search_results(&self, query: &str, owner_id: Uuid) -> Option<Vec<Uuid>> {
        let key = search_key(query, owner_id);
        let cached = self.search_results.read().await.get(&key).cloned();
        if cached.is_none() {
            debug!(%key, "cache miss for search results");
        }
        cached
    }

    pub async fn put_search_results(&self, query: &str, owner_id: Uuid, ids: Vec<Uuid>) {
        let mut results = self.search_results.write().await;
        results.insert(search_key(query, owner_id), ids);
    }

    /// Drop every cached result list that still names the document.
    /// Cheaper than keying results by member id, and delete is rare.
    pub async fn evict_search_results_containing(&self, document_id: Uuid) {
        let mut results = self.search_results.write().await;
        results.retain(|_, ids| !ids.contains(&document_id));
    }
}
