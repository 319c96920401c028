use crate::error::IndexError;
use crate::models::DocumentIndex;
use crate::traits::{SearchBackend, SearchCriteria};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process search engine with the same matching semantics the HTTP
/// backend asks of OpenSearch: any query token matches title,
/// description, or content (case-insensitive substring), scoped to the
/// owner; the type filter is an exact match.
#[derive(Default)]
pub struct InMemorySearchBackend {
    entries: RwLock<HashMap<Uuid, DocumentIndex>>,
}

impl InMemorySearchBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct lookup, used by tests asserting on stub/full entries.
    pub async fn entry(&self, id: Uuid) -> Option<DocumentIndex> {
        self.entries.read().await.get(&id).cloned()
    }
}

fn matches_terms(entry: &DocumentIndex, terms: &[String]) -> bool {
    if terms.is_empty() {
        return true;
    }
    let title = entry.title.to_lowercase();
    let description = entry.description.to_lowercase();
    let content = entry.content.to_lowercase();
    let keywords: Vec<String> = entry
        .keywords
        .iter()
        .map(|keyword| keyword.to_lowercase())
        .collect();

    terms.iter().any(|term| {
        let term = term.to_lowercase();
        title.contains(&term)
            || description.contains(&term)
            || content.contains(&term)
            || keywords.iter().any(|keyword| keyword.contains(&term))
    })
}

#[async_trait]
impl SearchBackend for InMemorySearchBackend {
    async fn upsert(&self, entry: &DocumentIndex) -> Result<(), IndexError> {
        let mut entries = self.entries.write().await;
        entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), IndexError> {
        let mut entries = self.entries.write().await;
        entries.remove(&id);
        Ok(())
    }

    async fn query(&self, criteria: &SearchCriteria) -> Result<Vec<Uuid>, IndexError> {
        let entries = self.entries.read().await;
        let mut hits: Vec<&DocumentIndex> = entries
            .values()
            .filter(|entry| entry.owner_id == criteria.owner_id)
            .filter(|entry| match &criteria.document_type {
                Some(type_name) => entry.document_type == *type_name,
                None => true,
            })
            .filter(|entry| matches_terms(entry, &criteria.terms))
            .collect();
        hits.sort_by_key(|entry| entry.uploaded_at);
        Ok(hits.iter().map(|entry| entry.id).collect())
    }
}
