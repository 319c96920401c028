use crate::cache::SummaryCache;
use crate::config::{DispatchMode, PipelineConfig};
use crate::error::{PipelineError, Result, StoreError};
use crate::ledger::StatusLedger;
use crate::models::{
    Document, DocumentStatus, DocumentSummary, DocumentType, Keyword, Principal, UploadMetadata,
};
use crate::propagator::StatusPropagator;
use crate::retry::with_backoff;
use crate::search::SearchSynchronizer;
use crate::traits::DocumentStore;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

const DEFAULT_TYPE_NAME: &str = "UNKNOWN";

/// Accepts uploads, persists the initial Pending record, and hands the
/// document off to asynchronous processing. The upload call returns as
/// soon as the record is durable; extraction happens off this path.
pub struct IngestionCoordinator {
    store: Arc<dyn DocumentStore>,
    synchronizer: Arc<SearchSynchronizer>,
    cache: Arc<SummaryCache>,
    propagator: Arc<StatusPropagator>,
    ledger: StatusLedger,
    config: PipelineConfig,
    wake: Option<mpsc::UnboundedSender<Uuid>>,
}

impl IngestionCoordinator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        synchronizer: Arc<SearchSynchronizer>,
        cache: Arc<SummaryCache>,
        propagator: Arc<StatusPropagator>,
        config: PipelineConfig,
        wake: Option<mpsc::UnboundedSender<Uuid>>,
    ) -> Self {
        Self {
            ledger: StatusLedger::new(store.clone()),
            store,
            synchronizer,
            cache,
            propagator,
            config,
            wake,
        }
    }

    /// Persist an upload and trigger processing. The file write,
    /// type/keyword reservation, and Pending save form one attempt,
    /// retried with exponential backoff before surfacing; the
    /// post-commit side effects (cache, index stub, dispatch) run
    /// once.
    pub async fn upload(
        &self,
        file_bytes: &[u8],
        original_file_name: &str,
        declared_content_type: &str,
        metadata: UploadMetadata,
        principal: Option<&Principal>,
    ) -> Result<Document> {
        let principal = principal.ok_or(PipelineError::Unauthenticated)?;

        let document = with_backoff(self.config.upload_backoff, || {
            self.attempt_upload(
                file_bytes,
                original_file_name,
                declared_content_type,
                &metadata,
                principal,
            )
        })
        .await?;

        info!(document_id = %document.id, file = %document.file_name, "document uploaded");

        self.cache.put_summary(&document).await;
        self.synchronizer.index_document_best_effort(&document).await;

        self.dispatch(document).await
    }

    async fn attempt_upload(
        &self,
        file_bytes: &[u8],
        original_file_name: &str,
        declared_content_type: &str,
        metadata: &UploadMetadata,
        principal: &Principal,
    ) -> Result<Document> {
        tokio::fs::create_dir_all(&self.config.upload_dir).await?;

        let extension = original_file_name
            .rfind('.')
            .map(|index| &original_file_name[index..])
            .unwrap_or("");
        let stored_name = format!("{}{}", Uuid::new_v4(), extension);
        let file_path = self.config.upload_dir.join(stored_name);
        tokio::fs::write(&file_path, file_bytes).await?;

        let type_name = metadata
            .document_type
            .as_deref()
            .unwrap_or(DEFAULT_TYPE_NAME);
        let document_type = self.resolve_type(type_name).await?;
        let keywords = self.resolve_keywords(&metadata.keywords).await?;

        let document = Document {
            id: Uuid::new_v4(),
            file_name: original_file_name.to_string(),
            file_path: file_path.to_string_lossy().into_owned(),
            content: String::new(),
            content_type: declared_content_type.to_string(),
            file_size: file_bytes.len() as u64,
            status: DocumentStatus::Pending,
            owner_id: principal.user_id,
            author: principal.display_name.clone(),
            error_message: None,
            uploaded_at: Utc::now(),
            processed_at: None,
            document_type,
            title: metadata.title.clone(),
            description: metadata.description.clone(),
            language: metadata.language.clone(),
            page_count: None,
            keywords,
        };

        Ok(self.store.save(&document).await?)
    }

    /// Find-or-create guarded by the store's unique name constraint: a
    /// lost insert race re-reads the winner instead of failing the
    /// upload.
    async fn resolve_type(&self, name: &str) -> Result<DocumentType, StoreError> {
        if let Some(existing) = self.store.find_type_by_name(name).await? {
            return Ok(existing);
        }

        match self.store.insert_type(&DocumentType::new(name)).await {
            Ok(created) => {
                info!(type_name = %name, "created new document type");
                Ok(created)
            }
            Err(StoreError::Conflict(_)) => self
                .store
                .find_type_by_name(name)
                .await?
                .ok_or_else(|| StoreError::Backend(format!("type {name} vanished after conflict"))),
            Err(other) => Err(other),
        }
    }

    async fn resolve_keywords(&self, names: &[String]) -> Result<Vec<Keyword>, StoreError> {
        let mut resolved: Vec<Keyword> = Vec::new();

        for name in names {
            if resolved.iter().any(|keyword| keyword.name == *name) {
                continue;
            }

            let keyword = match self.store.find_keyword_by_name(name).await? {
                Some(existing) => existing,
                None => match self.store.insert_keyword(&Keyword::new(name.clone())).await {
                    Ok(created) => created,
                    Err(StoreError::Conflict(_)) => {
                        self.store.find_keyword_by_name(name).await?.ok_or_else(|| {
                            StoreError::Backend(format!("keyword {name} vanished after conflict"))
                        })?
                    }
                    Err(other) => return Err(other),
                },
            };
            resolved.push(keyword);
        }

        Ok(resolved)
    }

    /// Hand the committed document to the configured orchestrator. A
    /// scheduling failure fail-fasts the document to Failed; the
    /// upload itself stays committed and is returned to the caller.
    async fn dispatch(&self, document: Document) -> Result<Document> {
        match self.config.dispatch_mode {
            DispatchMode::Batch => {
                let send_result = match &self.wake {
                    Some(wake) => wake
                        .send(document.id)
                        .map_err(|_| "polling orchestrator is not running".to_string()),
                    None => Err("no polling orchestrator attached".to_string()),
                };

                if let Err(cause) = send_result {
                    error!(document_id = %document.id, %cause, "failed to schedule processing");
                    let failed = self
                        .ledger
                        .transition(
                            document.id,
                            DocumentStatus::Failed,
                            Some(format!("failed to start processing: {cause}")),
                        )
                        .await?;
                    self.cache.put_summary(&failed).await;
                    self.propagator.send_status_update(&failed).await;
                    return Ok(failed);
                }
                Ok(document)
            }
            DispatchMode::Messaging => {
                // Fire-and-forget: the propagator logs delivery
                // failures; redelivery is the consumer's concern.
                self.propagator.send_for_ingestion(&document).await;
                Ok(document)
            }
        }
    }

    /// Owner-checked fetch. A hit for the wrong caller is an
    /// access-denied error, never a not-found.
    pub async fn document(&self, id: Uuid, principal: &Principal) -> Result<Document> {
        let document = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(PipelineError::DocumentNotFound(id))?;

        if document.owner_id != principal.user_id {
            return Err(PipelineError::AccessDenied(id));
        }

        self.cache.put_summary(&document).await;
        Ok(document)
    }

    /// Summary read-through: the cache answers when it can, the
    /// primary store fills misses. A cached entry for a different
    /// owner is still access-denied.
    pub async fn summary(&self, id: Uuid, principal: &Principal) -> Result<DocumentSummary> {
        if let Some(summary) = self.cache.summary(id).await {
            if summary.owner_id != principal.user_id {
                return Err(PipelineError::AccessDenied(id));
            }
            return Ok(summary);
        }

        let document = self.document(id, principal).await?;
        Ok(self.cache.put_summary(&document).await)
    }

    /// Delete is not complete until the record, the index entry, and
    /// the cache entries are gone. The stored file is best-effort.
    pub async fn delete(&self, id: Uuid, principal: &Principal) -> Result<()> {
        let document = self.document(id, principal).await?;

        if let Err(cause) = tokio::fs::remove_file(Path::new(&document.file_path)).await {
            warn!(document_id = %id, %cause, "stored file could not be removed");
        }

        self.synchronizer.remove(id).await;
        self.cache.evict_summary(id).await;
        self.cache.evict_search_results_containing(id).await;
        self.store.delete(id).await?;

        info!(document_id = %id, "document deleted");
        Ok(())
    }

    pub async fn documents_for_owner(&self, principal: &Principal) -> Result<Vec<Document>> {
        let documents = self.store.find_by_owner(principal.user_id).await?;
        for document in &documents {
            self.cache.put_summary(document).await;
        }
        Ok(documents)
    }

    pub async fn documents_by_status(
        &self,
        status: DocumentStatus,
        principal: &Principal,
    ) -> Result<Vec<Document>> {
        let documents = self
            .store
            .find_by_owner_and_status(principal.user_id, status)
            .await?;
        for document in &documents {
            self.cache.put_summary(document).await;
        }
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventAction;
    use crate::testkit::{principal, Harness};
    use crate::traits::MessageBus;

    fn metadata(keywords: &[&str]) -> UploadMetadata {
        UploadMetadata {
            title: "quarterly report".to_string(),
            description: "numbers for q3".to_string(),
            language: "en".to_string(),
            document_type: None,
            keywords: keywords.iter().map(|name| name.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn upload_returns_a_pending_document_immediately() {
        let harness = Harness::new();
        let (wake_tx, mut wake_rx) = tokio::sync::mpsc::unbounded_channel();
        let coordinator = harness.coordinator(DispatchMode::Batch, Some(wake_tx));
        let caller = principal("uploader");

        let document = coordinator
            .upload(
                b"hello world",
                "greeting.txt",
                "text/plain",
                metadata(&[]),
                Some(&caller),
            )
            .await
            .expect("upload");

        assert_eq!(document.status, DocumentStatus::Pending);
        assert!(document.content.is_empty());
        assert!(document.processed_at.is_none());
        assert_eq!(document.author, "uploader");
        assert_eq!(document.file_size, 11);

        // The bytes are on disk under a generated name with the
        // original extension.
        let stored = std::path::Path::new(&document.file_path);
        assert!(stored.exists());
        assert_eq!(stored.extension().and_then(|ext| ext.to_str()), Some("txt"));
        assert_ne!(stored.file_name().unwrap().to_str().unwrap(), "greeting.txt");

        // Summary cached, text-less stub indexed, sweep woken.
        assert!(harness.cache.summary(document.id).await.is_some());
        let stub = harness.backend.entry(document.id).await.expect("stub entry");
        assert!(stub.content.is_empty());
        assert_eq!(wake_rx.recv().await, Some(document.id));
    }

    #[tokio::test]
    async fn upload_without_a_principal_is_rejected() {
        let harness = Harness::new();
        let coordinator = harness.coordinator(DispatchMode::Batch, None);

        let error = coordinator
            .upload(b"x", "x.txt", "text/plain", metadata(&[]), None)
            .await
            .expect_err("unauthenticated");
        assert!(matches!(error, PipelineError::Unauthenticated));
    }

    #[tokio::test]
    async fn missing_type_defaults_and_keywords_deduplicate() {
        let harness = Harness::new();
        let (wake_tx, _wake_rx) = tokio::sync::mpsc::unbounded_channel();
        let coordinator = harness.coordinator(DispatchMode::Batch, Some(wake_tx));
        let caller = principal("uploader");

        let first = coordinator
            .upload(
                b"a",
                "a.txt",
                "text/plain",
                metadata(&["invoice", "invoice", "urgent"]),
                Some(&caller),
            )
            .await
            .expect("upload");

        assert_eq!(first.document_type.name, "UNKNOWN");
        assert_eq!(first.keywords.len(), 2);

        // Keywords are shared across documents: the second upload
        // resolves the same rows instead of minting new ones.
        let second = coordinator
            .upload(
                b"b",
                "b.txt",
                "text/plain",
                metadata(&["invoice"]),
                Some(&caller),
            )
            .await
            .expect("upload");

        let first_invoice = first
            .keywords
            .iter()
            .find(|keyword| keyword.name == "invoice")
            .expect("keyword");
        assert_eq!(second.keywords[0].id, first_invoice.id);
    }

    #[tokio::test]
    async fn failed_dispatch_fail_fasts_the_document() {
        let harness = Harness::new();
        let (wake_tx, wake_rx) = tokio::sync::mpsc::unbounded_channel();
        drop(wake_rx);
        let coordinator = harness.coordinator(DispatchMode::Batch, Some(wake_tx));
        let caller = principal("uploader");

        let document = coordinator
            .upload(b"x", "x.txt", "text/plain", metadata(&[]), Some(&caller))
            .await
            .expect("upload commits even when scheduling fails");

        assert_eq!(document.status, DocumentStatus::Failed);
        let message = document.error_message.expect("failure reason recorded");
        assert!(message.contains("failed to start processing"));
        assert!(document.processed_at.is_some());
    }

    #[tokio::test]
    async fn messaging_mode_publishes_an_ingestion_event() {
        let harness = Harness::new();
        let mut ingestion = harness
            .bus
            .subscribe(crate::models::Topic::Ingestion)
            .await
            .expect("subscribe");
        let coordinator = harness.coordinator(DispatchMode::Messaging, None);
        let caller = principal("uploader");

        let document = coordinator
            .upload(b"x", "x.txt", "text/plain", metadata(&[]), Some(&caller))
            .await
            .expect("upload");
        assert_eq!(document.status, DocumentStatus::Pending);

        let delivery = ingestion.next().await.expect("ingest event");
        assert_eq!(delivery.event.document_id, document.id);
        assert_eq!(delivery.event.action, EventAction::Ingest);
        assert_eq!(delivery.event.status, DocumentStatus::Pending);
        delivery.ack();
    }

    #[tokio::test]
    async fn cross_user_access_is_denied_not_hidden() {
        let harness = Harness::new();
        let (wake_tx, _wake_rx) = tokio::sync::mpsc::unbounded_channel();
        let coordinator = harness.coordinator(DispatchMode::Batch, Some(wake_tx));
        let owner = principal("owner");
        let intruder = principal("intruder");

        let document = coordinator
            .upload(b"mine", "mine.txt", "text/plain", metadata(&[]), Some(&owner))
            .await
            .expect("upload");

        let error = coordinator
            .document(document.id, &intruder)
            .await
            .expect_err("not the owner");
        assert!(matches!(error, PipelineError::AccessDenied(id) if id == document.id));

        // Cached summaries enforce the same boundary.
        let error = coordinator
            .summary(document.id, &intruder)
            .await
            .expect_err("not the owner");
        assert!(matches!(error, PipelineError::AccessDenied(_)));

        let fetched = coordinator
            .document(document.id, &owner)
            .await
            .expect("owner sees it");
        assert_eq!(fetched.id, document.id);
    }

    #[tokio::test]
    async fn summary_read_through_falls_back_to_the_store() {
        let harness = Harness::new();
        let (wake_tx, _wake_rx) = tokio::sync::mpsc::unbounded_channel();
        let coordinator = harness.coordinator(DispatchMode::Batch, Some(wake_tx));
        let caller = principal("uploader");

        let document = coordinator
            .upload(b"x", "x.txt", "text/plain", metadata(&[]), Some(&caller))
            .await
            .expect("upload");

        // A cache miss is not an error; the store repopulates it.
        harness.cache.evict_summary(document.id).await;
        let summary = coordinator
            .summary(document.id, &caller)
            .await
            .expect("read-through");
        assert_eq!(summary.id, document.id);
        assert!(harness.cache.summary(document.id).await.is_some());
    }

    #[tokio::test]
    async fn delete_is_complete_across_all_three_stores() {
        let harness = Harness::new();
        let (wake_tx, _wake_rx) = tokio::sync::mpsc::unbounded_channel();
        let coordinator = harness.coordinator(DispatchMode::Batch, Some(wake_tx));
        let caller = principal("uploader");

        let document = coordinator
            .upload(b"gone soon", "gone.txt", "text/plain", metadata(&[]), Some(&caller))
            .await
            .expect("upload");
        let file_path = document.file_path.clone();

        coordinator
            .delete(document.id, &caller)
            .await
            .expect("delete");

        let error = coordinator
            .document(document.id, &caller)
            .await
            .expect_err("row is gone");
        assert!(matches!(error, PipelineError::DocumentNotFound(id) if id == document.id));
        assert!(harness.backend.entry(document.id).await.is_none());
        assert!(harness.cache.summary(document.id).await.is_none());
        assert!(!std::path::Path::new(&file_path).exists());
    }

    #[tokio::test]
    async fn listings_are_owner_scoped_and_warm_the_cache() {
        let harness = Harness::new();
        let (wake_tx, _wake_rx) = tokio::sync::mpsc::unbounded_channel();
        let coordinator = harness.coordinator(DispatchMode::Batch, Some(wake_tx));
        let caller = principal("uploader");
        let other = principal("other");

        let mine = coordinator
            .upload(b"a", "a.txt", "text/plain", metadata(&[]), Some(&caller))
            .await
            .expect("upload");
        coordinator
            .upload(b"b", "b.txt", "text/plain", metadata(&[]), Some(&other))
            .await
            .expect("upload");

        let pending = coordinator
            .documents_by_status(DocumentStatus::Pending, &caller)
            .await
            .expect("listing");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, mine.id);

        harness.cache.evict_summary(mine.id).await;
        coordinator.documents_for_owner(&caller).await.expect("listing");
        assert!(harness.cache.summary(mine.id).await.is_some());
    }
}
