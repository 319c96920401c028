use crate::cache::SummaryCache;
use crate::error::{PipelineError, Result};
use crate::extractor::extract_content;
use crate::ledger::StatusLedger;
use crate::models::{Document, DocumentStatus};
use crate::propagator::StatusPropagator;
use crate::search::SearchSynchronizer;
use crate::traits::DocumentStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// What became of one processing attempt.
#[derive(Debug)]
pub enum ProcessOutcome {
    Completed(Document),
    Failed(Document),
    /// The document was not in a processable state; nothing was
    /// written. Lost claims and redelivered messages land here.
    Skipped,
}

/// The single transition-and-process function both orchestration
/// strategies call. All status writes go through the ledger, so the
/// strategies stay safe to run side by side.
pub struct ProcessingPipeline {
    store: Arc<dyn DocumentStore>,
    ledger: StatusLedger,
    synchronizer: Arc<SearchSynchronizer>,
    propagator: Arc<StatusPropagator>,
    cache: Arc<SummaryCache>,
}

impl ProcessingPipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        synchronizer: Arc<SearchSynchronizer>,
        propagator: Arc<StatusPropagator>,
        cache: Arc<SummaryCache>,
    ) -> Self {
        Self {
            ledger: StatusLedger::new(store.clone()),
            store,
            synchronizer,
            propagator,
            cache,
        }
    }

    /// Claim a Pending document. `None` means another worker got there
    /// first (or the document is already terminal) — a no-op, not an
    /// error.
    pub async fn claim(&self, id: Uuid) -> Result<Option<Document>> {
        let claimed = self.ledger.claim(id).await?;
        if let Some(document) = &claimed {
            self.cache.put_summary(document).await;
        }
        Ok(claimed)
    }

    /// Claim and, if the claim won, run the document through
    /// extraction and indexing.
    pub async fn claim_and_process(&self, id: Uuid) -> Result<ProcessOutcome> {
        match self.claim(id).await? {
            Some(document) => self.process(document).await,
            None => Ok(ProcessOutcome::Skipped),
        }
    }

    /// Run one claimed document to a terminal state. Only a document
    /// currently Processing is acted on; anything else (a redelivered
    /// message for an already-terminal document, a stale snapshot) is
    /// skipped without a write, so delivery duplicates can never move
    /// a document out of a terminal state.
    pub async fn process(&self, document: Document) -> Result<ProcessOutcome> {
        if document.status != DocumentStatus::Processing {
            info!(
                document_id = %document.id,
                status = %document.status,
                "document not in processing state, skipping"
            );
            return Ok(ProcessOutcome::Skipped);
        }

        info!(document_id = %document.id, file = %document.file_name, "processing document");

        match self.extract_and_index(document.clone()).await {
            Ok(enriched) => {
                let completed = self
                    .ledger
                    .transition(enriched.id, DocumentStatus::Completed, None)
                    .await?;
                self.cache.put_summary(&completed).await;
                self.propagator.send_status_update(&completed).await;
                info!(document_id = %completed.id, "document processed");
                Ok(ProcessOutcome::Completed(completed))
            }
            Err(cause) => {
                error!(document_id = %document.id, %cause, "processing failed");
                let failed = self
                    .ledger
                    .transition(document.id, DocumentStatus::Failed, Some(cause.to_string()))
                    .await?;
                // A failed document must not stay searchable; the
                // upload-time stub comes out again.
                self.synchronizer.remove(failed.id).await;
                self.cache.put_summary(&failed).await;
                self.propagator.send_status_update(&failed).await;
                Ok(ProcessOutcome::Failed(failed))
            }
        }
    }

    /// Event-path entry: resolve the document row first. A missing row
    /// is a delivery-layer failure the consumer may nack, distinct
    /// from a processing failure which is terminal.
    pub async fn process_by_id(&self, id: Uuid) -> Result<ProcessOutcome> {
        let document = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(PipelineError::DocumentNotFound(id))?;
        self.process(document).await
    }

    async fn extract_and_index(&self, mut document: Document) -> Result<Document> {
        let path = PathBuf::from(&document.file_path);
        let content_type = document.content_type.clone();

        // Format parsing is blocking file work; keep it off the
        // async workers.
        let extracted = tokio::task::spawn_blocking(move || extract_content(&path, &content_type))
            .await
            .map_err(|join_error| {
                PipelineError::Dispatch(format!("extraction task aborted: {join_error}"))
            })??;

        document.content = extracted.text;
        if extracted.page_count.is_some() {
            document.page_count = extracted.page_count;
        }
        let saved = self.store.save(&document).await?;

        self.synchronizer.index_document(&saved).await?;
        Ok(saved)
    }
}
