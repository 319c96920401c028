use crate::error::{PipelineError, Result};
use crate::models::{Document, DocumentStatus};
use crate::traits::{DocumentStore, StatusWriteError};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Single source of truth for processing status. Every stage of the
/// pipeline mutates documents through `transition`; the underlying
/// compare-and-set is the per-document serialization point, so a second
/// worker racing for the same document loses here and nowhere else.
pub struct StatusLedger {
    store: Arc<dyn DocumentStore>,
}

impl StatusLedger {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Move `id` into `next`. Legal edges: Pending->Processing,
    /// Processing->Completed, Processing->Failed, Pending->Failed.
    ///
    /// Completed stamps `processed_at` and clears the error message.
    /// Failed stamps `processed_at` and requires a non-empty message.
    /// The ledger write is durable before any caller-side effect runs.
    pub async fn transition(
        &self,
        id: Uuid,
        next: DocumentStatus,
        error_message: Option<String>,
    ) -> Result<Document> {
        let allowed_from = next.admissible_sources();
        if allowed_from.is_empty() {
            return Err(PipelineError::InvalidTransition {
                from: next,
                to: next,
            });
        }

        let error_message = match next {
            DocumentStatus::Failed => match error_message {
                Some(message) if !message.trim().is_empty() => Some(message),
                _ => return Err(PipelineError::MissingErrorMessage),
            },
            // Completed clears any message left from an earlier attempt.
            _ => None,
        };

        let processed_at = next.is_terminal().then(Utc::now);

        let updated = self
            .store
            .update_status(id, allowed_from, next, error_message, processed_at)
            .await
            .map_err(|error| match error {
                StatusWriteError::NotFound => PipelineError::DocumentNotFound(id),
                StatusWriteError::Contention { actual } => PipelineError::InvalidTransition {
                    from: actual,
                    to: next,
                },
                StatusWriteError::Backend(details) => {
                    PipelineError::Store(crate::error::StoreError::Backend(details))
                }
            })?;

        debug!(document_id = %id, status = %next, "status transition committed");
        Ok(updated)
    }

    /// Claim a Pending document for processing. A lost race (the
    /// document is no longer Pending) is a no-op `None`, not an error:
    /// both orchestration strategies may sweep the same document.
    pub async fn claim(&self, id: Uuid) -> Result<Option<Document>> {
        match self.transition(id, DocumentStatus::Processing, None).await {
            Ok(document) => Ok(Some(document)),
            Err(PipelineError::InvalidTransition { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }
}
