use crate::models::{Document, EventAction, LifecycleEvent, Topic};
use crate::traits::MessageBus;
use std::sync::Arc;
use tracing::{error, info};

/// Emits lifecycle events after state transitions. Publishing is
/// fire-and-forget: a lost event never fails the transition that
/// produced it, so failures are logged and swallowed here.
pub struct StatusPropagator {
    bus: Arc<dyn MessageBus>,
}

impl StatusPropagator {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }

    pub async fn send_for_ingestion(&self, document: &Document) {
        self.publish(
            Topic::Ingestion,
            LifecycleEvent::for_document(document, EventAction::Ingest),
        )
        .await;
    }

    pub async fn send_for_processing(&self, document: &Document) {
        self.publish(
            Topic::Processing,
            LifecycleEvent::for_document(document, EventAction::Process),
        )
        .await;
    }

    pub async fn send_status_update(&self, document: &Document) {
        self.publish(
            Topic::Status,
            LifecycleEvent::for_document(document, EventAction::UpdateStatus),
        )
        .await;
    }

    async fn publish(&self, topic: Topic, event: LifecycleEvent) {
        let document_id = event.document_id;
        match self.bus.publish(topic, event).await {
            Ok(()) => info!(%document_id, %topic, "published lifecycle event"),
            Err(cause) => error!(%document_id, %topic, %cause, "failed to publish lifecycle event"),
        }
    }
}
