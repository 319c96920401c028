use crate::error::Result;
use crate::models::{DocumentStatus, Topic};
use crate::pipeline::{ProcessOutcome, ProcessingPipeline};
use crate::propagator::StatusPropagator;
use crate::traits::{Delivery, DocumentStore, MessageBus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

/// Tally of one polling sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl SweepReport {
    pub fn drained(&self) -> usize {
        self.completed + self.failed + self.skipped
    }
}

/// Chunked polling strategy: repeatedly pull Pending documents and
/// process them in bounded-concurrency chunks. Every item commits
/// independently; a crash mid-chunk leaves the remainder Pending for
/// the next sweep.
pub struct PollingOrchestrator {
    pipeline: Arc<ProcessingPipeline>,
    store: Arc<dyn DocumentStore>,
    chunk_size: usize,
    worker_width: usize,
    poll_interval: Duration,
}

impl PollingOrchestrator {
    pub fn new(
        pipeline: Arc<ProcessingPipeline>,
        store: Arc<dyn DocumentStore>,
        chunk_size: usize,
        worker_width: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            pipeline,
            store,
            chunk_size,
            worker_width: worker_width.max(1),
            poll_interval,
        }
    }

    /// One full sweep over the current Pending set. With nothing
    /// Pending this is a no-op.
    pub async fn run_once(&self) -> Result<SweepReport> {
        let pending = self.store.find_by_status(DocumentStatus::Pending).await?;
        if pending.is_empty() {
            return Ok(SweepReport::default());
        }

        info!(pending = pending.len(), "polling sweep starting");
        let mut report = SweepReport::default();
        let semaphore = Arc::new(Semaphore::new(self.worker_width));

        for chunk in pending.chunks(self.chunk_size) {
            let mut tasks = JoinSet::new();

            for document in chunk {
                let pipeline = self.pipeline.clone();
                let semaphore = semaphore.clone();
                let id = document.id;

                tasks.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                    pipeline.claim_and_process(id).await
                });
            }

            // One document's failure never aborts the rest of the
            // chunk; each outcome was committed by the time it lands
            // here.
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(Ok(ProcessOutcome::Completed(_))) => report.completed += 1,
                    Ok(Ok(ProcessOutcome::Failed(_))) => report.failed += 1,
                    Ok(Ok(ProcessOutcome::Skipped)) => report.skipped += 1,
                    Ok(Err(cause)) => {
                        report.skipped += 1;
                        error!(%cause, "sweep item errored outside the document");
                    }
                    Err(join_error) => {
                        report.skipped += 1;
                        error!(%join_error, "sweep worker panicked");
                    }
                }
            }
        }

        info!(
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            "polling sweep finished"
        );
        Ok(report)
    }

    /// Sweep forever. The wake channel lets the ingestion coordinator
    /// cut the poll interval short when fresh work arrives.
    pub async fn run(self, mut wake: mpsc::UnboundedReceiver<uuid::Uuid>) {
        loop {
            if let Err(cause) = self.run_once().await {
                error!(%cause, "polling sweep failed, will retry next interval");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                nudge = wake.recv() => {
                    if nudge.is_none() {
                        info!("wake channel closed, polling orchestrator stopping");
                        return;
                    }
                }
            }
        }
    }
}

/// Event-driven strategy: one consumer loop per lifecycle topic, each
/// message acknowledged manually. Safe to run beside the polling
/// strategy — the Pending->Processing gate in the ledger means a
/// document claimed elsewhere is a no-op here.
pub struct EventOrchestrator {
    pipeline: Arc<ProcessingPipeline>,
    propagator: Arc<StatusPropagator>,
    bus: Arc<dyn MessageBus>,
    redelivery_delay: Duration,
}

impl EventOrchestrator {
    pub fn new(
        pipeline: Arc<ProcessingPipeline>,
        propagator: Arc<StatusPropagator>,
        bus: Arc<dyn MessageBus>,
        redelivery_delay: Duration,
    ) -> Self {
        Self {
            pipeline,
            propagator,
            bus,
            redelivery_delay,
        }
    }

    /// Subscribe the three topic consumers and leave them running.
    pub async fn spawn(self) -> Result<Vec<JoinHandle<()>>, crate::error::BusError> {
        let mut ingestion = self.bus.subscribe(Topic::Ingestion).await?;
        let mut processing = self.bus.subscribe(Topic::Processing).await?;
        let mut status = self.bus.subscribe(Topic::Status).await?;

        let orchestrator = Arc::new(self);

        let ingestion_loop = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                while let Some(delivery) = ingestion.next().await {
                    orchestrator.handle_ingestion(delivery).await;
                }
                info!("ingestion topic closed");
            })
        };

        let processing_loop = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                while let Some(delivery) = processing.next().await {
                    orchestrator.handle_processing(delivery).await;
                }
                info!("processing topic closed");
            })
        };

        let status_loop = tokio::spawn(async move {
            while let Some(delivery) = status.next().await {
                Self::handle_status(delivery);
            }
            info!("status topic closed");
        });

        Ok(vec![ingestion_loop, processing_loop, status_loop])
    }

    /// Ingestion event: claim the document and pass it to the
    /// processing topic. A document that is no longer Pending was
    /// claimed elsewhere — acknowledged without a write.
    pub async fn handle_ingestion(&self, delivery: Delivery) {
        let document_id = delivery.event.document_id;
        info!(%document_id, "received ingestion message");

        match self.pipeline.claim(document_id).await {
            Ok(Some(document)) => {
                self.propagator.send_for_processing(&document).await;
                delivery.ack();
            }
            Ok(None) => {
                info!(%document_id, "document already claimed or terminal");
                delivery.ack();
            }
            Err(cause) => {
                warn!(%document_id, %cause, "ingestion message failed, redelivering");
                delivery.nack(self.redelivery_delay);
            }
        }
    }

    /// Processing event: run extraction and indexing. Both terminal
    /// outcomes acknowledge — redelivering a permanently-corrupt file
    /// forever would stall the topic. Only a delivery-layer failure
    /// (the row was unreachable) negatively acknowledges.
    pub async fn handle_processing(&self, delivery: Delivery) {
        let document_id = delivery.event.document_id;
        info!(%document_id, "received processing message");

        match self.pipeline.process_by_id(document_id).await {
            Ok(ProcessOutcome::Completed(_)) | Ok(ProcessOutcome::Failed(_)) => delivery.ack(),
            Ok(ProcessOutcome::Skipped) => {
                info!(%document_id, "processing message was stale, nothing to do");
                delivery.ack();
            }
            Err(cause) => {
                warn!(%document_id, %cause, "processing message failed, redelivering");
                delivery.nack(self.redelivery_delay);
            }
        }
    }

    /// Status events are purely observational.
    pub fn handle_status(delivery: Delivery) {
        let event = &delivery.event;
        info!(
            document_id = %event.document_id,
            status = %event.status,
            action = ?event.action,
            "received status message"
        );
        delivery.ack();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchMode;
    use crate::models::{EventAction, LifecycleEvent, UploadMetadata};
    use crate::testkit::{principal, Harness};
    use chrono::Utc;

    fn orchestrator(harness: &Harness) -> PollingOrchestrator {
        PollingOrchestrator::new(
            harness.pipeline.clone(),
            harness.store.clone(),
            100,
            10,
            Duration::from_millis(20),
        )
    }

    async fn upload(
        harness: &Harness,
        wake: &mpsc::UnboundedSender<uuid::Uuid>,
        bytes: &[u8],
        name: &str,
        content_type: &str,
    ) -> crate::models::Document {
        let coordinator = harness.coordinator(DispatchMode::Batch, Some(wake.clone()));
        coordinator
            .upload(
                bytes,
                name,
                content_type,
                UploadMetadata {
                    title: name.to_string(),
                    ..Default::default()
                },
                Some(&principal("uploader")),
            )
            .await
            .expect("upload")
    }

    #[tokio::test]
    async fn sweep_completes_a_plain_text_document() {
        let harness = Harness::new();
        let (wake_tx, _wake_rx) = mpsc::unbounded_channel();
        let mut status_stream = harness
            .bus
            .subscribe(Topic::Status)
            .await
            .expect("subscribe");

        let document = upload(&harness, &wake_tx, b"hello world", "hello.txt", "text/plain").await;
        assert_eq!(document.status, DocumentStatus::Pending);

        let report = orchestrator(&harness).run_once().await.expect("sweep");
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 0);

        let processed = harness
            .store
            .find_by_id(document.id)
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(processed.status, DocumentStatus::Completed);
        assert_eq!(processed.content, "hello world");
        assert!(processed.processed_at.is_some());
        assert!(processed.error_message.is_none());

        // The index now carries the full content, and the terminal
        // transition was announced on the status topic.
        let entry = harness.backend.entry(document.id).await.expect("entry");
        assert_eq!(entry.content, "hello world");

        let event = status_stream.next().await.expect("status event");
        assert_eq!(event.event.document_id, document.id);
        assert_eq!(event.event.status, DocumentStatus::Completed);
        assert_eq!(event.event.action, EventAction::UpdateStatus);
        event.ack();
    }

    #[tokio::test]
    async fn sweep_with_nothing_pending_is_a_noop() {
        let harness = Harness::new();
        let polling = orchestrator(&harness);

        let report = polling.run_once().await.expect("sweep");
        assert_eq!(report, SweepReport::default());

        // Same after everything already ran to a terminal state.
        let (wake_tx, _wake_rx) = mpsc::unbounded_channel();
        upload(&harness, &wake_tx, b"hi", "hi.txt", "text/plain").await;
        polling.run_once().await.expect("sweep");
        let again = polling.run_once().await.expect("sweep");
        assert_eq!(again.drained(), 0);
    }

    #[tokio::test]
    async fn unsupported_type_fails_and_leaves_no_index_entry() {
        let harness = Harness::new();
        let (wake_tx, _wake_rx) = mpsc::unbounded_channel();
        let document = upload(&harness, &wake_tx, b"????", "blob.bin", "application/unknown").await;

        let report = orchestrator(&harness).run_once().await.expect("sweep");
        assert_eq!(report.failed, 1);

        let failed = harness
            .store
            .find_by_id(document.id)
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(failed.status, DocumentStatus::Failed);
        let message = failed.error_message.expect("reason recorded");
        assert!(message.contains("unsupported file type"));
        assert!(failed.processed_at.is_some());

        assert!(harness.backend.entry(document.id).await.is_none());
    }

    #[tokio::test]
    async fn one_bad_document_never_aborts_the_chunk() {
        let harness = Harness::new();
        let (wake_tx, _wake_rx) = mpsc::unbounded_channel();

        upload(&harness, &wake_tx, b"first", "first.txt", "text/plain").await;
        upload(&harness, &wake_tx, b"????", "blob.bin", "application/unknown").await;
        upload(&harness, &wake_tx, b"second", "second.txt", "text/plain").await;

        let report = orchestrator(&harness).run_once().await.expect("sweep");
        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn event_consumers_run_a_document_to_completion() {
        let harness = Harness::new();
        let coordinator = harness.coordinator(DispatchMode::Messaging, None);

        let events = EventOrchestrator::new(
            harness.pipeline.clone(),
            harness.propagator.clone(),
            harness.bus.clone(),
            Duration::from_millis(10),
        );
        let consumers = events.spawn().await.expect("spawn consumers");

        let document = coordinator
            .upload(
                b"hello world",
                "hello.txt",
                "text/plain",
                UploadMetadata::default(),
                Some(&principal("uploader")),
            )
            .await
            .expect("upload");

        let processed = wait_for_terminal(&harness, document.id).await;
        assert_eq!(processed.status, DocumentStatus::Completed);
        assert_eq!(processed.content, "hello world");

        for consumer in consumers {
            consumer.abort();
        }
    }

    #[tokio::test]
    async fn redelivered_processing_event_never_reopens_a_terminal_document() {
        let harness = Harness::new();
        let coordinator = harness.coordinator(DispatchMode::Messaging, None);

        let events = EventOrchestrator::new(
            harness.pipeline.clone(),
            harness.propagator.clone(),
            harness.bus.clone(),
            Duration::from_millis(10),
        );
        let consumers = events.spawn().await.expect("spawn consumers");

        let document = coordinator
            .upload(
                b"once only",
                "once.txt",
                "text/plain",
                UploadMetadata::default(),
                Some(&principal("uploader")),
            )
            .await
            .expect("upload");

        let processed = wait_for_terminal(&harness, document.id).await;
        let first_processed_at = processed.processed_at.expect("stamped");

        // Simulate an at-least-once duplicate of the processing
        // message after the acknowledgement.
        let duplicate = LifecycleEvent {
            document_id: document.id,
            file_name: document.file_name.clone(),
            file_path: document.file_path.clone(),
            owner_id: document.owner_id,
            status: DocumentStatus::Processing,
            timestamp: Utc::now(),
            error_message: None,
            action: EventAction::Process,
        };
        harness
            .bus
            .publish(Topic::Processing, duplicate)
            .await
            .expect("publish duplicate");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let after = harness
            .store
            .find_by_id(document.id)
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(after.status, DocumentStatus::Completed);
        assert_eq!(after.processed_at, Some(first_processed_at));

        for consumer in consumers {
            consumer.abort();
        }
    }

    async fn wait_for_terminal(harness: &Harness, id: uuid::Uuid) -> crate::models::Document {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let current = harness
                .store
                .find_by_id(id)
                .await
                .expect("find")
                .expect("exists");
            if current.status.is_terminal() {
                return current;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("document never reached a terminal state");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
