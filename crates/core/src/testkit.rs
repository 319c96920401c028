use crate::bus::InMemoryBus;
use crate::cache::SummaryCache;
use crate::config::{DispatchMode, PipelineConfig};
use crate::coordinator::IngestionCoordinator;
use crate::models::Principal;
use crate::pipeline::ProcessingPipeline;
use crate::propagator::StatusPropagator;
use crate::retry::BackoffPolicy;
use crate::search::SearchSynchronizer;
use crate::stores::{InMemoryDocumentStore, InMemorySearchBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Fully wired in-memory pipeline for scenario tests.
pub(crate) struct Harness {
    pub dir: tempfile::TempDir,
    pub store: Arc<InMemoryDocumentStore>,
    pub backend: Arc<InMemorySearchBackend>,
    pub cache: Arc<SummaryCache>,
    pub bus: Arc<InMemoryBus>,
    pub synchronizer: Arc<SearchSynchronizer>,
    pub propagator: Arc<StatusPropagator>,
    pub pipeline: Arc<ProcessingPipeline>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(InMemoryDocumentStore::new());
        let backend = Arc::new(InMemorySearchBackend::new());
        let cache = Arc::new(SummaryCache::new());
        let bus = Arc::new(InMemoryBus::new());
        let synchronizer = Arc::new(SearchSynchronizer::new(
            backend.clone(),
            store.clone(),
            cache.clone(),
        ));
        let propagator = Arc::new(StatusPropagator::new(bus.clone()));
        let pipeline = Arc::new(ProcessingPipeline::new(
            store.clone(),
            synchronizer.clone(),
            propagator.clone(),
            cache.clone(),
        ));

        Self {
            dir,
            store,
            backend,
            cache,
            bus,
            synchronizer,
            propagator,
            pipeline,
        }
    }

    /// Millisecond backoff so retry-path tests stay fast.
    pub fn config(&self, dispatch_mode: DispatchMode) -> PipelineConfig {
        PipelineConfig {
            upload_dir: self.dir.path().join("uploads"),
            dispatch_mode,
            poll_interval: Duration::from_millis(20),
            redelivery_delay: Duration::from_millis(10),
            upload_backoff: BackoffPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(4),
            },
            ..PipelineConfig::default()
        }
    }

    pub fn coordinator(
        &self,
        dispatch_mode: DispatchMode,
        wake: Option<mpsc::UnboundedSender<Uuid>>,
    ) -> IngestionCoordinator {
        IngestionCoordinator::new(
            self.store.clone(),
            self.synchronizer.clone(),
            self.cache.clone(),
            self.propagator.clone(),
            self.config(dispatch_mode),
            wake,
        )
    }
}

pub(crate) fn principal(display_name: &str) -> Principal {
    Principal {
        user_id: Uuid::new_v4(),
        display_name: display_name.to_string(),
    }
}
