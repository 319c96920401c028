pub mod bus;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod extractor;
pub mod jobs;
pub mod ledger;
pub mod models;
pub mod pipeline;
pub mod propagator;
pub mod retry;
pub mod search;
pub mod stores;
pub mod traits;

#[cfg(test)]
pub(crate) mod testkit;

pub use bus::InMemoryBus;
pub use cache::SummaryCache;
pub use config::{DispatchMode, PipelineConfig};
pub use coordinator::IngestionCoordinator;
pub use error::{BusError, ExtractError, IndexError, PipelineError, Result, StoreError};
pub use extractor::{extract_content, ExtractedContent};
pub use jobs::{EventOrchestrator, PollingOrchestrator, SweepReport};
pub use ledger::StatusLedger;
pub use models::{
    Document, DocumentIndex, DocumentStatus, DocumentSummary, DocumentType, EventAction, Keyword,
    LifecycleEvent, Principal, Topic, UploadMetadata,
};
pub use pipeline::{ProcessOutcome, ProcessingPipeline};
pub use propagator::StatusPropagator;
pub use retry::{with_backoff, BackoffPolicy};
pub use search::SearchSynchronizer;
pub use stores::{InMemoryDocumentStore, InMemorySearchBackend, OpenSearchBackend};
pub use traits::{
    Acker, Delivery, DocumentStore, MessageBus, SearchBackend, SearchCriteria, StatusWriteError,
    TopicStream,
};
