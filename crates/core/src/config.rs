use crate::retry::BackoffPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// How freshly-uploaded documents reach the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Wake the polling sweep; the sweep claims Pending rows itself.
    Batch,
    /// Publish an ingestion event for the event-driven consumers.
    Messaging,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub upload_dir: PathBuf,
    pub dispatch_mode: DispatchMode,
    /// Documents drained per polling sweep chunk.
    pub chunk_size: usize,
    /// Concurrent workers per chunk.
    pub worker_width: usize,
    /// Idle delay between polling sweeps.
    pub poll_interval: Duration,
    /// Redelivery delay for negatively-acknowledged messages.
    pub redelivery_delay: Duration,
    pub upload_backoff: BackoffPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            dispatch_mode: DispatchMode::Batch,
            chunk_size: 100,
            worker_width: 10,
            poll_interval: Duration::from_secs(5),
            redelivery_delay: Duration::from_secs(1),
            upload_backoff: BackoffPolicy::default(),
        }
    }
}
