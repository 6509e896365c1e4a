use rankwatch_core::{CoreError, StoreError};
use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] CoreError),

    #[error("invalid interpreter version pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("a crawl batch needs at least one URL")]
    EmptyBatch,

    #[error("crawl batch {batch_id} is still running")]
    BatchAlreadyRunning { batch_id: Uuid },

    #[error("no usable interpreter found (tried: {})", tried.join(", "))]
    InterpreterNotFound { tried: Vec<String> },

    #[error("invalid observation: {0}")]
    InvalidObservation(String),

    #[error("crawl batch {0} ended without delivering a report")]
    ReportLost(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
}
