//! Crawl orchestration: the recurring scheduler, the worker process
//! supervisor, the single-batch slot and the convergence tracker, tied
//! together by [`CrawlEngine`].

pub mod batch;
pub mod convergence;
pub mod engine;
mod error;
pub mod ingest;
pub mod interpreter;
pub mod scheduler;
pub mod supervisor;

pub use batch::{ActiveBatch, BatchHandle, BatchPermit, BatchReport, BatchSlot};
pub use convergence::{
    wait_for_convergence, ConvergenceOutcome, ConvergenceStatus, ConvergenceTracker, ItemState,
    ItemStatus, PollPolicy,
};
pub use engine::{CrawlEngine, TickOutcome};
pub use error::CrawlError;
pub use ingest::{record_observation, IngestSummary};
pub use interpreter::{InterpreterProbe, PYTHON_VERSION_PATTERN};
pub use scheduler::{CrawlScheduler, TickFn};
pub use supervisor::{
    parse_progress, BatchOutcome, ProcessSupervisor, ProgressEvent, WorkerConfig, WorkerRun,
};
