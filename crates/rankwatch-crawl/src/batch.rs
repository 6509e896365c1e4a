//! The single in-flight batch slot and the handles around it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::supervisor::{BatchOutcome, WorkerRun};
use crate::CrawlError;

/// Identity of a batch while it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveBatch {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub urls: Vec<String>,
}

impl ActiveBatch {
    #[must_use]
    pub fn new(urls: Vec<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at,
            urls,
        }
    }
}

/// The terminal record of one batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub url_count: usize,
    pub outcome: BatchOutcome,
    pub items_reported: usize,
    pub stdout_tail: Vec<String>,
    pub stderr_tail: Vec<String>,
}

impl BatchReport {
    #[must_use]
    pub fn new(batch: &ActiveBatch, run: WorkerRun, finished_at: DateTime<Utc>) -> Self {
        Self {
            batch_id: batch.id,
            started_at: batch.started_at,
            finished_at,
            url_count: batch.urls.len(),
            outcome: run.outcome,
            items_reported: run.items_reported,
            stdout_tail: run.stdout_tail,
            stderr_tail: run.stderr_tail,
        }
    }

    /// A report for a batch that never reached the spawn step.
    #[must_use]
    pub fn unstarted(batch: &ActiveBatch, outcome: BatchOutcome, finished_at: DateTime<Utc>) -> Self {
        Self {
            batch_id: batch.id,
            started_at: batch.started_at,
            finished_at,
            url_count: batch.urls.len(),
            outcome,
            items_reported: 0,
            stdout_tail: Vec::new(),
            stderr_tail: Vec::new(),
        }
    }
}

/// Holds at most one [`ActiveBatch`]. Claims are atomic; a second claim
/// while occupied is rejected, never queued.
#[derive(Debug, Default)]
pub struct BatchSlot {
    active: Mutex<Option<ActiveBatch>>,
}

impl BatchSlot {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveBatch>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the slot for `batch`.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::BatchAlreadyRunning`] naming the occupying batch.
    pub fn try_claim(self: &Arc<Self>, batch: ActiveBatch) -> Result<BatchPermit, CrawlError> {
        let mut active = self.lock();
        if let Some(running) = active.as_ref() {
            return Err(CrawlError::BatchAlreadyRunning {
                batch_id: running.id,
            });
        }

        let batch_id = batch.id;
        *active = Some(batch);
        Ok(BatchPermit {
            slot: Arc::clone(self),
            batch_id,
        })
    }

    #[must_use]
    pub fn current(&self) -> Option<ActiveBatch> {
        self.lock().clone()
    }

    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.lock().is_some()
    }
}

/// Proof of slot ownership. Dropping it frees the slot.
#[derive(Debug)]
pub struct BatchPermit {
    slot: Arc<BatchSlot>,
    batch_id: Uuid,
}

impl BatchPermit {
    #[must_use]
    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }
}

impl Drop for BatchPermit {
    fn drop(&mut self) {
        let mut active = self.slot.lock();
        if active.as_ref().is_some_and(|b| b.id == self.batch_id) {
            *active = None;
        }
    }
}

/// Caller-side view of a started batch.
#[derive(Debug)]
pub struct BatchHandle {
    batch: ActiveBatch,
    report: oneshot::Receiver<BatchReport>,
}

impl BatchHandle {
    pub(crate) fn new(batch: ActiveBatch, report: oneshot::Receiver<BatchReport>) -> Self {
        Self { batch, report }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.batch.id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.batch.started_at
    }

    #[must_use]
    pub fn urls(&self) -> &[String] {
        &self.batch.urls
    }

    /// Waits for the worker to finish and returns its report.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::ReportLost`] if the batch task ended without
    /// sending a report (it panicked or the runtime shut down).
    pub async fn wait(self) -> Result<BatchReport, CrawlError> {
        let id = self.batch.id;
        self.report.await.map_err(|_| CrawlError::ReportLost(id))
    }
}
