//! [`CrawlEngine`]: the owned facade tying scheduler, supervisor, batch slot
//! and convergence tracker to one store.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rankwatch_core::{
    build_board, ConfigStore, CrawlInterval, CrawlStore, HistoryStore, Observation, ProductBoard,
    RecordStore, CRAWL_INTERVAL_SETTING, HISTORY_RETENTION,
};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::batch::{ActiveBatch, BatchHandle, BatchReport, BatchSlot};
use crate::convergence::{ConvergenceStatus, ConvergenceTracker};
use crate::ingest::{record_observation, IngestSummary};
use crate::scheduler::{CrawlScheduler, TickFn};
use crate::supervisor::{BatchOutcome, ProcessSupervisor};
use crate::CrawlError;

/// What one scheduled firing did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No saved target set; nothing to crawl.
    NoTargets,
    /// Another batch was in flight.
    Skipped { running: Uuid },
    Started { batch_id: Uuid },
    /// The tick failed before a worker was launched.
    Failed { reason: String },
}

struct EngineInner<S> {
    store: Arc<S>,
    supervisor: ProcessSupervisor,
    slot: Arc<BatchSlot>,
    scheduler: CrawlScheduler,
    tracker: ConvergenceTracker<S>,
    last_report: Mutex<Option<BatchReport>>,
}

/// Cloneable handle to one crawl engine. All clones share state.
pub struct CrawlEngine<S> {
    inner: Arc<EngineInner<S>>,
}

impl<S> Clone for CrawlEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> std::fmt::Debug for CrawlEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlEngine")
            .field("active_batch", &self.inner.slot.current().map(|b| b.id))
            .finish_non_exhaustive()
    }
}

impl<S: CrawlStore> CrawlEngine<S> {
    #[must_use]
    pub fn new(store: Arc<S>, supervisor: ProcessSupervisor) -> Self {
        Self::build(store, supervisor, None)
    }

    /// Like [`CrawlEngine::new`] with a scaled scheduler clock: one interval
    /// hour lasts `hour`.
    #[must_use]
    pub fn with_hour_length(store: Arc<S>, supervisor: ProcessSupervisor, hour: Duration) -> Self {
        Self::build(store, supervisor, Some(hour))
    }

    fn build(store: Arc<S>, supervisor: ProcessSupervisor, hour: Option<Duration>) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<EngineInner<S>>| {
            let tick = scheduled_tick(weak.clone());
            let scheduler = match hour {
                Some(hour) => CrawlScheduler::with_hour_length(tick, hour),
                None => CrawlScheduler::new(tick),
            };
            EngineInner {
                tracker: ConvergenceTracker::new(Arc::clone(&store)),
                store,
                supervisor,
                slot: BatchSlot::new(),
                scheduler,
                last_report: Mutex::new(None),
            }
        });
        Self { inner }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    #[must_use]
    pub fn tracker(&self) -> &ConvergenceTracker<S> {
        &self.inner.tracker
    }

    /// Restores the persisted interval and installs the recurring job.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Store`] if the setting cannot be read, or
    /// [`CrawlError::Scheduler`] if the job cannot be installed.
    pub async fn start(&self) -> Result<CrawlInterval, CrawlError> {
        let interval = self.load_interval().await?;
        self.inner.scheduler.start(interval).await?;
        tracing::info!(interval_hours = interval.hours(), "scheduler: crawl engine started");
        Ok(interval)
    }

    /// Stops the recurring job. A running worker is left to finish.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Scheduler`] if the scheduler fails to stop.
    pub async fn shutdown(&self) -> Result<(), CrawlError> {
        self.inner.scheduler.shutdown().await?;
        if let Some(batch) = self.inner.slot.current() {
            tracing::info!(
                batch_id = %batch.id,
                "scheduler: shut down while a batch is running; worker left to finish"
            );
        }
        Ok(())
    }

    async fn load_interval(&self) -> Result<CrawlInterval, CrawlError> {
        let raw = self.inner.store.get(CRAWL_INTERVAL_SETTING).await?;
        let Some(raw) = raw else {
            return Ok(CrawlInterval::default());
        };
        match CrawlInterval::parse_setting(&raw) {
            Ok(interval) => Ok(interval),
            Err(e) => {
                tracing::warn!(
                    value = %raw,
                    error = %e,
                    "scheduler: stored crawl interval is unusable; using default"
                );
                Ok(CrawlInterval::default())
            }
        }
    }

    /// The active interval, or the persisted one when not started yet.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Store`] if the persisted setting cannot be read.
    pub async fn current_interval(&self) -> Result<CrawlInterval, CrawlError> {
        match self.inner.scheduler.current().await {
            Some(interval) => Ok(interval),
            None => self.load_interval().await,
        }
    }

    /// Validates, persists and installs a new interval.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::InvalidConfig`] for hours outside 1..=24 (the
    /// previous interval stays in effect), [`CrawlError::Store`] if
    /// persisting fails, or [`CrawlError::Scheduler`] if the job swap fails.
    pub async fn reconfigure_interval(&self, hours: i64) -> Result<CrawlInterval, CrawlError> {
        let interval = CrawlInterval::new(hours)?;
        let value = interval.to_string();
        let store = Arc::clone(&self.inner.store);
        self.inner
            .scheduler
            .reconfigure(interval, async move {
                store.set(CRAWL_INTERVAL_SETTING, &value).await
            })
            .await?;
        tracing::info!(interval_hours = interval.hours(), "scheduler: crawl interval updated");
        Ok(interval)
    }

    /// Starts one batch for `urls`.
    ///
    /// # Errors
    ///
    /// - [`CrawlError::EmptyBatch`] when `urls` is empty.
    /// - [`CrawlError::BatchAlreadyRunning`] while another batch is in flight.
    /// - [`CrawlError::InterpreterNotFound`] when no interpreter qualifies; no
    ///   worker is spawned and the failure is kept as the last report.
    pub async fn start_batch(&self, urls: Vec<String>) -> Result<BatchHandle, CrawlError> {
        if urls.is_empty() {
            return Err(CrawlError::EmptyBatch);
        }

        let batch = ActiveBatch::new(urls, Utc::now());
        let permit = self.inner.slot.try_claim(batch.clone())?;

        let interpreter = match self.inner.supervisor.resolve_interpreter().await {
            Ok(interpreter) => interpreter,
            Err(e) => {
                let report =
                    BatchReport::unstarted(&batch, BatchOutcome::InterpreterNotFound, Utc::now());
                self.inner.set_last_report(report);
                drop(permit);
                return Err(e);
            }
        };

        tracing::info!(
            batch_id = %batch.id,
            url_count = batch.urls.len(),
            "scheduler: crawl batch starting"
        );

        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let task_batch = batch.clone();
        tokio::spawn(async move {
            let run = inner
                .supervisor
                .execute(&interpreter, task_batch.id, &task_batch.urls)
                .await;
            let report = BatchReport::new(&task_batch, run, Utc::now());
            inner.set_last_report(report.clone());
            drop(permit);
            // The handle may have been dropped; the report stays available
            // through `last_report`.
            let _ = tx.send(report);
        });

        Ok(BatchHandle::new(batch, rx))
    }

    /// Manual crawl: starts a batch and saves `urls` as the new target set.
    ///
    /// A failed save is logged; the batch keeps running.
    ///
    /// # Errors
    ///
    /// Same as [`CrawlEngine::start_batch`].
    pub async fn request_crawl(&self, urls: Vec<String>) -> Result<BatchHandle, CrawlError> {
        let handle = self.start_batch(urls).await?;
        if let Err(e) = self.inner.store.save_last_batch_urls(handle.urls()).await {
            tracing::warn!(
                batch_id = %handle.id(),
                error = %e,
                "scheduler: failed to save target URL set"
            );
        }
        Ok(handle)
    }

    /// The body of one scheduled firing. Never fails; problems are logged.
    pub async fn run_scheduled_tick(&self) -> TickOutcome {
        let urls = match self.inner.store.load_last_batch_urls().await {
            Ok(urls) => urls,
            Err(e) => {
                tracing::error!(error = %e, "scheduler: failed to load target URL set");
                return TickOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        if urls.is_empty() {
            tracing::info!("scheduler: no saved URLs; skipping scheduled crawl");
            return TickOutcome::NoTargets;
        }

        match self.start_batch(urls).await {
            Ok(handle) => {
                tracing::info!(batch_id = %handle.id(), "scheduler: scheduled crawl started");
                TickOutcome::Started {
                    batch_id: handle.id(),
                }
            }
            Err(CrawlError::BatchAlreadyRunning { batch_id }) => {
                tracing::info!(
                    running = %batch_id,
                    "scheduler: previous batch still running; skipping scheduled crawl"
                );
                TickOutcome::Skipped { running: batch_id }
            }
            Err(e) => {
                tracing::error!(error = %e, "scheduler: scheduled crawl failed to start");
                TickOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Per-URL completion relative to `since`.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Store`] if the record lookup fails.
    pub async fn poll_status(
        &self,
        urls: &[String],
        since: Option<DateTime<Utc>>,
    ) -> Result<ConvergenceStatus, CrawlError> {
        self.inner.tracker.status(urls, since).await
    }

    #[must_use]
    pub fn current_batch(&self) -> Option<ActiveBatch> {
        self.inner.slot.current()
    }

    #[must_use]
    pub fn last_report(&self) -> Option<BatchReport> {
        self.inner
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every record joined with its trend signals.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Store`] if records or history cannot be read.
    pub async fn product_board(&self, now: DateTime<Utc>) -> Result<ProductBoard, CrawlError> {
        let records = self.inner.store.get_all().await?;
        let history = self.inner.store.recent(HISTORY_RETENTION).await?;
        Ok(build_board(records, &history, now))
    }

    /// Records one worker observation.
    ///
    /// # Errors
    ///
    /// See [`record_observation`].
    pub async fn ingest(&self, observation: &Observation) -> Result<IngestSummary, CrawlError> {
        record_observation(self.inner.store.as_ref(), observation, Utc::now()).await
    }

    /// Deletes every record, saved URL list and history snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Store`] if the delete fails.
    pub async fn reset(&self) -> Result<(), CrawlError> {
        self.inner.store.delete_all().await?;
        tracing::warn!("scheduler: all crawl data cleared");
        Ok(())
    }
}

impl<S> EngineInner<S> {
    fn set_last_report(&self, report: BatchReport) {
        *self
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(report);
    }
}

fn scheduled_tick<S: CrawlStore>(weak: Weak<EngineInner<S>>) -> TickFn {
    Arc::new(move || {
        let weak = weak.clone();
        Box::pin(async move {
            let Some(inner) = weak.upgrade() else {
                tracing::debug!("scheduler: engine dropped; ignoring tick");
                return;
            };
            let engine = CrawlEngine { inner };
            tracing::info!("scheduler: scheduled crawl tick");
            engine.run_scheduled_tick().await;
        })
    })
}
