//! The single recurring crawl trigger.
//!
//! Wraps one [`JobScheduler`] holding at most one repeated job. Every state
//! transition (install, remove, persist, cache update) runs under one async
//! mutex so reconfiguration never interleaves with itself.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rankwatch_core::{CrawlInterval, StoreError};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use uuid::Uuid;

use crate::CrawlError;

/// Body run on every firing.
pub type TickFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

#[derive(Default)]
struct SchedulerState {
    jobs: Option<JobScheduler>,
    job_id: Option<Uuid>,
    interval: Option<CrawlInterval>,
}

pub struct CrawlScheduler {
    tick: TickFn,
    /// Scaled length of one interval hour; `None` means wall-clock hours.
    hour: Option<Duration>,
    state: Mutex<SchedulerState>,
    #[cfg(test)]
    fail_next_add: std::sync::atomic::AtomicBool,
}

impl std::fmt::Debug for CrawlScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlScheduler")
            .field("hour", &self.hour)
            .finish_non_exhaustive()
    }
}

impl CrawlScheduler {
    #[must_use]
    pub fn new(tick: TickFn) -> Self {
        Self::build(tick, None)
    }

    /// Scales the scheduler clock: one interval hour lasts `hour`.
    #[must_use]
    pub fn with_hour_length(tick: TickFn, hour: Duration) -> Self {
        Self::build(tick, Some(hour))
    }

    fn build(tick: TickFn, hour: Option<Duration>) -> Self {
        Self {
            tick,
            hour,
            state: Mutex::new(SchedulerState::default()),
            #[cfg(test)]
            fail_next_add: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn period(&self, interval: CrawlInterval) -> Duration {
        match self.hour {
            Some(hour) => hour * interval.hours(),
            None => interval.period(),
        }
    }

    /// Starts the underlying job scheduler (once) and installs the recurring
    /// job for `interval`, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Scheduler`] if the job scheduler cannot start or
    /// the job cannot be swapped.
    pub async fn start(&self, interval: CrawlInterval) -> Result<(), CrawlError> {
        let mut state = self.state.lock().await;
        if state.jobs.is_none() {
            let jobs = JobScheduler::new().await?;
            jobs.start().await?;
            state.jobs = Some(jobs);
            tracing::info!("scheduler: job scheduler started");
        }
        self.install_locked(&mut state, interval).await
    }

    /// Runs `persist`, then swaps the recurring job to `interval`.
    ///
    /// When the scheduler has not been started only the cached interval
    /// changes. Re-applying the installed interval keeps the running job and
    /// its phase. A running batch is never touched.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Store`] if `persist` fails (nothing else changes),
    /// or [`CrawlError::Scheduler`] if the job swap fails. After a failed swap
    /// the previous job is reinstalled when possible.
    pub async fn reconfigure<P>(&self, interval: CrawlInterval, persist: P) -> Result<(), CrawlError>
    where
        P: Future<Output = Result<(), StoreError>>,
    {
        let mut state = self.state.lock().await;
        persist.await?;
        self.install_locked(&mut state, interval).await
    }

    async fn install_locked(
        &self,
        state: &mut SchedulerState,
        interval: CrawlInterval,
    ) -> Result<(), CrawlError> {
        let Some(jobs) = state.jobs.as_ref() else {
            state.interval = Some(interval);
            return Ok(());
        };

        if state.job_id.is_some() && state.interval == Some(interval) {
            tracing::debug!(
                interval_hours = interval.hours(),
                "scheduler: interval unchanged; keeping installed job"
            );
            return Ok(());
        }

        let previous = state.interval.filter(|_| state.job_id.is_some());
        if let Some(old) = state.job_id {
            jobs.remove(&old).await?;
            state.job_id = None;
            tracing::debug!(job_id = %old, "scheduler: previous crawl job removed");
        }

        match self.add_job(jobs, interval).await {
            Ok(job_id) => {
                state.job_id = Some(job_id);
                state.interval = Some(interval);
                tracing::info!(
                    interval_hours = interval.hours(),
                    %job_id,
                    "scheduler: crawl job installed"
                );
                Ok(())
            }
            Err(e) => {
                let Some(previous) = previous else {
                    tracing::error!(
                        error = %e,
                        "scheduler: crawl job install failed; no timer is running"
                    );
                    return Err(e.into());
                };
                match self.add_job(jobs, previous).await {
                    Ok(job_id) => {
                        state.job_id = Some(job_id);
                        tracing::error!(
                            error = %e,
                            requested_hours = interval.hours(),
                            interval_hours = previous.hours(),
                            "scheduler: crawl job swap failed; previous interval reinstalled"
                        );
                    }
                    Err(restore) => {
                        tracing::error!(
                            error = %e,
                            restore_error = %restore,
                            "scheduler: crawl job swap failed; no timer is running"
                        );
                    }
                }
                Err(e.into())
            }
        }
    }

    async fn add_job(
        &self,
        jobs: &JobScheduler,
        interval: CrawlInterval,
    ) -> Result<Uuid, JobSchedulerError> {
        #[cfg(test)]
        if self
            .fail_next_add
            .swap(false, std::sync::atomic::Ordering::SeqCst)
        {
            return Err(JobSchedulerError::CantAdd);
        }

        let tick = Arc::clone(&self.tick);
        let job = Job::new_repeated_async(self.period(interval), move |_uuid, _lock| tick())?;
        jobs.add(job).await
    }

    /// The interval most recently installed or configured, if any.
    pub async fn current(&self) -> Option<CrawlInterval> {
        self.state.lock().await.interval
    }

    /// Whether a recurring job is installed.
    pub async fn is_running(&self) -> bool {
        let state = self.state.lock().await;
        state.jobs.is_some() && state.job_id.is_some()
    }

    /// Stops the job scheduler. Jobs already firing finish on their own.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Scheduler`] if the shutdown fails.
    pub async fn shutdown(&self) -> Result<(), CrawlError> {
        let mut state = self.state.lock().await;
        state.job_id = None;
        if let Some(mut jobs) = state.jobs.take() {
            jobs.shutdown().await?;
            tracing::info!("scheduler: stopped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting_tick() -> (TickFn, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let tick: TickFn = Arc::new(move || {
            let c = Arc::clone(&c);
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
            })
        });
        (tick, count)
    }

    fn interval(h: i64) -> CrawlInterval {
        CrawlInterval::new(h).unwrap()
    }

    #[tokio::test]
    async fn reconfigure_before_start_only_caches() {
        let (tick, count) = counting_tick();
        let scheduler = CrawlScheduler::new(tick);

        scheduler
            .reconfigure(interval(5), async { Ok(()) })
            .await
            .unwrap();

        assert_eq!(scheduler.current().await, Some(interval(5)));
        assert!(!scheduler.is_running().await);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_persist_changes_nothing() {
        let (tick, _count) = counting_tick();
        let scheduler = CrawlScheduler::new(tick);
        scheduler
            .reconfigure(interval(3), async { Ok(()) })
            .await
            .unwrap();

        let err = scheduler
            .reconfigure(interval(9), async {
                Err(StoreError::Malformed {
                    key: "crawl_interval".to_string(),
                    reason: "disk full".to_string(),
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlError::Store(_)));
        assert_eq!(scheduler.current().await, Some(interval(3)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn installed_job_fires_repeatedly_until_shutdown() {
        let (tick, count) = counting_tick();
        let scheduler = CrawlScheduler::with_hour_length(tick, Duration::from_secs(1));

        scheduler.start(interval(1)).await.unwrap();
        assert!(scheduler.is_running().await);

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        let fired = count.load(Ordering::SeqCst);
        assert!(fired >= 1, "expected at least one firing, got {fired}");

        scheduler.shutdown().await.unwrap();
        assert!(!scheduler.is_running().await);
        let at_shutdown = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert!(count.load(Ordering::SeqCst) <= at_shutdown + 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reconfigure_replaces_the_running_job() {
        let (tick, count) = counting_tick();
        let scheduler = CrawlScheduler::with_hour_length(tick, Duration::from_secs(1));

        scheduler.start(interval(1)).await.unwrap();
        scheduler
            .reconfigure(interval(24), async { Ok(()) })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.current().await, Some(interval(24)));
        assert!(scheduler.is_running().await);

        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reapplying_the_same_interval_keeps_the_timer_phase() {
        let (tick, count) = counting_tick();
        let scheduler = CrawlScheduler::with_hour_length(tick, Duration::from_secs(1));

        scheduler.start(interval(2)).await.unwrap();
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(1_200)).await;
            scheduler
                .reconfigure(interval(2), async { Ok(()) })
                .await
                .unwrap();
        }

        let fired = count.load(Ordering::SeqCst);
        assert!(fired >= 2, "expected the 2s job to keep firing, got {fired}");
        assert!(scheduler.is_running().await);

        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_swap_reinstalls_the_previous_interval() {
        let (tick, count) = counting_tick();
        let scheduler = CrawlScheduler::with_hour_length(tick, Duration::from_secs(1));
        scheduler.start(interval(1)).await.unwrap();

        scheduler.fail_next_add.store(true, Ordering::SeqCst);
        let err = scheduler
            .reconfigure(interval(6), async { Ok(()) })
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlError::Scheduler(_)));
        assert!(scheduler.is_running().await);
        assert_eq!(scheduler.current().await, Some(interval(1)));

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(count.load(Ordering::SeqCst) >= 1);

        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn failed_first_install_leaves_no_job() {
        let (tick, _count) = counting_tick();
        let scheduler = CrawlScheduler::new(tick);

        scheduler.fail_next_add.store(true, Ordering::SeqCst);
        let err = scheduler.start(interval(4)).await.unwrap_err();

        assert!(matches!(err, CrawlError::Scheduler(_)));
        assert!(!scheduler.is_running().await);
        scheduler.shutdown().await.unwrap();
    }
}
