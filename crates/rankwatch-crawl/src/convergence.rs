//! Per-item completion of an in-flight batch.
//!
//! An item is done once its persisted record has been refreshed at or after
//! the batch start. The tracker keeps no poll state; every call re-reads the
//! store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rankwatch_core::{AppConfig, ItemRecord, RecordStore};
use serde::Serialize;
use tokio::time::Instant;

use crate::CrawlError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Done,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemStatus {
    pub state: ItemState,
    pub name: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ItemStatus {
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state == ItemState::Done
    }
}

/// Status of every requested URL, keyed by URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvergenceStatus {
    pub items: BTreeMap<String, ItemStatus>,
    pub done: usize,
    pub total: usize,
    pub converged: bool,
}

impl ConvergenceStatus {
    fn from_items(items: BTreeMap<String, ItemStatus>) -> Self {
        let done = items.values().filter(|s| s.is_done()).count();
        let total = items.len();
        Self {
            items,
            done,
            total,
            converged: done == total,
        }
    }

    #[must_use]
    pub fn pending(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|(_, s)| !s.is_done())
            .map(|(url, _)| url.clone())
            .collect()
    }
}

#[derive(Debug)]
pub struct ConvergenceTracker<S> {
    store: Arc<S>,
}

impl<S> Clone for ConvergenceTracker<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RecordStore> ConvergenceTracker<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Classifies each URL as done or pending relative to `since`.
    ///
    /// With `since` absent any existing record counts as done.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Store`] if the record lookup fails.
    pub async fn status(
        &self,
        urls: &[String],
        since: Option<DateTime<Utc>>,
    ) -> Result<ConvergenceStatus, CrawlError> {
        let records = self.store.get_by_urls(urls).await?;

        let mut latest: BTreeMap<&str, &ItemRecord> = BTreeMap::new();
        for record in &records {
            let Some(url) = record.url.as_deref() else {
                continue;
            };
            latest
                .entry(url)
                .and_modify(|existing| {
                    if record.updated_at > existing.updated_at {
                        *existing = record;
                    }
                })
                .or_insert(record);
        }

        let items = urls
            .iter()
            .map(|url| {
                let status = match latest.get(url.as_str()) {
                    Some(record) => ItemStatus {
                        state: if since.is_none_or(|t| record.updated_at >= t) {
                            ItemState::Done
                        } else {
                            ItemState::Pending
                        },
                        name: Some(record.name.clone()),
                        updated_at: Some(record.updated_at),
                    },
                    None => ItemStatus {
                        state: ItemState::Pending,
                        name: None,
                        updated_at: None,
                    },
                };
                (url.clone(), status)
            })
            .collect();

        Ok(ConvergenceStatus::from_items(items))
    }

    /// Reads the current records for `urls`.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Store`] if the lookup fails.
    pub async fn records(&self, urls: &[String]) -> Result<Vec<ItemRecord>, CrawlError> {
        Ok(self.store.get_by_urls(urls).await?)
    }
}

/// How often and how long [`wait_for_convergence`] polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl PollPolicy {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            timeout: Duration::from_secs(config.poll_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConvergenceOutcome {
    /// Every item refreshed; carries one final read of the batch's records.
    Converged { records: Vec<ItemRecord> },
    TimedOut { pending: Vec<String> },
}

/// Polls `tracker` until every URL is done or `policy.timeout` elapses.
///
/// `on_poll` sees each intermediate status, e.g. to render progress.
///
/// # Errors
///
/// Returns [`CrawlError::Store`] on the first failed poll; polling stops.
pub async fn wait_for_convergence<S, F>(
    tracker: &ConvergenceTracker<S>,
    urls: &[String],
    since: DateTime<Utc>,
    policy: PollPolicy,
    mut on_poll: F,
) -> Result<ConvergenceOutcome, CrawlError>
where
    S: RecordStore,
    F: FnMut(&ConvergenceStatus),
{
    let deadline = Instant::now() + policy.timeout;

    loop {
        let status = tracker.status(urls, Some(since)).await?;
        on_poll(&status);

        if status.converged {
            let records = tracker.records(urls).await?;
            return Ok(ConvergenceOutcome::Converged { records });
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(ConvergenceOutcome::TimedOut {
                pending: status.pending(),
            });
        }
        tokio::time::sleep(policy.interval.min(deadline - now)).await;
    }
}
