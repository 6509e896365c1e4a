//! Storage seams consumed by the crawl engine.
//!
//! The engine never touches SQL directly: it reads records, URL lists and
//! settings through these traits. `rankwatch-db` implements them on Postgres,
//! [`crate::memory::MemoryStore`] implements them in process.

use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::items::{HistorySnapshot, ItemRecord, NewSnapshot, Observation};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("stored value for {key} is malformed: {reason}")]
    Malformed { key: String, reason: String },
}

impl StoreError {
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(error))
    }
}

/// Item records plus the persisted "current target set" of URLs.
pub trait RecordStore: Send + Sync {
    /// Records whose `url` is one of `urls`. Unknown URLs are simply absent.
    fn get_by_urls(
        &self,
        urls: &[String],
    ) -> impl Future<Output = Result<Vec<ItemRecord>, StoreError>> + Send;

    fn get_all(&self) -> impl Future<Output = Result<Vec<ItemRecord>, StoreError>> + Send;

    /// Inserts or refreshes the record keyed by `observation.asin`, advancing
    /// its `updated_at` to `now` unless it is already later.
    fn upsert(
        &self,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<ItemRecord, StoreError>> + Send;

    fn save_last_batch_urls(
        &self,
        urls: &[String],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// The most recently saved URL list; empty when none was ever saved.
    fn load_last_batch_urls(&self) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Removes every record, saved URL list and history snapshot.
    fn delete_all(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Append-only rank history, capped per key by explicit pruning.
pub trait HistoryStore: Send + Sync {
    fn append(
        &self,
        snapshot: &NewSnapshot,
    ) -> impl Future<Output = Result<HistorySnapshot, StoreError>> + Send;

    /// Deletes all but the `keep` most recent snapshots for `asin`. Returns
    /// the number of snapshots removed.
    fn prune_to_last(
        &self,
        asin: &str,
        keep: usize,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Up to `per_key` most recent snapshots for every key, newest first
    /// within each key.
    fn recent(
        &self,
        per_key: usize,
    ) -> impl Future<Output = Result<Vec<HistorySnapshot>, StoreError>> + Send;
}

/// Named string settings.
pub trait ConfigStore: Send + Sync {
    fn get(&self, name: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    fn set(&self, name: &str, value: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Everything the crawl engine needs from storage.
pub trait CrawlStore: RecordStore + HistoryStore + ConfigStore + 'static {}

impl<T> CrawlStore for T where T: RecordStore + HistoryStore + ConfigStore + 'static {}
