//! In-process implementation of the storage traits.
//!
//! Used by tests and local dry runs. Semantics mirror the Postgres store:
//! `upsert` keys on `asin`, `updated_at` never regresses, pruning keeps the
//! newest snapshots by `(recorded_at, id)`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::items::{HistorySnapshot, ItemRecord, NewSnapshot, Observation};
use crate::store::{ConfigStore, HistoryStore, RecordStore, StoreError};

#[derive(Debug, Default)]
struct Inner {
    records: Vec<ItemRecord>,
    history: Vec<HistorySnapshot>,
    url_lists: Vec<Vec<String>>,
    settings: HashMap<String, String>,
    next_record_id: i64,
    next_snapshot_id: i64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a record verbatim, replacing any record with the same `asin`.
    pub fn seed_record(&self, record: ItemRecord) {
        let mut inner = self.lock();
        inner.records.retain(|r| r.asin != record.asin);
        inner.next_record_id = inner.next_record_id.max(record.id);
        inner.records.push(record);
    }

    /// Advances the `updated_at` of the record at `url` to `at`, if later.
    /// Returns `false` when no record has that URL.
    pub fn touch_url(&self, url: &str, at: DateTime<Utc>) -> bool {
        let mut inner = self.lock();
        match inner
            .records
            .iter_mut()
            .find(|r| r.url.as_deref() == Some(url))
        {
            Some(record) => {
                record.updated_at = record.updated_at.max(at);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn history_for(&self, asin: &str) -> Vec<HistorySnapshot> {
        let mut rows: Vec<HistorySnapshot> = self
            .lock()
            .history
            .iter()
            .filter(|s| s.asin == asin)
            .cloned()
            .collect();
        sort_newest_first(&mut rows);
        rows
    }

    #[must_use]
    pub fn url_list_count(&self) -> usize {
        self.lock().url_lists.len()
    }
}

fn sort_newest_first(rows: &mut [HistorySnapshot]) {
    rows.sort_by(|a, b| {
        b.recorded_at
            .cmp(&a.recorded_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

impl RecordStore for MemoryStore {
    async fn get_by_urls(&self, urls: &[String]) -> Result<Vec<ItemRecord>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .records
            .iter()
            .filter(|r| r.url.as_ref().is_some_and(|u| urls.contains(u)))
            .cloned()
            .collect())
    }

    async fn get_all(&self) -> Result<Vec<ItemRecord>, StoreError> {
        Ok(self.lock().records.clone())
    }

    async fn upsert(
        &self,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> Result<ItemRecord, StoreError> {
        let mut inner = self.lock();

        if let Some(record) = inner
            .records
            .iter_mut()
            .find(|r| r.asin == observation.asin)
        {
            record.url = Some(observation.url.clone());
            record.name.clone_from(&observation.title);
            record.rank = observation.rank;
            record.price = observation.price;
            record.brand.clone_from(&observation.brand);
            record.ratings.clone_from(&observation.ratings);
            record.stars.clone_from(&observation.stars);
            record.image_url.clone_from(&observation.image_url);
            record.listing_date.clone_from(&observation.listing_date);
            record.updated_at = record.updated_at.max(now);
            return Ok(record.clone());
        }

        inner.next_record_id += 1;
        let record = ItemRecord {
            id: inner.next_record_id,
            asin: observation.asin.clone(),
            url: Some(observation.url.clone()),
            name: observation.title.clone(),
            rank: observation.rank,
            price: observation.price,
            brand: observation.brand.clone(),
            ratings: observation.ratings.clone(),
            stars: observation.stars.clone(),
            image_url: observation.image_url.clone(),
            listing_date: observation.listing_date.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.records.push(record.clone());
        Ok(record)
    }

    async fn save_last_batch_urls(&self, urls: &[String]) -> Result<(), StoreError> {
        self.lock().url_lists.push(urls.to_vec());
        Ok(())
    }

    async fn load_last_batch_urls(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().url_lists.last().cloned().unwrap_or_default())
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.records.clear();
        inner.history.clear();
        inner.url_lists.clear();
        Ok(())
    }
}

impl HistoryStore for MemoryStore {
    async fn append(&self, snapshot: &NewSnapshot) -> Result<HistorySnapshot, StoreError> {
        let mut inner = self.lock();
        inner.next_snapshot_id += 1;
        let row = HistorySnapshot {
            id: inner.next_snapshot_id,
            asin: snapshot.asin.clone(),
            rank: snapshot.rank,
            price: snapshot.price,
            recorded_at: snapshot.recorded_at,
        };
        inner.history.push(row.clone());
        Ok(row)
    }

    async fn prune_to_last(&self, asin: &str, keep: usize) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let mut rows: Vec<HistorySnapshot> = inner
            .history
            .iter()
            .filter(|s| s.asin == asin)
            .cloned()
            .collect();
        sort_newest_first(&mut rows);

        let doomed: Vec<i64> = rows.iter().skip(keep).map(|s| s.id).collect();
        inner.history.retain(|s| !doomed.contains(&s.id));
        Ok(doomed.len() as u64)
    }

    async fn recent(&self, per_key: usize) -> Result<Vec<HistorySnapshot>, StoreError> {
        let mut rows = self.lock().history.clone();
        rows.sort_by(|a, b| a.asin.cmp(&b.asin));
        let mut grouped: Vec<HistorySnapshot> = Vec::with_capacity(rows.len());
        for chunk in rows.chunk_by(|a, b| a.asin == b.asin) {
            let mut key_rows = chunk.to_vec();
            sort_newest_first(&mut key_rows);
            grouped.extend(key_rows.into_iter().take(per_key));
        }
        Ok(grouped)
    }
}

impl ConfigStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().settings.get(name).cloned())
    }

    async fn set(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.lock()
            .settings
            .insert(name.to_string(), value.to_string());
        Ok(())
    }
}
