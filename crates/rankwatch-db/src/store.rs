//! [`PgStore`]: the Postgres-backed implementation of the core store traits.

use chrono::{DateTime, Utc};
use rankwatch_core::{
    ConfigStore, HistorySnapshot, HistoryStore, ItemRecord, NewSnapshot, Observation,
    RecordStore, StoreError,
};
use sqlx::PgPool;

use crate::{
    delete_all_data, get_all_products, get_products_by_urls, get_setting, insert_rank_snapshot,
    load_latest_url_list, prune_rank_history, recent_rank_history, save_url_list, set_setting,
    upsert_product,
};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl RecordStore for PgStore {
    async fn get_by_urls(&self, urls: &[String]) -> Result<Vec<ItemRecord>, StoreError> {
        let rows = get_products_by_urls(&self.pool, urls).await?;
        Ok(rows.into_iter().map(ItemRecord::from).collect())
    }

    async fn get_all(&self) -> Result<Vec<ItemRecord>, StoreError> {
        let rows = get_all_products(&self.pool).await?;
        Ok(rows.into_iter().map(ItemRecord::from).collect())
    }

    async fn upsert(
        &self,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> Result<ItemRecord, StoreError> {
        Ok(upsert_product(&self.pool, observation, now).await?.into())
    }

    async fn save_last_batch_urls(&self, urls: &[String]) -> Result<(), StoreError> {
        Ok(save_url_list(&self.pool, urls).await?)
    }

    async fn load_last_batch_urls(&self) -> Result<Vec<String>, StoreError> {
        Ok(load_latest_url_list(&self.pool).await?)
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        Ok(delete_all_data(&self.pool).await?)
    }
}

impl HistoryStore for PgStore {
    async fn append(&self, snapshot: &NewSnapshot) -> Result<HistorySnapshot, StoreError> {
        Ok(insert_rank_snapshot(&self.pool, snapshot).await?.into())
    }

    async fn prune_to_last(&self, asin: &str, keep: usize) -> Result<u64, StoreError> {
        Ok(prune_rank_history(&self.pool, asin, limit(keep)).await?)
    }

    async fn recent(&self, per_key: usize) -> Result<Vec<HistorySnapshot>, StoreError> {
        let rows = recent_rank_history(&self.pool, limit(per_key)).await?;
        Ok(rows.into_iter().map(HistorySnapshot::from).collect())
    }
}

impl ConfigStore for PgStore {
    async fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(get_setting(&self.pool, name).await?)
    }

    async fn set(&self, name: &str, value: &str) -> Result<(), StoreError> {
        Ok(set_setting(&self.pool, name, value).await?)
    }
}
