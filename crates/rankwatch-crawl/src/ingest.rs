//! Write path for worker observations.

use chrono::{DateTime, Utc};
use rankwatch_core::{
    HistorySnapshot, HistoryStore, ItemRecord, Observation, RecordStore, HISTORY_RETENTION,
};

use crate::CrawlError;

#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub record: ItemRecord,
    /// The snapshot appended, when the observation carried a rank.
    pub snapshot: Option<HistorySnapshot>,
    /// Snapshots deleted by retention pruning.
    pub pruned: u64,
}

/// Upserts the record for `observation` and, when it carries a rank, appends
/// a history snapshot at `now` and prunes the item to the retention cap.
///
/// # Errors
///
/// Returns [`CrawlError::InvalidObservation`] for a blank `asin` or `url`,
/// or [`CrawlError::Store`] if any store call fails.
pub async fn record_observation<S>(
    store: &S,
    observation: &Observation,
    now: DateTime<Utc>,
) -> Result<IngestSummary, CrawlError>
where
    S: RecordStore + HistoryStore,
{
    if observation.asin.trim().is_empty() {
        return Err(CrawlError::InvalidObservation("asin is empty".to_string()));
    }
    if observation.url.trim().is_empty() {
        return Err(CrawlError::InvalidObservation(format!(
            "url is empty for {}",
            observation.asin
        )));
    }

    let record = store.upsert(observation, now).await?;

    let Some(new_snapshot) = observation.snapshot_at(now) else {
        tracing::debug!(asin = %observation.asin, "ingest: observation has no rank; history unchanged");
        return Ok(IngestSummary {
            record,
            snapshot: None,
            pruned: 0,
        });
    };

    let snapshot = store.append(&new_snapshot).await?;
    let pruned = store
        .prune_to_last(&observation.asin, HISTORY_RETENTION)
        .await?;

    tracing::debug!(
        asin = %observation.asin,
        rank = snapshot.rank,
        pruned,
        "ingest: observation recorded"
    );

    Ok(IngestSummary {
        record,
        snapshot: Some(snapshot),
        pruned,
    })
}
