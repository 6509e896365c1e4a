//! Database operations for `rank_history`.

use chrono::{DateTime, Utc};
use rankwatch_core::{HistorySnapshot, NewSnapshot};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `rank_history` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RankRow {
    pub id: i64,
    pub asin: String,
    pub rank: i32,
    pub price: Option<Decimal>,
    pub recorded_at: DateTime<Utc>,
}

impl From<RankRow> for HistorySnapshot {
    fn from(row: RankRow) -> Self {
        Self {
            id: row.id,
            asin: row.asin,
            rank: row.rank,
            price: row.price,
            recorded_at: row.recorded_at,
        }
    }
}

/// Appends one snapshot.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_rank_snapshot(pool: &PgPool, snapshot: &NewSnapshot) -> Result<RankRow, DbError> {
    let row = sqlx::query_as::<_, RankRow>(
        "INSERT INTO rank_history (asin, rank, price, recorded_at) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id, asin, rank, price, recorded_at",
    )
    .bind(&snapshot.asin)
    .bind(snapshot.rank)
    .bind(snapshot.price)
    .bind(snapshot.recorded_at)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Deletes all but the `keep` newest snapshots for `asin`, ordered by
/// `(recorded_at, id)`. Returns the number of rows deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn prune_rank_history(pool: &PgPool, asin: &str, keep: i64) -> Result<u64, DbError> {
    let result = sqlx::query(
        "DELETE FROM rank_history \
         WHERE asin = $1 \
           AND id NOT IN ( \
               SELECT id FROM rank_history \
               WHERE asin = $1 \
               ORDER BY recorded_at DESC, id DESC \
               LIMIT $2)",
    )
    .bind(asin)
    .bind(keep)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Returns up to `per_asin` newest snapshots for every asin, newest first
/// within each asin.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn recent_rank_history(pool: &PgPool, per_asin: i64) -> Result<Vec<RankRow>, DbError> {
    let rows = sqlx::query_as::<_, RankRow>(
        "SELECT id, asin, rank, price, recorded_at FROM ( \
             SELECT id, asin, rank, price, recorded_at, \
                    ROW_NUMBER() OVER ( \
                        PARTITION BY asin ORDER BY recorded_at DESC, id DESC) AS rn \
             FROM rank_history) ranked \
         WHERE rn <= $1 \
         ORDER BY asin, recorded_at DESC, id DESC",
    )
    .bind(per_asin)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
