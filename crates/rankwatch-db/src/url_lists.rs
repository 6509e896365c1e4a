//! Database operations for `url_lists`, plus the full data reset.

use sqlx::PgPool;

use crate::DbError;

/// Saves `urls` as the newest target set.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn save_url_list(pool: &PgPool, urls: &[String]) -> Result<(), DbError> {
    sqlx::query("INSERT INTO url_lists (urls) VALUES ($1)")
        .bind(sqlx::types::Json(urls))
        .execute(pool)
        .await?;

    Ok(())
}

/// Loads the most recently saved target set; empty when none exists.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::Malformed`]
/// if the stored JSON is not an array of strings.
pub async fn load_latest_url_list(pool: &PgPool) -> Result<Vec<String>, DbError> {
    let stored = sqlx::query_scalar::<_, serde_json::Value>(
        "SELECT urls FROM url_lists ORDER BY created_at DESC, id DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    match stored {
        None => Ok(Vec::new()),
        Some(value) => serde_json::from_value::<Vec<String>>(value)
            .map_err(|e| DbError::Malformed(format!("url_lists.urls: {e}"))),
    }
}

/// Removes every product, saved URL list and rank snapshot in one
/// transaction. Settings are kept.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any delete fails; nothing is removed then.
pub async fn delete_all_data(pool: &PgPool) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM rank_history")
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM url_lists")
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM products")
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(())
}
