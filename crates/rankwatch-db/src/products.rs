//! Database operations for `products`.

use chrono::{DateTime, Utc};
use rankwatch_core::{ItemRecord, Observation};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

const PRODUCT_COLUMNS: &str = "id, asin, url, name, rank, price, brand, ratings, stars, \
                               image_url, listing_date, created_at, updated_at";

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub asin: String,
    pub url: Option<String>,
    pub name: String,
    pub rank: Option<i32>,
    pub price: Option<Decimal>,
    pub brand: Option<String>,
    pub ratings: Option<String>,
    pub stars: Option<String>,
    pub image_url: Option<String>,
    pub listing_date: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductRow> for ItemRecord {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            asin: row.asin,
            url: row.url,
            name: row.name,
            rank: row.rank,
            price: row.price,
            brand: row.brand,
            ratings: row.ratings,
            stars: row.stars,
            image_url: row.image_url,
            listing_date: row.listing_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Upserts a product row keyed by `asin`.
///
/// Every descriptive column is overwritten. `updated_at` advances to `now`
/// but never moves backwards if the stored value is already later. New rows
/// take `now` for both timestamps.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_product(
    pool: &PgPool,
    observation: &Observation,
    now: DateTime<Utc>,
) -> Result<ProductRow, DbError> {
    let sql = format!(
        "INSERT INTO products \
             (asin, url, name, rank, price, brand, ratings, stars, image_url, listing_date, \
              created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11) \
         ON CONFLICT (asin) DO UPDATE SET \
             url          = EXCLUDED.url, \
             name         = EXCLUDED.name, \
             rank         = EXCLUDED.rank, \
             price        = EXCLUDED.price, \
             brand        = EXCLUDED.brand, \
             ratings      = EXCLUDED.ratings, \
             stars        = EXCLUDED.stars, \
             image_url    = EXCLUDED.image_url, \
             listing_date = EXCLUDED.listing_date, \
             updated_at   = GREATEST(products.updated_at, EXCLUDED.updated_at) \
         RETURNING {PRODUCT_COLUMNS}"
    );

    let row = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(&observation.asin)
        .bind(&observation.url)
        .bind(&observation.title)
        .bind(observation.rank)
        .bind(observation.price)
        .bind(&observation.brand)
        .bind(&observation.ratings)
        .bind(&observation.stars)
        .bind(&observation.image_url)
        .bind(&observation.listing_date)
        .bind(now)
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// Returns products whose `url` is one of `urls`. Unknown URLs are absent.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_products_by_urls(pool: &PgPool, urls: &[String]) -> Result<Vec<ProductRow>, DbError> {
    if urls.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE url = ANY($1)");
    let rows = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(urls)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Returns every product, unranked rows last.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_all_products(pool: &PgPool) -> Result<Vec<ProductRow>, DbError> {
    let sql = format!(
        "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY rank ASC NULLS LAST, name ASC"
    );
    let rows = sqlx::query_as::<_, ProductRow>(&sql)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
