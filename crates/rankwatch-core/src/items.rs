use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A tracked product as persisted by the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: i64,
    /// Stable marketplace identifier (ASIN). Unique across records.
    pub asin: String,
    /// Product page the worker fetched this record from.
    pub url: Option<String>,
    pub name: String,
    /// Best-seller rank; lower is better. `None` when the page showed no rank.
    pub rank: Option<i32>,
    pub price: Option<Decimal>,
    pub brand: Option<String>,
    /// Review count as displayed, e.g. `"1,204 ratings"`.
    pub ratings: Option<String>,
    /// Star rating as displayed, e.g. `"4.6 out of 5 stars"`.
    pub stars: Option<String>,
    pub image_url: Option<String>,
    /// "Date first available" text from the listing.
    pub listing_date: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Last-refreshed timestamp. Never moves backwards.
    pub updated_at: DateTime<Utc>,
}

/// One rank/price observation retained in the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub id: i64,
    pub asin: String,
    pub rank: i32,
    pub price: Option<Decimal>,
    pub recorded_at: DateTime<Utc>,
}

/// A snapshot about to be appended; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSnapshot {
    pub asin: String,
    pub rank: i32,
    pub price: Option<Decimal>,
    pub recorded_at: DateTime<Utc>,
}

/// A single worker result for one product page, as accepted by the ingest path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub asin: String,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub rank: Option<i32>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub ratings: Option<String>,
    #[serde(default)]
    pub stars: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub listing_date: Option<String>,
}

impl Observation {
    /// Returns the history snapshot this observation contributes, if it
    /// carries a rank.
    #[must_use]
    pub fn snapshot_at(&self, recorded_at: DateTime<Utc>) -> Option<NewSnapshot> {
        self.rank.map(|rank| NewSnapshot {
            asin: self.asin.clone(),
            rank,
            price: self.price,
            recorded_at,
        })
    }
}
