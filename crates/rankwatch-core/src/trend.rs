//! Rank trend signals derived from history snapshots.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::items::{HistorySnapshot, ItemRecord};

/// Snapshots retained per item after each insert.
pub const HISTORY_RETENTION: usize = 5;

/// An item is trending when its rank moved by more than this many percent.
pub const TRENDING_THRESHOLD_PERCENT: Decimal = Decimal::TEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    /// Numeric rank went down, i.e. the item improved.
    Up,
    Down,
    Stable,
    /// Fewer than two snapshots.
    New,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendSignal {
    pub trend: Trend,
    /// `round((newest - previous) / previous * 100, 2)`. Negative means the
    /// numeric rank decreased.
    pub change_percent: Option<Decimal>,
}

impl TrendSignal {
    #[must_use]
    pub fn is_trending(&self) -> bool {
        self.change_percent
            .is_some_and(|p| p.abs() > TRENDING_THRESHOLD_PERCENT)
    }
}

/// Computes the trend for one item from its snapshots, in any order.
#[must_use]
pub fn compute_trend(snapshots: &[HistorySnapshot]) -> TrendSignal {
    let mut ordered: Vec<&HistorySnapshot> = snapshots.iter().collect();
    ordered.sort_by(|a, b| {
        b.recorded_at
            .cmp(&a.recorded_at)
            .then_with(|| b.id.cmp(&a.id))
    });

    let (newest, previous) = match ordered.as_slice() {
        [newest, previous, ..] => (newest.rank, previous.rank),
        _ => {
            return TrendSignal {
                trend: Trend::New,
                change_percent: None,
            }
        }
    };

    let trend = match newest.cmp(&previous) {
        std::cmp::Ordering::Less => Trend::Up,
        std::cmp::Ordering::Greater => Trend::Down,
        std::cmp::Ordering::Equal => Trend::Stable,
    };

    TrendSignal {
        trend,
        change_percent: percent_change(newest, previous),
    }
}

fn percent_change(newest: i32, previous: i32) -> Option<Decimal> {
    let delta = Decimal::from(newest) - Decimal::from(previous);
    delta
        .checked_div(Decimal::from(previous))
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map(|p| p.round_dp(2).normalize())
}

/// Human-relative age of `then` as seen from `now`.
#[must_use]
pub fn relative_age(now: DateTime<Utc>, then: Option<DateTime<Utc>>) -> String {
    let Some(then) = then else {
        return "Never updated".to_string();
    };

    #[allow(clippy::cast_precision_loss)]
    let seconds = (now - then).num_seconds().max(0) as f64;
    let (amount, unit) = if seconds < 3_600.0 {
        ((seconds / 60.0).round(), "minutes")
    } else if seconds < 86_400.0 {
        ((seconds / 3_600.0).round(), "hours")
    } else {
        ((seconds / 86_400.0).round(), "days")
    };
    format!("{amount:.0} {unit} ago")
}

/// One row of the product listing.
#[derive(Debug, Clone, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub record: ItemRecord,
    pub last_update: String,
    pub rank_trend: Trend,
    pub rank_change_percent: Option<Decimal>,
    /// Up to [`HISTORY_RETENTION`] ranks, newest first.
    pub rank_history: Vec<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductBoard {
    pub products: Vec<ProductView>,
    pub trending: Vec<ProductView>,
}

/// Joins records with their history into the ranked listing.
///
/// Products are ordered by rank ascending (unranked last), then by name.
#[must_use]
pub fn build_board(
    records: Vec<ItemRecord>,
    history: &[HistorySnapshot],
    now: DateTime<Utc>,
) -> ProductBoard {
    let mut by_asin: HashMap<&str, Vec<HistorySnapshot>> = HashMap::new();
    for snapshot in history {
        by_asin
            .entry(snapshot.asin.as_str())
            .or_default()
            .push(snapshot.clone());
    }

    let mut products: Vec<ProductView> = records
        .into_iter()
        .map(|record| {
            let mut snapshots = by_asin.remove(record.asin.as_str()).unwrap_or_default();
            snapshots.sort_by(|a, b| {
                b.recorded_at
                    .cmp(&a.recorded_at)
                    .then_with(|| b.id.cmp(&a.id))
            });
            snapshots.truncate(HISTORY_RETENTION);

            let signal = compute_trend(&snapshots);
            ProductView {
                last_update: relative_age(now, Some(record.updated_at)),
                rank_trend: signal.trend,
                rank_change_percent: signal.change_percent,
                rank_history: snapshots.iter().map(|s| s.rank).collect(),
                record,
            }
        })
        .collect();

    products.sort_by(|a, b| {
        let rank_order = match (a.record.rank, b.record.rank) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        };
        rank_order.then_with(|| a.record.name.cmp(&b.record.name))
    });

    let trending = products
        .iter()
        .filter(|p| {
            TrendSignal {
                trend: p.rank_trend,
                change_percent: p.rank_change_percent,
            }
            .is_trending()
        })
        .cloned()
        .collect();

    ProductBoard { products, trending }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn snap(id: i64, rank: i32, recorded_at: DateTime<Utc>) -> HistorySnapshot {
        HistorySnapshot {
            id,
            asin: "B0TEST".to_string(),
            rank,
            price: None,
            recorded_at,
        }
    }

    fn record(asin: &str, name: &str, rank: Option<i32>, updated_at: DateTime<Utc>) -> ItemRecord {
        ItemRecord {
            id: 1,
            asin: asin.to_string(),
            url: Some(format!("https://example.com/dp/{asin}")),
            name: name.to_string(),
            rank,
            price: None,
            brand: None,
            ratings: None,
            stars: None,
            image_url: None,
            listing_date: None,
            created_at: updated_at,
            updated_at,
        }
    }

    #[test]
    fn improvement_from_100_to_80_is_up_and_trending() {
        let t1 = Utc::now() - Duration::hours(2);
        let t2 = t1 + Duration::hours(1);
        let signal = compute_trend(&[snap(1, 100, t1), snap(2, 80, t2)]);

        assert_eq!(signal.trend, Trend::Up);
        assert_eq!(signal.change_percent, Some(Decimal::from(-20)));
        assert!(signal.is_trending());
    }

    #[test]
    fn single_snapshot_is_new_without_percent() {
        let signal = compute_trend(&[snap(1, 100, Utc::now())]);
        assert_eq!(signal.trend, Trend::New);
        assert!(signal.change_percent.is_none());
        assert!(!signal.is_trending());
    }

    #[test]
    fn no_snapshots_is_new() {
        assert_eq!(compute_trend(&[]).trend, Trend::New);
    }

    #[test]
    fn worsening_rank_is_down_with_positive_percent() {
        let t1 = Utc::now() - Duration::hours(2);
        let signal = compute_trend(&[snap(1, 300, t1), snap(2, 330, t1 + Duration::hours(1))]);
        assert_eq!(signal.trend, Trend::Down);
        assert_eq!(signal.change_percent, Some(Decimal::from(10)));
        // exactly 10 percent does not exceed the threshold
        assert!(!signal.is_trending());
    }

    #[test]
    fn equal_ranks_are_stable() {
        let t1 = Utc::now() - Duration::hours(2);
        let signal = compute_trend(&[snap(1, 55, t1), snap(2, 55, t1 + Duration::hours(1))]);
        assert_eq!(signal.trend, Trend::Stable);
        assert_eq!(signal.change_percent, Some(Decimal::ZERO));
    }

    #[test]
    fn only_two_newest_snapshots_count_regardless_of_input_order() {
        let t = Utc::now() - Duration::hours(10);
        let signal = compute_trend(&[
            snap(3, 90, t + Duration::hours(3)),
            snap(1, 10, t),
            snap(2, 120, t + Duration::hours(2)),
        ]);
        assert_eq!(signal.trend, Trend::Up);
        assert_eq!(signal.change_percent, Some(Decimal::from(-25)));
    }

    #[test]
    fn percent_is_rounded_to_two_places() {
        let t = Utc::now() - Duration::hours(2);
        let signal = compute_trend(&[snap(1, 3, t), snap(2, 4, t + Duration::hours(1))]);
        assert_eq!(signal.change_percent, Some(Decimal::new(3333, 2)));
    }

    #[test]
    fn zero_previous_rank_has_no_percent() {
        let t = Utc::now() - Duration::hours(2);
        let signal = compute_trend(&[snap(1, 0, t), snap(2, 4, t + Duration::hours(1))]);
        assert_eq!(signal.trend, Trend::Down);
        assert!(signal.change_percent.is_none());
    }

    #[test]
    fn relative_age_buckets() {
        let now = Utc::now();
        assert_eq!(relative_age(now, None), "Never updated");
        assert_eq!(
            relative_age(now, Some(now - Duration::minutes(12))),
            "12 minutes ago"
        );
        assert_eq!(
            relative_age(now, Some(now - Duration::minutes(150))),
            "3 hours ago"
        );
        assert_eq!(
            relative_age(now, Some(now - Duration::hours(60))),
            "3 days ago"
        );
        assert_eq!(relative_age(now, Some(now + Duration::minutes(5))), "0 minutes ago");
    }

    #[test]
    fn board_orders_by_rank_then_name_with_unranked_last() {
        let now = Utc::now();
        let records = vec![
            record("C", "Charlie", None, now),
            record("B", "Bravo", Some(5), now),
            record("A", "Alpha", Some(5), now),
            record("D", "Delta", Some(1), now),
        ];
        let board = build_board(records, &[], now);
        let order: Vec<&str> = board.products.iter().map(|p| p.record.asin.as_str()).collect();
        assert_eq!(order, vec!["D", "A", "B", "C"]);
        assert!(board.trending.is_empty());
        assert!(board.products.iter().all(|p| p.rank_trend == Trend::New));
    }

    #[test]
    fn board_attaches_history_and_trending() {
        let now = Utc::now();
        let t = now - Duration::hours(5);
        let mut history = Vec::new();
        for (i, rank) in [200, 180, 160, 140, 120, 100].into_iter().enumerate() {
            let i = i64::try_from(i).unwrap();
            history.push(HistorySnapshot {
                id: i + 1,
                asin: "A".to_string(),
                rank,
                price: None,
                recorded_at: t + Duration::minutes(i),
            });
        }
        let board = build_board(vec![record("A", "Alpha", Some(100), now)], &history, now);

        let view = &board.products[0];
        assert_eq!(view.rank_history, vec![100, 120, 140, 160, 180]);
        assert_eq!(view.rank_trend, Trend::Up);
        assert_eq!(view.rank_change_percent, Some(Decimal::new(-1667, 2)));
        assert_eq!(board.trending.len(), 1);
    }

    #[test]
    fn product_view_serializes_flat() {
        let now = Utc::now();
        let board = build_board(vec![record("A", "Alpha", Some(3), now)], &[], now);
        let json = serde_json::to_value(&board.products[0]).expect("serialize");
        assert_eq!(json["asin"], "A");
        assert_eq!(json["rank_trend"], "new");
        assert!(json["rank_change_percent"].is_null());
    }
}
