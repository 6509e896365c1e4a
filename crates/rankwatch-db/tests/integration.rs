//! Offline unit tests for rankwatch-db pool configuration and row conversions.
//! These tests do not require a live database connection.

use chrono::Utc;
use rankwatch_core::{AppConfig, Environment, HistorySnapshot, ItemRecord};
use rankwatch_db::{PoolConfig, ProductRow, RankRow};
use rust_decimal::Decimal;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let app_config = AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        project_root: PathBuf::from("."),
        worker_script: PathBuf::from("python/crawl_and_update.py"),
        interpreter_candidates: vec!["python3".to_string()],
        worker_max_captured_lines: 500,
        poll_interval_ms: 500,
        poll_timeout_secs: 1800,
    };

    let pool_config = PoolConfig::from_app_config(&app_config);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn product_row_converts_to_item_record() {
    let now = Utc::now();
    let row = ProductRow {
        id: 42_i64,
        asin: "B0TEST0001".to_string(),
        url: Some("https://www.amazon.com/dp/B0TEST0001".to_string()),
        name: "Stainless Travel Mug".to_string(),
        rank: Some(118),
        price: Some(Decimal::new(2499, 2)),
        brand: Some("Acme".to_string()),
        ratings: Some("1,204 ratings".to_string()),
        stars: Some("4.6 out of 5 stars".to_string()),
        image_url: None,
        listing_date: None,
        created_at: now,
        updated_at: now,
    };

    let record = ItemRecord::from(row);
    assert_eq!(record.id, 42);
    assert_eq!(record.asin, "B0TEST0001");
    assert_eq!(record.rank, Some(118));
    assert_eq!(record.price, Some(Decimal::new(2499, 2)));
    assert_eq!(record.updated_at, now);
}

#[test]
fn rank_row_converts_to_history_snapshot() {
    let now = Utc::now();
    let row = RankRow {
        id: 9,
        asin: "B0TEST0001".to_string(),
        rank: 77,
        price: None,
        recorded_at: now,
    };

    let snapshot = HistorySnapshot::from(row);
    assert_eq!(snapshot.id, 9);
    assert_eq!(snapshot.rank, 77);
    assert_eq!(snapshot.recorded_at, now);
}
