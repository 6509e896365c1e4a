//! Shared fixtures: fake workers are small shell scripts run through `bash`,
//! which stands in for the probed interpreter.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rankwatch_core::memory::MemoryStore;
use rankwatch_core::ItemRecord;
use rankwatch_crawl::{CrawlEngine, ProcessSupervisor, WorkerConfig};
use uuid::Uuid;

pub const BASH_VERSION_PATTERN: &str = r"version \d+\.\d+";

/// Writes `body` to a fresh script file and returns its path.
pub fn write_script(body: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("rankwatch-worker-{}.sh", Uuid::new_v4()));
    std::fs::write(&path, body).expect("write worker script");
    path
}

pub fn bash_worker(body: &str) -> WorkerConfig {
    WorkerConfig {
        project_root: std::env::temp_dir(),
        script: write_script(body),
        interpreter_candidates: vec!["bash".to_string()],
        version_pattern: BASH_VERSION_PATTERN.to_string(),
        max_captured_lines: 50,
    }
}

pub fn missing_interpreter() -> WorkerConfig {
    WorkerConfig {
        interpreter_candidates: vec!["rankwatch-no-such-interpreter".to_string()],
        ..bash_worker("exit 0\n")
    }
}

pub fn supervisor(config: WorkerConfig) -> ProcessSupervisor {
    ProcessSupervisor::new(config).expect("supervisor")
}

pub fn engine(config: WorkerConfig) -> (CrawlEngine<MemoryStore>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = CrawlEngine::new(Arc::clone(&store), supervisor(config));
    (engine, store)
}

pub fn urls(list: &[&str]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}

pub fn record(id: i64, asin: &str, url: &str, updated_at: DateTime<Utc>) -> ItemRecord {
    ItemRecord {
        id,
        asin: asin.to_string(),
        url: Some(url.to_string()),
        name: format!("Product {asin}"),
        rank: Some(100),
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
