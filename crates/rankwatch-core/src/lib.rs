pub mod app_config;
pub mod config;
pub mod items;
pub mod memory;
pub mod schedule;
pub mod store;
pub mod trend;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use items::{HistorySnapshot, ItemRecord, NewSnapshot, Observation};
pub use schedule::{CrawlInterval, CRAWL_INTERVAL_SETTING};
pub use store::{ConfigStore, CrawlStore, HistoryStore, RecordStore, StoreError};
pub use trend::{
    build_board, compute_trend, relative_age, ProductBoard, ProductView, Trend, TrendSignal,
    HISTORY_RETENTION, TRENDING_THRESHOLD_PERCENT,
};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("interval must be between {min} and {max} hours, got {value}")]
    InvalidInterval { value: i64, min: u32, max: u32 },

    #[error("interval setting is not a whole number of hours: {0:?}")]
    UnparsableInterval(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
