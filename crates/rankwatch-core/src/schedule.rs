use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Settings key under which the interval is persisted.
pub const CRAWL_INTERVAL_SETTING: &str = "crawl_interval";

/// Recurring crawl cadence in whole hours, always within
/// [`CrawlInterval::MIN_HOURS`]..=[`CrawlInterval::MAX_HOURS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct CrawlInterval(u32);

impl CrawlInterval {
    pub const MIN_HOURS: u32 = 1;
    pub const MAX_HOURS: u32 = 24;
    pub const DEFAULT: CrawlInterval = CrawlInterval(2);

    /// Validates an hour count.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInterval`] when `hours` is outside 1..=24.
    pub fn new(hours: i64) -> Result<Self, CoreError> {
        match u32::try_from(hours) {
            Ok(h) if (Self::MIN_HOURS..=Self::MAX_HOURS).contains(&h) => Ok(Self(h)),
            _ => Err(CoreError::InvalidInterval {
                value: hours,
                min: Self::MIN_HOURS,
                max: Self::MAX_HOURS,
            }),
        }
    }

    /// Parses a persisted setting value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnparsableInterval`] when the text is not an
    /// integer, or [`CoreError::InvalidInterval`] when it is out of range.
    pub fn parse_setting(raw: &str) -> Result<Self, CoreError> {
        let hours = raw
            .trim()
            .parse::<i64>()
            .map_err(|_| CoreError::UnparsableInterval(raw.to_string()))?;
        Self::new(hours)
    }

    #[must_use]
    pub fn hours(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn period(self) -> Duration {
        Duration::from_secs(u64::from(self.0) * 3600)
    }
}

impl Default for CrawlInterval {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<i64> for CrawlInterval {
    type Error = CoreError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CrawlInterval> for u32 {
    fn from(value: CrawlInterval) -> Self {
        value.0
    }
}

impl std::fmt::Display for CrawlInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
