//! NDJSON ingest of worker observations.
//!
//! Each non-blank line is one [`Observation`]. Malformed or rejected lines
//! are logged and skipped so one bad row does not abort the file.

use std::path::Path;

use rankwatch_core::Observation;
use rankwatch_crawl::{CrawlEngine, CrawlError};
use rankwatch_db::PgStore;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct IngestTotals {
    pub recorded: usize,
    pub snapshots: usize,
    pub skipped: usize,
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub(crate) fn parse_line(line: &str) -> Result<Option<Observation>, serde_json::Error> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed).map(Some)
}

pub(crate) async fn run_ingest(
    engine: &CrawlEngine<PgStore>,
    file: Option<&Path>,
) -> anyhow::Result<()> {
    let totals = match file {
        Some(path) => {
            let handle = tokio::fs::File::open(path).await?;
            ingest_from(engine, handle).await?
        }
        None => ingest_from(engine, tokio::io::stdin()).await?,
    };

    println!(
        "recorded {} observation(s), {} rank snapshot(s), skipped {}",
        totals.recorded, totals.snapshots, totals.skipped
    );
    Ok(())
}

async fn ingest_from<R>(engine: &CrawlEngine<PgStore>, reader: R) -> anyhow::Result<IngestTotals>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut totals = IngestTotals::default();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let observation = match parse_line(&line) {
            Ok(Some(observation)) => observation,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "ingest: skipping malformed line");
                totals.skipped += 1;
                continue;
            }
        };

        match engine.ingest(&observation).await {
            Ok(summary) => {
                totals.recorded += 1;
                if summary.snapshot.is_some() {
                    totals.snapshots += 1;
                }
            }
            Err(CrawlError::InvalidObservation(reason)) => {
                tracing::warn!(line = line_no, %reason, "ingest: skipping rejected observation");
                totals.skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(totals)
}
