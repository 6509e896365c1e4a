//! Crawl command handlers for the CLI.
//!
//! `run` drives one manual batch to completion: the worker report and the
//! convergence poll race, and whichever settles first decides how the rest
//! is reported.

use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Subcommand;
use rankwatch_core::AppConfig;
use rankwatch_crawl::{
    wait_for_convergence, BatchReport, ConvergenceOutcome, ConvergenceStatus, CrawlEngine,
    PollPolicy, TickOutcome,
};
use rankwatch_db::PgStore;

/// Sub-commands available under `crawl`.
#[derive(Debug, Subcommand)]
pub enum CrawlCommands {
    /// Crawl the given product URLs now and save them as the scheduled target set
    Run {
        /// Product page URLs
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Show which of the given URLs have been refreshed
    Status {
        /// Only count records updated at or after this RFC 3339 timestamp
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// Product page URLs
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Run one scheduled tick against the saved target set
    Tick,
}

pub(crate) async fn run_crawl_command(
    engine: &CrawlEngine<PgStore>,
    config: &AppConfig,
    command: CrawlCommands,
) -> anyhow::Result<()> {
    match command {
        CrawlCommands::Run { urls } => {
            run_crawl(engine, PollPolicy::from_app_config(config), urls).await
        }
        CrawlCommands::Status { since, urls } => {
            let status = engine.poll_status(&urls, since).await?;
            for (url, item) in &status.items {
                println!("{:<8} {url}", format!("{:?}", item.state).to_lowercase());
            }
            println!("{}", format_progress(&status));
            Ok(())
        }
        CrawlCommands::Tick => run_tick(engine).await,
    }
}

/// Starts a batch for `urls` and waits for the worker and the records.
///
/// # Errors
///
/// Returns an error if the batch cannot start, polling fails, or the worker
/// does not exit successfully.
async fn run_crawl(
    engine: &CrawlEngine<PgStore>,
    policy: PollPolicy,
    urls: Vec<String>,
) -> anyhow::Result<()> {
    let urls: Vec<String> = urls
        .into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();

    let handle = engine.request_crawl(urls).await?;
    let batch_id = handle.id();
    let since = handle.started_at();
    let urls = handle.urls().to_vec();
    println!("batch {batch_id} started for {} url(s)", urls.len());

    let mut last_done = None;
    let convergence = wait_for_convergence(engine.tracker(), &urls, since, policy, |status| {
        if last_done != Some(status.done) {
            last_done = Some(status.done);
            println!("{}", format_progress(status));
        }
    });
    let report = handle.wait();
    tokio::pin!(convergence);
    tokio::pin!(report);

    tokio::select! {
        outcome = &mut convergence => {
            match outcome? {
                ConvergenceOutcome::Converged { records } => {
                    println!("all {} item(s) refreshed", records.len());
                }
                ConvergenceOutcome::TimedOut { pending } => {
                    println!("stopped waiting; {} item(s) still pending", pending.len());
                }
            }
            let report = report.await?;
            println!("{}", format_report(&report));
            ensure_success(&report)
        }
        report = &mut report => {
            let report = report?;
            println!("{}", format_report(&report));
            // Nothing updates the records once the worker is gone.
            let status = engine.poll_status(&urls, Some(since)).await?;
            println!("{}", format_progress(&status));
            for url in status.pending() {
                println!("not refreshed: {url}");
            }
            ensure_success(&report)
        }
    }
}

async fn run_tick(engine: &CrawlEngine<PgStore>) -> anyhow::Result<()> {
    match engine.run_scheduled_tick().await {
        TickOutcome::NoTargets => println!("no saved target URLs; nothing to crawl"),
        TickOutcome::Skipped { running } => println!("batch {running} is still running; skipped"),
        TickOutcome::Failed { reason } => anyhow::bail!("scheduled tick failed: {reason}"),
        TickOutcome::Started { batch_id } => {
            println!("batch {batch_id} started");
            while engine.current_batch().is_some() {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            if let Some(report) = engine.last_report() {
                println!("{}", format_report(&report));
                ensure_success(&report)?;
            }
        }
    }
    Ok(())
}

fn ensure_success(report: &BatchReport) -> anyhow::Result<()> {
    if report.outcome.is_success() {
        Ok(())
    } else {
        anyhow::bail!("batch {} failed: {}", report.batch_id, report.outcome)
    }
}

pub(crate) fn format_progress(status: &ConvergenceStatus) -> String {
    let state = if status.converged { "complete" } else { "in progress" };
    format!("{}/{} item(s) refreshed ({state})", status.done, status.total)
}

pub(crate) fn format_report(report: &BatchReport) -> String {
    let elapsed = (report.finished_at - report.started_at).num_seconds();
    let mut out = format!(
        "batch {}: {} after {elapsed}s, {}/{} item(s) reported",
        report.batch_id, report.outcome, report.items_reported, report.url_count
    );
    if !report.outcome.is_success() {
        for line in &report.stderr_tail {
            out.push_str("\n  stderr: ");
            out.push_str(line);
        }
    }
    out
}
