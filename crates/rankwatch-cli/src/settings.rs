//! Interval and reset command handlers for the CLI.

use clap::Subcommand;
use rankwatch_crawl::CrawlEngine;
use rankwatch_db::PgStore;

/// Sub-commands available under `interval`.
#[derive(Debug, Subcommand)]
pub enum IntervalCommands {
    /// Print the active crawl interval in hours
    Show,
    /// Persist a new crawl interval (1-24 hours)
    Set {
        /// Whole hours between scheduled crawls
        hours: i64,
    },
}

pub(crate) async fn run_interval_command(
    engine: &CrawlEngine<PgStore>,
    command: IntervalCommands,
) -> anyhow::Result<()> {
    match command {
        IntervalCommands::Show => {
            let interval = engine.current_interval().await?;
            println!("crawl interval: {interval} hour(s)");
        }
        IntervalCommands::Set { hours } => {
            let interval = engine.reconfigure_interval(hours).await?;
            println!("crawl interval set to {interval} hour(s)");
        }
    }
    Ok(())
}

pub(crate) async fn run_reset(engine: &CrawlEngine<PgStore>, yes: bool) -> anyhow::Result<()> {
    if !yes {
        anyhow::bail!(
            "reset deletes all products, URL lists and rank history; pass --yes to confirm"
        );
    }
    engine.reset().await?;
    println!("all crawl data cleared");
    Ok(())
}
