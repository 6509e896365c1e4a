mod crawl;
mod ingest;
mod products;
mod settings;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use rankwatch_crawl::{CrawlEngine, ProcessSupervisor, WorkerConfig};
use rankwatch_db::PgStore;
use tracing_subscriber::EnvFilter;

use crate::crawl::CrawlCommands;
use crate::settings::IntervalCommands;

#[derive(Debug, Parser)]
#[command(name = "rankwatch-cli")]
#[command(about = "Rankwatch crawl orchestration command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Start crawls and inspect their progress
    Crawl {
        #[command(subcommand)]
        command: CrawlCommands,
    },
    /// Show the product listing with rank trends
    Products {
        /// Only show items whose rank moved by more than the trending threshold
        #[arg(long)]
        trending: bool,
    },
    /// Show or change the recurring crawl interval
    Interval {
        #[command(subcommand)]
        command: IntervalCommands,
    },
    /// Record worker observations read as JSON lines from a file or stdin
    Ingest {
        /// Path to an NDJSON file; reads stdin when omitted
        #[arg(long)]
        file: Option<std::path::PathBuf>,
    },
    /// Delete every product, saved URL list and rank snapshot
    Reset {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = rankwatch_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("rankwatch-cli: no command given; see --help");
        return Ok(());
    };

    let pool_config = rankwatch_db::PoolConfig::from_app_config(&config);
    let pool = rankwatch_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            rankwatch_db::health_check(&pool).await?;
            println!("database ok");
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let applied = rankwatch_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
        Commands::Crawl { command } => {
            let engine = build_engine(pool, &config).await?;
            crawl::run_crawl_command(&engine, &config, command).await?;
        }
        Commands::Products { trending } => {
            let engine = build_engine(pool, &config).await?;
            products::run_products(&engine, trending).await?;
        }
        Commands::Interval { command } => {
            let engine = build_engine(pool, &config).await?;
            settings::run_interval_command(&engine, command).await?;
        }
        Commands::Ingest { file } => {
            let engine = build_engine(pool, &config).await?;
            ingest::run_ingest(&engine, file.as_deref()).await?;
        }
        Commands::Reset { yes } => {
            let engine = build_engine(pool, &config).await?;
            settings::run_reset(&engine, yes).await?;
        }
    }

    Ok(())
}

/// Migrates, then wires the engine to Postgres. The recurring job is not
/// started; the CLI only runs one-shot operations.
async fn build_engine(
    pool: sqlx::PgPool,
    config: &rankwatch_core::AppConfig,
) -> anyhow::Result<CrawlEngine<PgStore>> {
    rankwatch_db::run_migrations(&pool).await?;
    let supervisor = ProcessSupervisor::new(WorkerConfig::from_app_config(config))?;
    Ok(CrawlEngine::new(Arc::new(PgStore::new(pool)), supervisor))
}
