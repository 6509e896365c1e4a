//! Product listing for the CLI.

use chrono::Utc;
use rankwatch_core::{ProductView, Trend};
use rankwatch_crawl::CrawlEngine;
use rankwatch_db::PgStore;

pub(crate) async fn run_products(
    engine: &CrawlEngine<PgStore>,
    trending_only: bool,
) -> anyhow::Result<()> {
    let board = engine.product_board(Utc::now()).await?;
    let rows = if trending_only {
        &board.trending
    } else {
        &board.products
    };

    if rows.is_empty() {
        println!("no products");
        return Ok(());
    }

    println!(
        "{:>7}  {:<12}  {:<6}  {:>9}  {:<18}  NAME",
        "RANK", "ASIN", "TREND", "CHANGE", "UPDATED"
    );
    for view in rows {
        println!("{}", format_row(view));
    }
    println!(
        "{} product(s), {} trending",
        board.products.len(),
        board.trending.len()
    );
    Ok(())
}

fn trend_label(trend: Trend) -> &'static str {
    match trend {
        Trend::Up => "up",
        Trend::Down => "down",
        Trend::Stable => "stable",
        Trend::New => "new",
    }
}

pub(crate) fn format_row(view: &ProductView) -> String {
    let rank = view
        .record
        .rank
        .map_or_else(|| "-".to_string(), |r| r.to_string());
    let change = view
        .rank_change_percent
        .map_or_else(|| "-".to_string(), |p| format!("{p}%"));
    format!(
        "{rank:>7}  {:<12}  {:<6}  {change:>9}  {:<18}  {}",
        view.record.asin,
        trend_label(view.rank_trend),
        view.last_update,
        view.record.name
    )
}
