//! Storage overview for `sctx stats`.
//!
//! Prints how many screenshots are stored, how much disk they use and the
//! capture window they cover.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::{db, migrate};

/// Aggregates over the `screenshots` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    pub screenshots: i64,
    pub image_bytes: i64,
    pub oldest: Option<String>,
    pub newest: Option<String>,
    pub schema_version: i64,
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<StorageStats> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS total,
            COALESCE(SUM(file_size), 0) AS bytes,
            MIN(captured_at) AS oldest,
            MAX(captured_at) AS newest
        FROM screenshots
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(StorageStats {
        screenshots: row.get("total"),
        image_bytes: row.get("bytes"),
        oldest: row.get("oldest"),
        newest: row.get("newest"),
        schema_version: migrate::current_version(pool).await?,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::migrate(&pool).await?;
    let stats = collect_stats(&pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Screen Context Storage Stats");
    println!("============================");
    println!();
    println!("  Database:     {}", config.db.path.display());
    println!("  Size:         {}", format_bytes(db_size));
    println!("  Schema:       v{}", stats.schema_version);
    println!();
    println!(
        "  Screenshots:  {} / {}",
        stats.screenshots, config.storage.max_screenshots
    );
    println!("  Image data:   {}", format_bytes(stats.image_bytes.max(0) as u64));
    println!("  Directory:    {}", config.storage.screenshot_dir.display());
    println!(
        "  Oldest:       {}",
        stats.oldest.as_deref().map(format_ts).unwrap_or_else(|| "-".into())
    );
    println!(
        "  Newest:       {}",
        stats.newest.as_deref().map(format_ts).unwrap_or_else(|| "-".into())
    );
    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ts(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| raw.to_string())
}
