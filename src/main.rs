//! # Screen Context CLI (`sctx`)
//!
//! Captures the screen on a schedule, drops near-duplicate frames with a
//! perceptual hash, and keeps the rest as JPEGs indexed in SQLite.
//!
//! ## Usage
//!
//! ```bash
//! sctx --config ./config/sctx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sctx init` | Create the SQLite database and run schema migrations |
//! | `sctx capture` | Capture and evaluate one frame, print the decision |
//! | `sctx run` | Capture on the configured cadence until Ctrl-C |
//! | `sctx serve` | Start the HTTP control API |
//! | `sctx list` | List stored screenshots, newest first |
//! | `sctx delete <id>` | Delete a screenshot and its file |
//! | `sctx stats` | Storage overview |

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use screen_context::{config, db, logging, migrate, screenshots, server, service, stats};

#[derive(Parser)]
#[command(
    name = "sctx",
    about = "Screen Context: scheduled screen capture with perceptual-hash deduplication",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/sctx.toml`. See `config/sctx.example.toml`.
    #[arg(long, global = true, default_value = "./config/sctx.toml")]
    config: PathBuf,

    /// Debug-level logging (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: only migrations that have not been applied yet run.
    Init,

    /// Capture one frame now and run it through the dedup gate.
    ///
    /// With warm start enabled the gate remembers screenshots stored by
    /// earlier runs, so an unchanged screen is reported as a duplicate.
    Capture,

    /// Capture on the configured cadence until interrupted.
    Run,

    /// Start the HTTP control API.
    ///
    /// Capture starts immediately when `capture.auto_start` is set;
    /// otherwise use `POST /capture/start`.
    Serve,

    /// List stored screenshots, newest first.
    List {
        /// Rows to show (1-500).
        #[arg(long, default_value_t = 20, allow_negative_numbers = true)]
        limit: i64,

        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        offset: i64,

        /// Only screenshots captured at or after this date or RFC 3339 time.
        #[arg(long)]
        start_date: Option<String>,

        /// Only screenshots captured at or before this date (inclusive of
        /// the whole day) or RFC 3339 time.
        #[arg(long)]
        end_date: Option<String>,
    },

    /// Delete a stored screenshot and its image file.
    Delete {
        /// Screenshot id, as shown by `sctx list`.
        id: i64,
    },

    /// Show storage statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Capture => {
            let svc = service::Service::open(&cfg).await?;
            let evaluation = svc
                .scheduler
                .trigger_now()
                .await
                .context("Capture failed")?;
            let decision = &evaluation.decision;
            let distance = decision
                .nearest_distance
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string());

            if decision.accepted {
                match evaluation.stored_as {
                    Some(id) => println!(
                        "accepted  id={}  hash={}  distance={}",
                        id, decision.fingerprint, distance
                    ),
                    None => println!(
                        "accepted (not saved)  hash={}  distance={}",
                        decision.fingerprint, distance
                    ),
                }
            } else {
                let matched = decision
                    .matched_reference
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "duplicate  hash={}  distance={}  matches={}",
                    decision.fingerprint, distance, matched
                );
            }
            svc.close().await;
        }
        Commands::Run => {
            let svc = service::Service::open(&cfg).await?;
            svc.scheduler.start(cfg.capture.cadence())?;
            tokio::signal::ctrl_c().await?;
            info!("interrupt received, stopping");

            let status = svc.scheduler.status();
            svc.close().await;
            println!(
                "Captured {}, skipped {} duplicates, {} failed cycles.",
                status.captures_count, status.duplicates_skipped, status.failed_cycles
            );
        }
        Commands::Serve => {
            let svc = service::Service::open(&cfg).await?;
            if cfg.capture.auto_start {
                svc.scheduler.start(cfg.capture.cadence())?;
            }
            server::run_server(&cfg.server.bind, svc.app_state(), async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
            svc.close().await;
        }
        Commands::List {
            limit,
            offset,
            start_date,
            end_date,
        } => {
            screenshots::validate_page(limit, offset)?;
            let range =
                screenshots::CapturedRange::parse(start_date.as_deref(), end_date.as_deref())?;
            let pool = db::connect(&cfg).await?;
            migrate::migrate(&pool).await?;
            let shots = screenshots::list_screenshots(&pool, &range, limit, offset).await?;
            if shots.is_empty() {
                println!("No screenshots stored.");
            } else {
                println!(
                    "{:>6}  {:<19}  {:<16}  {:>9}  {}",
                    "ID", "CAPTURED", "HASH", "SIZE", "PATH"
                );
                for s in &shots {
                    println!(
                        "{:>6}  {:<19}  {:<16}  {:>9}  {}",
                        s.id,
                        s.captured_at.format("%Y-%m-%d %H:%M:%S"),
                        s.image_hash,
                        s.file_size,
                        s.filepath
                    );
                }
            }
            pool.close().await;
        }
        Commands::Delete { id } => {
            let pool = db::connect(&cfg).await?;
            migrate::migrate(&pool).await?;
            let deleted = screenshots::delete_screenshot(&pool, id).await?;
            pool.close().await;
            if !deleted {
                anyhow::bail!("screenshot not found: {}", id);
            }
            println!("Deleted screenshot {}.", id);
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
