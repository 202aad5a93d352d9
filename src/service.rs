//! Wires configuration into a ready-to-run capture service.

use std::sync::Arc;

use anyhow::{Context, Result};
use screen_context_core::DedupGate;
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::scheduler::CaptureScheduler;
use crate::server::AppState;
use crate::sink::{recent_fingerprints, SqliteSink};
use crate::sources::build_source;
use crate::{db, migrate};

pub struct Service {
    pub pool: SqlitePool,
    pub scheduler: CaptureScheduler,
}

impl Service {
    /// Open the database (migrating it if needed), build the configured
    /// source and sink, and seed the dedup gate from stored screenshots
    /// when warm start is on.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate(&pool)
            .await
            .context("Failed to migrate database")?;

        let source = build_source(&config.capture.source)?;
        let sink = Arc::new(SqliteSink::new(pool.clone(), &config.storage));

        let mut gate = DedupGate::new(config.capture.gate_config());
        if config.capture.warm_start && config.capture.deduplicate {
            let records = recent_fingerprints(&pool, config.capture.history_capacity)
                .await
                .context("Failed to load stored fingerprints")?;
            info!(fingerprints = records.len(), "dedup history restored");
            gate.seed(records);
        }

        let scheduler = CaptureScheduler::new(source, sink, gate, config.capture.cadence());
        Ok(Self { pool, scheduler })
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            scheduler: self.scheduler.clone(),
            pool: self.pool.clone(),
        }
    }

    pub async fn close(self) {
        self.scheduler.shutdown().await;
        self.pool.close().await;
    }
}
