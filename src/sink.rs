//! SQLite + filesystem persistence for accepted frames.
//!
//! Each accepted frame becomes a JPEG under `storage.screenshot_dir` and a
//! row in `screenshots`. After every save the oldest rows beyond
//! `storage.max_screenshots` are deleted together with their files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use screen_context_core::{
    CaptureDecision, CaptureError, Fingerprint, Frame, HashRecord, PersistenceSink, ReferenceId,
};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::screenshots::remove_image_file;

/// Suffixed names tried for one capture time before giving up.
const MAX_NAME_ATTEMPTS: u32 = 100;

pub struct SqliteSink {
    pool: SqlitePool,
    screenshot_dir: PathBuf,
    jpeg_quality: u8,
    max_screenshots: u64,
}

impl SqliteSink {
    pub fn new(pool: SqlitePool, storage: &StorageConfig) -> Self {
        Self {
            pool,
            screenshot_dir: storage.screenshot_dir.clone(),
            jpeg_quality: storage.jpeg_quality,
            max_screenshots: storage.max_screenshots,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Delete the oldest screenshots beyond `max_screenshots`.
    /// Returns how many were removed.
    pub async fn enforce_retention(&self) -> anyhow::Result<u64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM screenshots")
            .fetch_one(&self.pool)
            .await?;
        let excess = total - self.max_screenshots as i64;
        if excess <= 0 {
            return Ok(0);
        }

        let rows = sqlx::query(
            "SELECT id, filepath FROM screenshots ORDER BY captured_at ASC, id ASC LIMIT ?",
        )
        .bind(excess)
        .fetch_all(&self.pool)
        .await?;

        let mut removed = 0;
        for row in &rows {
            let id: i64 = row.get("id");
            let filepath: String = row.get("filepath");
            sqlx::query("DELETE FROM screenshots WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
            remove_image_file(std::path::Path::new(&filepath)).await;
            removed += 1;
        }

        info!(removed, limit = self.max_screenshots, "old screenshots cleaned up");
        Ok(removed)
    }

    async fn insert_row(
        &self,
        filepath: &str,
        decision: &CaptureDecision,
        file_size: usize,
        (width, height): (u32, u32),
        digest: &str,
    ) -> sqlx::Result<ReferenceId> {
        let result = sqlx::query(
            r#"
            INSERT INTO screenshots
                (filepath, captured_at, image_hash, file_size, width, height, content_sha256, nearest_distance)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(filepath)
        .bind(format_timestamp(decision.captured_at))
        .bind(decision.fingerprint.to_hex())
        .bind(file_size as i64)
        .bind(width as i64)
        .bind(height as i64)
        .bind(digest)
        .bind(decision.nearest_distance.map(i64::from))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }
}

#[async_trait]
impl PersistenceSink for SqliteSink {
    async fn store(
        &self,
        frame: Frame,
        decision: &CaptureDecision,
    ) -> Result<ReferenceId, CaptureError> {
        let dimensions = (frame.width(), frame.height());
        let quality = self.jpeg_quality;
        let jpeg = tokio::task::spawn_blocking(move || encode_jpeg(frame, quality))
            .await
            .map_err(CaptureError::persistence)??;

        tokio::fs::create_dir_all(&self.screenshot_dir)
            .await
            .map_err(|e| {
                CaptureError::persistence(format!(
                    "failed to create {}: {}",
                    self.screenshot_dir.display(),
                    e
                ))
            })?;

        let (path, mut file) = create_screenshot_file(&self.screenshot_dir, decision.captured_at)
            .await
            .map_err(|e| {
                CaptureError::persistence(format!(
                    "failed to create a screenshot file in {}: {}",
                    self.screenshot_dir.display(),
                    e
                ))
            })?;
        let written = async {
            file.write_all(&jpeg).await?;
            file.flush().await
        }
        .await;
        drop(file);
        if let Err(e) = written {
            remove_image_file(&path).await;
            return Err(CaptureError::persistence(format!(
                "failed to write {}: {}",
                path.display(),
                e
            )));
        }

        let digest = hex::encode(Sha256::digest(&jpeg));
        let filepath = path.display().to_string();

        let id = match self
            .insert_row(&filepath, decision, jpeg.len(), dimensions, &digest)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                remove_image_file(&path).await;
                return Err(CaptureError::persistence(e));
            }
        };

        debug!(reference_id = id, path = %filepath, bytes = jpeg.len(), "screenshot saved");

        if let Err(e) = self.enforce_retention().await {
            warn!(error = %e, "screenshot retention pass failed");
        }

        Ok(id)
    }
}

/// Fingerprints of the newest `limit` screenshots, oldest first, for
/// seeding the dedup gate at startup.
pub async fn recent_fingerprints(pool: &SqlitePool, limit: usize) -> anyhow::Result<Vec<HashRecord>> {
    let rows = sqlx::query(
        "SELECT id, captured_at, image_hash FROM screenshots ORDER BY captured_at DESC, id DESC LIMIT ?",
    )
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows.iter().rev() {
        let id: i64 = row.get("id");
        let hash: String = row.get("image_hash");
        let captured_at: String = row.get("captured_at");

        let fingerprint = match Fingerprint::from_hex(&hash) {
            Ok(fp) => fp,
            Err(e) => {
                warn!(reference_id = id, error = %e, "skipping stored fingerprint");
                continue;
            }
        };
        let Ok(timestamp) = DateTime::parse_from_rfc3339(&captured_at) else {
            warn!(reference_id = id, captured_at = %captured_at, "skipping row with bad timestamp");
            continue;
        };

        records.push(HashRecord::new(
            fingerprint,
            timestamp.with_timezone(&Utc),
            Some(id),
        ));
    }
    Ok(records)
}

fn encode_jpeg(frame: Frame, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let rgb = DynamicImage::ImageRgba8(frame.into_image()).to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(&rgb)
        .map_err(|e| CaptureError::persistence(format!("jpeg encoding failed: {}", e)))?;
    Ok(bytes)
}

fn file_name(captured_at: DateTime<Utc>, attempt: u32) -> String {
    let stamp = captured_at.format("%Y%m%d_%H%M%S_%6f");
    if attempt == 0 {
        format!("screenshot_{}.jpg", stamp)
    } else {
        format!("screenshot_{}_{}.jpg", stamp, attempt)
    }
}

/// Create a file that did not exist before. Frames sharing a capture time
/// get `_1`, `_2`, ... suffixes instead of overwriting each other.
async fn create_screenshot_file(
    dir: &Path,
    captured_at: DateTime<Utc>,
) -> std::io::Result<(PathBuf, File)> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let path = dir.join(file_name(captured_at, attempt));
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("{} names taken for {}", MAX_NAME_ATTEMPTS, captured_at),
    ))
}

/// RFC 3339 with fixed microsecond precision so text order is time order.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
