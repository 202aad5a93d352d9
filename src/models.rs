//! Rows read back from the `screenshots` table.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// A stored screenshot as listed by the CLI and the HTTP API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Screenshot {
    pub id: i64,
    pub filepath: String,
    pub captured_at: DateTime<Utc>,
    /// Perceptual fingerprint, 16 hex characters.
    pub image_hash: String,
    pub file_size: i64,
    pub width: i64,
    pub height: i64,
    pub content_sha256: Option<String>,
    /// Distance to the nearest remembered fingerprint at capture time.
    pub nearest_distance: Option<i64>,
}

pub(crate) const SCREENSHOT_COLUMNS: &str = "id, filepath, captured_at, image_hash, file_size, \
     width, height, content_sha256, nearest_distance";

impl Screenshot {
    pub(crate) fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let captured_at: String = row.try_get("captured_at")?;
        let captured_at = DateTime::parse_from_rfc3339(&captured_at)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "captured_at".to_string(),
                source: Box::new(e),
            })?;

        Ok(Self {
            id: row.try_get("id")?,
            filepath: row.try_get("filepath")?,
            captured_at,
            image_hash: row.try_get("image_hash")?,
            file_size: row.try_get("file_size")?,
            width: row.try_get("width")?,
            height: row.try_get("height")?,
            content_sha256: row.try_get("content_sha256")?,
            nearest_distance: row.try_get("nearest_distance")?,
        })
    }
}

/// Screenshots captured on one UTC day, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineDay {
    pub date: NaiveDate,
    pub count: usize,
    pub screenshots: Vec<Screenshot>,
}

impl TimelineDay {
    pub(crate) fn new(date: NaiveDate) -> Self {
        Self {
            date,
            count: 0,
            screenshots: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, shot: Screenshot) {
        self.screenshots.push(shot);
        self.count = self.screenshots.len();
    }
}
