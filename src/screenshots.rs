//! Read and delete stored screenshots.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::warn;

use crate::models::{Screenshot, TimelineDay, SCREENSHOT_COLUMNS};
use crate::sink::format_timestamp;

/// Largest page the CLI and the HTTP API hand out.
pub const MAX_PAGE: i64 = 500;

/// Inclusive `captured_at` window. Unset ends are open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapturedRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl CapturedRange {
    /// Parse optional `start` / `end` bounds as accepted by [`parse_bound`].
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        let range = Self {
            start: start.map(|s| parse_bound(s, false)).transpose()?,
            end: end.map(|s| parse_bound(s, true)).transpose()?,
        };
        if let (Some(start), Some(end)) = (range.start, range.end) {
            if start > end {
                bail!("start date must not be after end date");
            }
        }
        Ok(range)
    }

    /// The whole UTC day `date`.
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: Some(day_start(date)),
            end: Some(day_end(date)),
        }
    }
}

/// Parse an RFC 3339 timestamp, a naive `YYYY-MM-DDTHH:MM:SS` (taken as
/// UTC), or a bare `YYYY-MM-DD`. A bare date is the start of that day, or
/// its last microsecond when `end_of_day` is set.
pub fn parse_bound(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(ts.and_utc());
    }
    let date = parse_date(raw)?;
    Ok(if end_of_day {
        day_end(date)
    } else {
        day_start(date)
    })
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}': expected YYYY-MM-DD or RFC 3339", raw))
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn day_end(date: NaiveDate) -> DateTime<Utc> {
    day_start(date) + chrono::Duration::days(1) - chrono::Duration::microseconds(1)
}

/// Page bounds shared by `sctx list` and `GET /screenshots`.
pub fn validate_page(limit: i64, offset: i64) -> Result<()> {
    if !(1..=MAX_PAGE).contains(&limit) {
        bail!("limit must be between 1 and {}", MAX_PAGE);
    }
    if offset < 0 {
        bail!("offset must be >= 0");
    }
    Ok(())
}

/// Newest first, restricted to `range`.
pub async fn list_screenshots(
    pool: &SqlitePool,
    range: &CapturedRange,
    limit: i64,
    offset: i64,
) -> Result<Vec<Screenshot>> {
    let sql = format!(
        "SELECT {} FROM screenshots \
         WHERE (?1 IS NULL OR captured_at >= ?1) AND (?2 IS NULL OR captured_at <= ?2) \
         ORDER BY captured_at DESC, id DESC LIMIT ?3 OFFSET ?4",
        SCREENSHOT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(range.start.map(format_timestamp))
        .bind(range.end.map(format_timestamp))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| Screenshot::from_row(row).context("Failed to decode screenshot row"))
        .collect()
}

/// Screenshots grouped by UTC capture day, newest day first.
///
/// With `date` set, exactly one group is returned for that day, even when
/// it is empty. Otherwise the newest `limit` screenshots are grouped.
pub async fn timeline(
    pool: &SqlitePool,
    date: Option<NaiveDate>,
    limit: i64,
) -> Result<Vec<TimelineDay>> {
    let range = date.map(CapturedRange::day).unwrap_or_default();
    let shots = list_screenshots(pool, &range, limit, 0).await?;

    let mut days: Vec<TimelineDay> = match date {
        Some(date) => vec![TimelineDay::new(date)],
        None => Vec::new(),
    };
    for shot in shots {
        let day = shot.captured_at.date_naive();
        match days.last_mut() {
            Some(group) if group.date == day => group.push(shot),
            _ => {
                let mut group = TimelineDay::new(day);
                group.push(shot);
                days.push(group);
            }
        }
    }
    Ok(days)
}

pub async fn get_screenshot(pool: &SqlitePool, id: i64) -> Result<Option<Screenshot>> {
    let sql = format!("SELECT {} FROM screenshots WHERE id = ?", SCREENSHOT_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;

    row.as_ref()
        .map(Screenshot::from_row)
        .transpose()
        .context("Failed to decode screenshot row")
}

/// Delete the row and its image file. Returns `false` when no such row.
pub async fn delete_screenshot(pool: &SqlitePool, id: i64) -> Result<bool> {
    let Some(shot) = get_screenshot(pool, id).await? else {
        return Ok(false);
    };

    sqlx::query("DELETE FROM screenshots WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    remove_image_file(Path::new(&shot.filepath)).await;
    Ok(true)
}

pub async fn count_screenshots(pool: &SqlitePool) -> Result<i64> {
    count_in_range(pool, &CapturedRange::default()).await
}

pub async fn count_in_range(pool: &SqlitePool, range: &CapturedRange) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM screenshots \
         WHERE (?1 IS NULL OR captured_at >= ?1) AND (?2 IS NULL OR captured_at <= ?2)",
    )
    .bind(range.start.map(format_timestamp))
    .bind(range.end.map(format_timestamp))
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Remove an image file; a file that is already gone is not an error.
pub(crate) async fn remove_image_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove screenshot file"),
    }
}
