//! Column readers and parameter conversions shared by the repositories.
//!
//! Timestamps are stored as RFC 3339 text and durations as INTEGER
//! milliseconds.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Row;

pub fn millis_param(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("{value}ms does not fit in an SQLite INTEGER"))
}

pub fn millis_column(row: &Row, column: &str) -> Result<u64> {
    let raw: i64 = row.get(column)?;
    u64::try_from(raw).map_err(|_| anyhow!("column {column} holds negative duration {raw}"))
}

pub fn optional_millis_column(row: &Row, column: &str) -> Result<Option<u64>> {
    let raw: Option<i64> = row.get(column)?;
    raw.map(|value| {
        u64::try_from(value)
            .map_err(|_| anyhow!("column {column} holds negative duration {value}"))
    })
    .transpose()
}

pub fn timestamp_column(row: &Row, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    parse_timestamp(&raw, column)
}

pub fn optional_timestamp_column(row: &Row, column: &str) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(column)?;
    raw.as_deref()
        .map(|value| parse_timestamp(value, column))
        .transpose()
}

fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .with_context(|| format!("column {column} holds invalid timestamp {raw:?}"))
}
