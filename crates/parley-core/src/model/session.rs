use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ParleyError, Result};

/// A row of the `sessions` table.
///
/// `start_time` is stamped by the store when the row is created; the
/// remaining fields stay `None` until the session is finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            start_time: None,
            end_time: None,
            duration_seconds: None,
            summary: None,
        }
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }

    /// Apply a finalization patch in place.
    pub fn apply_close(&mut self, close: &SessionClose) {
        self.end_time = Some(close.end_time);
        self.duration_seconds = close.duration_seconds;
        self.summary = Some(close.summary.clone());
    }
}

/// Completion fields written to a session row on disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClose {
    pub end_time: DateTime<Utc>,
    pub duration_seconds: Option<i64>,
    pub summary: String,
}

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a stored timestamp into UTC.
///
/// RFC 3339 values keep their offset and are normalized to UTC. Values
/// without any zone designator are read as UTC wall-clock time.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    // Postgres renders `timestamptz` as `2024-01-01 10:00:00+00`.
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(ParleyError::Storage(format!("unrecognized timestamp: {raw}")))
}

/// Format a timestamp the way every backend stores it.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
