//! Core data models shared by the tailer, the store, and the query path.

use chrono::NaiveDateTime;
use serde::Serialize;

/// Timestamp layout used both in the source log and in API parameters/responses.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A parsed audit log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub level: String,
    pub source: String,
    pub message: String,
}

/// A [`LogEntry`] as read back from the store, with its store-assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredLogEntry {
    pub id: i64,
    #[serde(flatten)]
    pub entry: LogEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Validated filter inputs for one search request.
///
/// Every field is optional; an all-`None` filter matches every entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    pub level: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub keyword: Option<String>,
    /// Ordering by timestamp. `None` leaves row order up to the store.
    pub order: Option<SortOrder>,
    pub limit: Option<i64>,
}

mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&ts.format(super::TIMESTAMP_FORMAT))
    }
}
