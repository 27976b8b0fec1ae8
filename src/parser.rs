//! Audit log line parsing.
//!
//! Lines look like:
//!
//! ```text
//! 2024-01-01 10:00:00 [ERROR] auth - login failed
//! ```
//!
//! The source field runs up to the first `" - "`; everything after it is the
//! message, which may itself contain `" - "`.

use chrono::NaiveDateTime;
use regex::Regex;
use std::sync::LazyLock;

use crate::models::{LogEntry, TIMESTAMP_FORMAT};

static LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}) \[(\w+)\] (.*?) - (.+)$")
        .expect("line pattern is valid")
});

/// Parses one raw line. Returns `None` for anything that does not match the
/// line grammar exactly; never panics on malformed input.
pub fn parse_line(line: &str) -> Option<LogEntry> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);

    let caps = LINE_RE.captures(line)?;

    let timestamp = NaiveDateTime::parse_from_str(&caps[1], TIMESTAMP_FORMAT).ok()?;
    let message = caps[4].trim();
    if message.is_empty() {
        return None;
    }

    Some(LogEntry {
        timestamp,
        level: caps[2].to_string(),
        source: caps[3].trim().to_string(),
        message: message.to_string(),
    })
}
