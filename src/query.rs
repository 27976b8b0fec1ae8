//! Filter-to-SQL translation.
//!
//! [`build_predicate`] turns a [`FilterSpec`] into a `WHERE` clause made only
//! of column names, combinators, and `?` placeholders, plus the values to bind
//! in placeholder order. User input never reaches the SQL text.
//!
//! # Keyword expressions
//!
//! | Input | Meaning |
//! |-------|---------|
//! | `login and failed` | message contains `login` AND `failed` |
//! | `login or timeout` | message contains `login` OR `timeout` |
//! | `disk full` | message contains `disk full` |
//!
//! Connectives are case-insensitive. When both appear, `and` is split first
//! and any ` or ` stays inside the resulting terms; there is no precedence
//! grammar.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{FilterSpec, SortOrder};

/// Longest accepted keyword, in bytes. Escaping at most doubles a term, which
/// keeps every LIKE pattern under SQLite's 50,000-byte pattern limit.
pub const MAX_KEYWORD_LEN: usize = 10_000;

static AND_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+and\s+").expect("and pattern is valid"));
static OR_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+or\s+").expect("or pattern is valid"));

/// A value bound to one `?` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
}

/// A compiled filter: SQL fragments plus their bound parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    /// Boolean expression for the `WHERE` clause.
    pub where_clause: String,
    /// Optional `ORDER BY ...` / `LIMIT ?` tail.
    pub tail: String,
    /// Values for every `?` in `where_clause` followed by `tail`, in order.
    pub params: Vec<SqlParam>,
}

impl Predicate {
    pub fn match_all() -> Self {
        build_predicate(&FilterSpec::default())
    }
}

/// Parsed form of a keyword expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeywordExpr {
    /// Message must contain every term.
    All(Vec<String>),
    /// Message must contain at least one term.
    Any(Vec<String>),
}

/// Splits a raw keyword string into a [`KeywordExpr`].
///
/// Returns `None` when nothing searchable is left after trimming.
pub fn parse_keyword(raw: &str) -> Option<KeywordExpr> {
    let keyword = raw.trim();
    if keyword.is_empty() {
        return None;
    }

    let lowered = keyword.to_lowercase();
    let expr = if lowered.contains(" and ") {
        KeywordExpr::All(split_terms(&AND_SPLIT, keyword))
    } else if lowered.contains(" or ") {
        KeywordExpr::Any(split_terms(&OR_SPLIT, keyword))
    } else {
        KeywordExpr::All(vec![keyword.to_string()])
    };

    if expr.terms().is_empty() {
        None
    } else {
        Some(expr)
    }
}

impl KeywordExpr {
    pub fn terms(&self) -> &[String] {
        match self {
            KeywordExpr::All(terms) | KeywordExpr::Any(terms) => terms,
        }
    }
}

fn split_terms(re: &Regex, keyword: &str) -> Vec<String> {
    re.split(keyword)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Escapes LIKE wildcards so `term` matches as a literal substring under
/// `ESCAPE '\'`.
fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

const MESSAGE_LIKE: &str = r"message LIKE ? ESCAPE '\'";

pub fn build_predicate(filter: &FilterSpec) -> Predicate {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<SqlParam> = Vec::new();

    if let Some(level) = &filter.level {
        clauses.push("level = ?".to_string());
        params.push(SqlParam::Text(level.clone()));
    }

    if let Some(start) = filter.start_time {
        clauses.push("timestamp >= ?".to_string());
        params.push(SqlParam::Int(start.and_utc().timestamp()));
    }

    if let Some(end) = filter.end_time {
        clauses.push("timestamp <= ?".to_string());
        params.push(SqlParam::Int(end.and_utc().timestamp()));
    }

    match filter.keyword.as_deref().and_then(parse_keyword) {
        Some(KeywordExpr::All(terms)) => {
            for term in terms {
                clauses.push(MESSAGE_LIKE.to_string());
                params.push(SqlParam::Text(like_pattern(&term)));
            }
        }
        Some(KeywordExpr::Any(terms)) => {
            let group = vec![MESSAGE_LIKE; terms.len()].join(" OR ");
            clauses.push(format!("({})", group));
            params.extend(terms.iter().map(|t| SqlParam::Text(like_pattern(t))));
        }
        None => {}
    }

    let where_clause = if clauses.is_empty() {
        "1=1".to_string()
    } else {
        clauses.join(" AND ")
    };

    let mut tail = String::new();
    match filter.order {
        Some(SortOrder::Asc) => tail.push_str(" ORDER BY timestamp ASC, id ASC"),
        Some(SortOrder::Desc) => tail.push_str(" ORDER BY timestamp DESC, id DESC"),
        None => {}
    }
    if let Some(limit) = filter.limit {
        tail.push_str(" LIMIT ?");
        params.push(SqlParam::Int(limit));
    }

    Predicate {
        where_clause,
        tail,
        params,
    }
}
