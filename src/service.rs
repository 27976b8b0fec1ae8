//! The read path: raw request parameters in, matching entries out.
//!
//! Used by both `GET /api/logs` and the `logsearch search` command.

use chrono::NaiveDateTime;
use serde::Deserialize;
use thiserror::Error;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{FilterSpec, SortOrder, StoredLogEntry, TIMESTAMP_FORMAT};
use crate::query::{build_predicate, MAX_KEYWORD_LEN};
use crate::store::{LogStore, SqliteLogStore};

#[derive(Debug, Error)]
pub enum QueryError {
    /// The request itself is malformed (bad timestamp, bad order/limit,
    /// oversized keyword).
    #[error("{0}")]
    Validation(String),
    /// The store could not answer.
    #[error("query failed: {0}")]
    Execution(anyhow::Error),
}

/// Search parameters as they arrive from a query string or the CLI.
///
/// Empty strings count as "not supplied".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub level: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub keyword: Option<String>,
    pub order: Option<String>,
    pub limit: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn parse_bound(name: &str, raw: &str) -> Result<NaiveDateTime, QueryError> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).map_err(|_| {
        QueryError::Validation(format!(
            "invalid {}: '{}' (expected YYYY-MM-DD HH:MM:SS)",
            name, raw
        ))
    })
}

impl SearchParams {
    /// Validates the raw inputs into a [`FilterSpec`].
    pub fn to_filter(&self) -> Result<FilterSpec, QueryError> {
        let start_time = non_empty(&self.start_time)
            .map(|s| parse_bound("start_time", s))
            .transpose()?;
        let end_time = non_empty(&self.end_time)
            .map(|s| parse_bound("end_time", s))
            .transpose()?;

        let order = match non_empty(&self.order) {
            None => None,
            Some(o) if o.eq_ignore_ascii_case("asc") => Some(SortOrder::Asc),
            Some(o) if o.eq_ignore_ascii_case("desc") => Some(SortOrder::Desc),
            Some(o) => {
                return Err(QueryError::Validation(format!(
                    "invalid order: '{}' (expected asc or desc)",
                    o
                )))
            }
        };

        let limit = match non_empty(&self.limit) {
            None => None,
            Some(l) => match l.trim().parse::<i64>() {
                Ok(n) if n > 0 => Some(n),
                _ => {
                    return Err(QueryError::Validation(format!(
                        "invalid limit: '{}' (expected a positive integer)",
                        l
                    )))
                }
            },
        };

        let keyword = non_empty(&self.keyword);
        if let Some(k) = keyword {
            if k.len() > MAX_KEYWORD_LEN {
                return Err(QueryError::Validation(format!(
                    "keyword too long: {} bytes (at most {})",
                    k.len(),
                    MAX_KEYWORD_LEN
                )));
            }
        }

        Ok(FilterSpec {
            level: non_empty(&self.level).map(str::to_string),
            start_time,
            end_time,
            keyword: keyword.map(str::to_string),
            order,
            limit,
        })
    }
}

/// Validates `params`, compiles them, and runs the query against `store`.
pub async fn search_logs(
    store: &dyn LogStore,
    params: &SearchParams,
) -> Result<Vec<StoredLogEntry>, QueryError> {
    let filter = params.to_filter()?;
    let predicate = build_predicate(&filter);
    store
        .query(&predicate)
        .await
        .map_err(QueryError::Execution)
}

/// CLI entry point: runs one search against the configured database and
/// prints the matches.
pub async fn run_search(config: &Config, params: &SearchParams) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    if let Err(e) = migrate::apply_schema(&pool).await {
        pool.close().await;
        return Err(e);
    }
    let store = SqliteLogStore::new(pool);

    let result = search_logs(&store, params).await;
    store.pool().close().await;
    let logs = result?;

    if logs.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for log in &logs {
        let e = &log.entry;
        println!(
            "{} [{}] {} - {}",
            e.timestamp.format(TIMESTAMP_FORMAT),
            e.level,
            e.source,
            e.message
        );
    }
    println!();
    println!("{} matching entries", logs.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_params_match_all() {
        let filter = SearchParams::default().to_filter().unwrap();
        assert_eq!(filter, FilterSpec::default());
    }

    #[test]
    fn test_empty_strings_treated_as_absent() {
        let params = SearchParams {
            level: Some(String::new()),
            start_time: Some(String::new()),
            keyword: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(params.to_filter().unwrap(), FilterSpec::default());
    }

    #[test]
    fn test_malformed_timestamp_is_validation_error() {
        let params = SearchParams {
            start_time: Some("2024-01-01".into()),
            ..Default::default()
        };
        match params.to_filter() {
            Err(QueryError::Validation(msg)) => assert!(msg.contains("start_time")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_order_and_limit_validated() {
        let bad_order = SearchParams {
            order: Some("sideways".into()),
            ..Default::default()
        };
        assert!(matches!(
            bad_order.to_filter(),
            Err(QueryError::Validation(_))
        ));

        let bad_limit = SearchParams {
            limit: Some("0".into()),
            ..Default::default()
        };
        assert!(matches!(
            bad_limit.to_filter(),
            Err(QueryError::Validation(_))
        ));

        let ok = SearchParams {
            order: Some("DESC".into()),
            limit: Some("25".into()),
            ..Default::default()
        };
        let filter = ok.to_filter().unwrap();
        assert_eq!(filter.order, Some(SortOrder::Desc));
        assert_eq!(filter.limit, Some(25));
    }

    #[test]
    fn test_oversized_keyword_is_validation_error() {
        let at_limit = SearchParams {
            keyword: Some("a".repeat(MAX_KEYWORD_LEN)),
            ..Default::default()
        };
        assert!(at_limit.to_filter().is_ok());

        let over = SearchParams {
            keyword: Some("a".repeat(MAX_KEYWORD_LEN + 1)),
            ..Default::default()
        };
        match over.to_filter() {
            Err(QueryError::Validation(msg)) => assert!(msg.contains("keyword")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
