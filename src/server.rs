//! HTTP query server.
//!
//! Runs the log tailer in the background and exposes the store through a
//! small JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/logs` | Filtered log search |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `/api/logs` accepts the query parameters `level`, `start_time`,
//! `end_time` (both `YYYY-MM-DD HH:MM:SS`, inclusive), `keyword`
//! (`a and b`, `a or b`, or a plain substring), `order` (`asc`/`desc`) and
//! `limit`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": "invalid start_time: '2024-01-01' (expected YYYY-MM-DD HH:MM:SS)" }
//! ```
//!
//! Validation failures return `400`, store failures `500`.

use anyhow::Context;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::StoredLogEntry;
use crate::service::{search_logs, QueryError, SearchParams};
use crate::store::{LogStore, SqliteLogStore};
use crate::tail::LogTailer;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    store: Arc<dyn LogStore>,
}

/// Starts the tailer and the HTTP server, running until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), shutdown.clone()));

    run_server_with_shutdown(config, shutdown).await
}

/// Cancels `shutdown` once `signal` fires. A signal that cannot be
/// installed is logged and leaves the server running.
async fn cancel_on_signal<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("shutdown requested");
            shutdown.cancel();
        }
        Err(e) => error!(error = %e, "failed to install shutdown signal handler"),
    }
}

/// Like [`run_server`], but stops when `shutdown` is cancelled.
///
/// On shutdown the HTTP listener drains in-flight requests, then the tailer
/// is stopped between ticks and the pool is closed.
pub async fn run_server_with_shutdown(
    config: &Config,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    if let Err(e) = migrate::apply_schema(&pool).await {
        pool.close().await;
        return Err(e);
    }

    let listener = match tokio::net::TcpListener::bind(&config.server.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            pool.close().await;
            return Err(e).with_context(|| format!("Failed to bind {}", config.server.bind));
        }
    };
    info!(bind = %config.server.bind, "log search server listening");

    let store: Arc<dyn LogStore> = Arc::new(SqliteLogStore::new(pool.clone()));
    let tailer = LogTailer::new(&config.tailer, store.clone()).spawn();

    // The tailer is stopped whether or not serving ended cleanly.
    let served = axum::serve(listener, router(store))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await;
    let stopped = tailer.shutdown().await;
    pool.close().await;

    served.context("HTTP server failed")?;
    stopped?;
    Ok(())
}

/// Builds the API router over `store`.
pub fn router(store: Arc<dyn LogStore>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/logs", get(handle_logs))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { store })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        let status = match &err {
            QueryError::Validation(_) => StatusCode::BAD_REQUEST,
            QueryError::Execution(e) => {
                error!(error = %e, "log query failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        AppError {
            status,
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /api/logs ============

#[derive(Serialize)]
struct LogsResponse {
    logs: Vec<StoredLogEntry>,
}

async fn handle_logs(
    State(state): State<AppState>,
    query: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<LogsResponse>, AppError> {
    let Query(params) = query.map_err(|rejection| AppError {
        status: StatusCode::BAD_REQUEST,
        message: rejection.body_text(),
    })?;
    let logs = search_logs(state.store.as_ref(), &params).await?;
    Ok(Json(LogsResponse { logs }))
}
