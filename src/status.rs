//! Read-only HTTP status server: health, metrics, open rounds and stats

use crate::{
    errors::{BotError, StorageError},
    games::{GameEngine, ScopeId},
};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{future::Future, net::SocketAddr, time::Duration};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_rounds: i64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

/// Failure while serving a status request
pub struct StatusError(BotError);

impl From<BotError> for StatusError {
    fn from(e: BotError) -> Self {
        Self(e)
    }
}

impl IntoResponse for StatusError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BotError::Storage(StorageError::InvalidCursor(_)) => StatusCode::BAD_REQUEST,
            _ => {
                error!(error = %self.0, "Status request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

async fn health(State(engine): State<GameEngine>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_rounds: engine.metrics().active_rounds(),
    })
}

async fn metrics(State(engine): State<GameEngine>) -> Result<Response, StatusError> {
    let text = engine.metrics().encode()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response())
}

async fn rounds(
    State(engine): State<GameEngine>,
    Path(scope): Path<ScopeId>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>, StatusError> {
    let overview = engine.overview(scope).await;
    let limit = query.limit.unwrap_or(20).min(100);
    let (recent, next_cursor) = engine.recent_rounds(scope, query.cursor.as_deref(), limit)?;
    Ok(Json(serde_json::json!({
        "scope": scope,
        "active": overview.rounds,
        "lobbies": overview.lobbies,
        "recent": recent,
        "next_cursor": next_cursor,
    })))
}

async fn stats(State(engine): State<GameEngine>) -> Result<Json<serde_json::Value>, StatusError> {
    Ok(Json(serde_json::json!({ "games": engine.stats()? })))
}

pub fn router(engine: GameEngine) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/rounds/:scope", get(rounds))
        .route("/stats", get(stats))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(engine)
}

/// Serve until `shutdown` completes
pub async fn serve(
    engine: GameEngine,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Status server listening");
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Status server stopped");
    Ok(())
}
