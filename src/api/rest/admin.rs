use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::engine::scheduler::{EngineStats, TickReport};
use crate::error::AppError;
use crate::models::audit::AuditLogEntry;
use crate::state::AppState;

const DEFAULT_LOG_LIMIT: usize = 50;
const MAX_LOG_LIMIT: usize = 1_000;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/start", post(start))
        .route("/admin/stop", post(stop))
        .route("/admin/trigger", post(trigger))
        .route("/admin/stats", get(stats))
        .route("/admin/logs", get(recent_logs).delete(clear_logs))
}

#[derive(Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

async fn start(State(state): State<Arc<AppState>>) -> Json<EngineStats> {
    state.engine.start();
    Json(state.engine.stats())
}

async fn stop(State(state): State<Arc<AppState>>) -> Json<EngineStats> {
    state.engine.stop().await;
    Json(state.engine.stats())
}

async fn trigger(State(state): State<Arc<AppState>>) -> Json<TickReport> {
    Json(state.engine.trigger_now().await)
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<EngineStats> {
    Json(state.engine.stats())
}

async fn recent_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<AuditLogEntry>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    if limit == 0 || limit > MAX_LOG_LIMIT {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {MAX_LOG_LIMIT}"
        )));
    }

    Ok(Json(state.engine.recent_logs(limit)))
}

async fn clear_logs(State(state): State<Arc<AppState>>) -> StatusCode {
    state.engine.clear_logs();
    StatusCode::NO_CONTENT
}
