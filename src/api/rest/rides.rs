use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::matching::{Match, StatusView};
use crate::models::request::NewRideRequest;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rides", post(submit_ride))
        .route("/rides/:id/status", get(ride_status))
        .route("/matches", get(list_matches))
        .route("/matches/:id", get(get_match))
}

#[derive(Serialize)]
pub struct SubmitRideResponse {
    pub id: Uuid,
    #[serde(flatten)]
    pub status: StatusView,
}

async fn submit_ride(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewRideRequest>,
) -> Result<Json<SubmitRideResponse>, AppError> {
    let id = state.engine.submit(payload)?;

    Ok(Json(SubmitRideResponse {
        id,
        status: state.engine.status(id),
    }))
}

async fn ride_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusView>, AppError> {
    match state.engine.status(id) {
        StatusView::NotFound => Err(AppError::NotFound(format!("ride request {id} not found"))),
        view => Ok(Json(view)),
    }
}

async fn list_matches(State(state): State<Arc<AppState>>) -> Json<Vec<Match>> {
    Json(state.engine.matches())
}

async fn get_match(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Match>, AppError> {
    state
        .engine
        .get_match(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("match {id} not found")))
}
