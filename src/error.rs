use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid ride request: {0}")]
    Validation(#[from] ValidationError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Rejections raised synchronously when a ride request is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("pickup location is required")]
    MissingPickup,

    #[error("dropoff location is required")]
    MissingDropoff,

    #[error("vehicle type is required")]
    MissingVehicleType,

    #[error("passenger count must be at least 1, got {0}")]
    InvalidPassengerCount(u32),

    #[error("ride request {0} is already known")]
    DuplicateId(Uuid),
}

#[derive(Debug, Clone, Error)]
pub enum DistanceError {
    #[error("location has no coordinates: {0}")]
    MissingCoordinates(String),

    #[error("distance provider failed: {0}")]
    Provider(String),
}

#[derive(Debug, Clone, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotificationError(pub String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Validation(err) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
