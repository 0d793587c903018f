use axum::{
    extract::{Path, State},
    http::{StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use validator::Validate;

use crate::error::ThrottlerError;
use crate::rate_limit_config::RateLimitSettings;
use crate::response::{ConfigResponse, HealthResponse};
use crate::throttler::Throttler;
use crate::window_counter::Counter;

/// Shared application state
pub type SharedState = Arc<Throttler>;

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub status: String,
    pub key: String,
    pub counter: Counter,
}

/// Current rate limit settings
pub async fn get_settings(State(state): State<SharedState>) -> impl IntoResponse {
    let settings = state.settings().snapshot();
    Json(ConfigResponse::current(settings.as_ref().clone()))
}

/// Replace the rate limit settings
pub async fn update_settings(
    State(state): State<SharedState>,
    Json(payload): Json<RateLimitSettings>,
) -> Result<impl IntoResponse, ThrottlerError> {
    payload.validate()?;

    state.update_settings(payload.clone());

    Ok(Json(ConfigResponse::updated(payload)))
}

/// Counter store and admission statistics
pub async fn get_stats(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.stats())
}

/// Forget the counter for a key
pub async fn reset_key(
    State(state): State<SharedState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ThrottlerError> {
    let counter = state
        .reset_key(&key)
        .ok_or_else(|| ThrottlerError::NotFound(format!("no counter for key '{}'", key)))?;

    Ok(Json(ResetResponse {
        status: "success".to_string(),
        key,
        counter,
    }))
}

/// Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    Json(HealthResponse::healthy(state.store().len()))
}

/// Readiness check endpoint
pub async fn readiness_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ready" }))
}

/// Fallback for routes this service does not serve
pub async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "not_found",
            "message": format!("No route for {}", uri.path()),
            "code": 404
        })),
    )
}
