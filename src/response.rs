use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::rate_limit_config::RateLimitSettings;

pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please try again later.";

/// Body of a throttled (429) response
#[derive(Debug, Serialize, Deserialize)]
pub struct RateLimitExceededBody {
    pub status: u16,
    pub message: String,
    pub timestamp: String,
    pub details: String,
}

impl RateLimitExceededBody {
    pub fn new(retry_after_secs: u64) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS.as_u16(),
            message: RATE_LIMIT_MESSAGE.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            details: format!(
                "Too many requests. Try again after {} seconds.",
                retry_after_secs
            ),
        }
    }
}

/// 429 response with a `Retry-After` header and JSON body
pub fn too_many_requests(retry_after_secs: u64) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(RateLimitExceededBody::new(retry_after_secs)),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
    response
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub tracked_keys: usize,
}

impl HealthResponse {
    pub fn healthy(tracked_keys: usize) -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tracked_keys,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub message: String,
    pub config: RateLimitSettings,
}

impl ConfigResponse {
    pub fn updated(config: RateLimitSettings) -> Self {
        Self {
            message: "Configuration updated successfully".to_string(),
            config,
        }
    }

    pub fn current(config: RateLimitSettings) -> Self {
        Self {
            message: "Current configuration".to_string(),
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_too_many_requests_response() {
        let response = too_many_requests(7);

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "7");
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: RateLimitExceededBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.status, 429);
        assert_eq!(body.message, RATE_LIMIT_MESSAGE);
        assert_eq!(body.details, "Too many requests. Try again after 7 seconds.");
        assert!(chrono::DateTime::parse_from_rfc3339(&body.timestamp).is_ok());
    }
}
