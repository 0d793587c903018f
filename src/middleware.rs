use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::response::too_many_requests;
use crate::throttler::{Admission, Throttler};

/// Admission control: rejects throttled requests with a 429, forwards
/// everything else untouched.
pub async fn rate_limit_middleware(
    State(throttler): State<Arc<Throttler>>,
    request: Request,
    next: Next,
) -> Response {
    match throttler.admit(&request) {
        Admission::Rejected {
            retry_after_secs, ..
        } => too_many_requests(retry_after_secs),
        admission => {
            debug!(
                target: "gatekeeper::middleware",
                admission = ?admission,
                "Request admitted"
            );
            next.run(request).await
        }
    }
}

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    info!(
        target: "gatekeeper::middleware",
        method = %method,
        uri = %uri,
        "Incoming request"
    );

    let response = next.run(request).await;

    info!(
        target: "gatekeeper::middleware",
        method = %method,
        uri = %uri,
        status = %response.status(),
        "Request completed"
    );

    response
}
