use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use gatekeeper::clock::ManualClock;
use gatekeeper::response::RateLimitExceededBody;
use gatekeeper::window_counter::WindowCounterStore;
use gatekeeper::{
    create_admin_app, create_app, KeyResolver, Principal, RateLimitSettings, SettingsHandle,
    Throttler,
};
use http_body_util::BodyExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Barrier;
use tower::ServiceExt;

struct TestApp {
    public: Router,
    admin: Router,
    throttler: Arc<Throttler>,
    clock: Arc<ManualClock>,
}

fn test_app(settings: RateLimitSettings) -> TestApp {
    let clock = Arc::new(ManualClock::new(0));
    let throttler = Arc::new(Throttler::new(
        SettingsHandle::new(settings),
        KeyResolver::default(),
        Arc::new(WindowCounterStore::default()),
        clock.clone(),
    ));
    TestApp {
        public: create_app(Arc::clone(&throttler)),
        admin: create_admin_app(Arc::clone(&throttler)),
        throttler,
        clock,
    }
}

fn get(path: &str, client: &str) -> Request<Body> {
    let mut request = Request::builder()
        .method(Method::GET)
        .uri(path)
        .body(Body::empty())
        .unwrap();
    let addr: SocketAddr = client.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

fn put_settings(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::PUT)
        .uri("/admin/rate-limit")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete_key(key: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(format!("/admin/rate-limit/keys/{}", key))
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_worked_example_over_http() {
    let app = test_app(RateLimitSettings::new(3, 10));

    for t in 0..3 {
        app.clock.set_secs(t);
        let response = send(&app.public, get("/api/agents", "10.0.0.1:5000")).await;
        // Allowed requests reach the rest of the pipeline.
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    app.clock.set_secs(3);
    let response = send(&app.public, get("/api/agents", "10.0.0.1:5000")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "7");
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: RateLimitExceededBody = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body.status, 429);
    assert_eq!(body.message, "Rate limit exceeded. Please try again later.");
    assert_eq!(body.details, "Too many requests. Try again after 7 seconds.");

    app.clock.set_secs(11);
    let response = send(&app.public, get("/api/agents", "10.0.0.1:5000")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_exact_limit_then_deny() {
    let app = test_app(RateLimitSettings::new(5, 60));

    for _ in 0..5 {
        let response = send(&app.public, get("/api/managers", "10.0.0.2:5000")).await;
        assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
    let response = send(&app.public, get("/api/managers", "10.0.0.2:5000")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let stats = app.throttler.stats();
    assert_eq!(stats.metrics.allowed, 5);
    assert_eq!(stats.metrics.denied, 1);
}

#[tokio::test]
async fn test_clients_are_limited_independently() {
    let app = test_app(RateLimitSettings::new(2, 60));

    for _ in 0..10 {
        send(&app.public, get("/api/agents", "10.0.0.1:5000")).await;
    }

    let response = send(&app.public, get("/api/agents", "10.0.0.9:5000")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let mut authenticated = get("/api/agents", "10.0.0.1:5000");
    authenticated.extensions_mut().insert(Principal::new("manager-7"));
    let response = send(&app.public, authenticated).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_excluded_paths_are_never_throttled() {
    let app = test_app(RateLimitSettings::new(1, 60));

    for _ in 0..10_000 {
        let response = send(&app.public, get("/health", "10.0.0.1:5000")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = send(&app.public, get("/api/auth/login", "10.0.0.1:5000")).await;
    assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    assert_eq!(app.throttler.stats().metrics.denied, 0);
    assert!(app.throttler.store().is_empty());
}

#[tokio::test]
async fn test_disabled_limiter_forwards_everything() {
    let app = test_app(RateLimitSettings {
        max_requests: 1,
        ..RateLimitSettings::disabled()
    });

    for _ in 0..50 {
        let response = send(&app.public, get("/api/agents", "10.0.0.1:5000")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn test_missing_remote_address_shares_unknown_bucket() {
    let app = test_app(RateLimitSettings::new(1, 60));

    let anonymous = || {
        Request::builder()
            .uri("/api/agents")
            .body(Body::empty())
            .unwrap()
    };
    send(&app.public, anonymous()).await;
    let response = send(&app.public, anonymous()).await;

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(app.throttler.counter("ip:unknown").unwrap().count, 2);
}

#[tokio::test]
async fn test_settings_hot_reload() {
    let app = test_app(RateLimitSettings::new(1, 60));

    send(&app.public, get("/api/agents", "10.0.0.1:5000")).await;
    let response = send(&app.public, get("/api/agents", "10.0.0.1:5000")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let update = put_settings(serde_json::json!({ "max_requests": 100, "window_seconds": 60 }));
    let response = send(&app.admin, update).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["config"]["max_requests"], 100);

    let response = send(&app.public, get("/api/agents", "10.0.0.1:5000")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_settings_are_rejected() {
    let app = test_app(RateLimitSettings::new(10, 60));

    let update = put_settings(serde_json::json!({ "max_requests": 0, "window_seconds": 60 }));
    let response = send(&app.admin, update).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"], "validation_error");
    assert_eq!(app.throttler.settings().snapshot().max_requests, 10);
}

#[tokio::test]
async fn test_clearing_extra_exclusions_keeps_health_unthrottled() {
    let app = test_app(RateLimitSettings::new(100, 60));

    let update = put_settings(serde_json::json!({
        "max_requests": 1,
        "window_seconds": 60,
        "extra_excluded_prefixes": []
    }));
    let response = send(&app.admin, update).await;
    assert_eq!(response.status(), StatusCode::OK);

    for _ in 0..3 {
        let response = send(&app.public, get("/health", "10.0.0.3:5000")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(app.throttler.stats().metrics.denied, 0);
}

#[tokio::test]
async fn test_admin_routes_are_not_served_publicly() {
    let app = test_app(RateLimitSettings::new(100, 60));

    let update = put_settings(serde_json::json!({ "enabled": false }));
    let response = send(&app.public, update).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(app.throttler.settings().snapshot().enabled);

    let response = send(&app.public, get("/admin/rate-limit/stats", "10.0.0.4:5000")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The admin listener does not serve the public health endpoint either.
    let response = send(&app.admin, get("/health", "127.0.0.1:5000")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stats_and_key_reset() {
    let app = test_app(RateLimitSettings::new(1, 60));

    send(&app.public, get("/api/agents", "10.0.0.1:5000")).await;

    let response = send(&app.admin, get("/admin/rate-limit/stats", "127.0.0.1:5000")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    // Admin traffic is not counted.
    assert_eq!(body["tracked_keys"], 1);
    assert_eq!(body["metrics"]["allowed"], 1);

    let response = send(&app.admin, delete_key("ip:10.0.0.1")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app.public, get("/api/agents", "10.0.0.1:5000")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app.admin, delete_key("ip:192.0.2.1")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_burst_admits_exactly_the_limit() {
    const MAX_REQUESTS: u32 = 25;
    const BURST: usize = 2 * MAX_REQUESTS as usize;

    for run in 0..10 {
        let app = test_app(RateLimitSettings::new(MAX_REQUESTS, 60));
        let barrier = Arc::new(Barrier::new(BURST));
        let client = format!("10.1.0.{}:5000", run);

        let tasks: Vec<_> = (0..BURST)
            .map(|_| {
                let public = app.public.clone();
                let barrier = Arc::clone(&barrier);
                let client = client.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    send(&public, get("/api/agents", &client)).await.status()
                })
            })
            .collect();

        let mut denied = 0;
        for task in tasks {
            if task.await.unwrap() == StatusCode::TOO_MANY_REQUESTS {
                denied += 1;
            }
        }

        assert_eq!(denied, MAX_REQUESTS as usize, "run {}", run);
    }
}
