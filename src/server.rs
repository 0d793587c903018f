use crate::clock::SystemClock;
use crate::config::Config;
use crate::error::Result;
use crate::handlers::{
    get_settings, get_stats, health_check, not_found, readiness_check, reset_key,
    update_settings, SharedState,
};
use crate::key_resolver::KeyResolver;
use crate::middleware::{logging_middleware, rate_limit_middleware};
use crate::rate_limit_config::SettingsHandle;
use crate::sweeper::{spawn_sweeper, SweepOptions};
use crate::throttler::Throttler;
use crate::window_counter::WindowCounterStore;
use axum::routing::{delete, get};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the public router with admission control in front of every route.
///
/// The admin API is not mounted here; see [`create_admin_app`].
pub fn create_app(state: SharedState) -> Router {
    Router::new()
        // Health and readiness endpoints
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    rate_limit_middleware,
                )),
        )
        .with_state(state)
}

/// Build the admin router for runtime settings, stats and key resets.
///
/// Served on its own listener, which should only be reachable from
/// operators.
pub fn create_admin_app(state: SharedState) -> Router {
    Router::new()
        .route("/admin/rate-limit", get(get_settings).put(update_settings))
        .route("/admin/rate-limit/stats", get(get_stats))
        .route("/admin/rate-limit/keys/:key", delete(reset_key))
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(logging_middleware)),
        )
        .with_state(state)
}

pub struct Server {
    throttler: SharedState,
    bind_addr: SocketAddr,
    admin_bind_addr: SocketAddr,
    sweep: SweepOptions,
}

impl Server {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let settings = config.rate_limit_settings();
        tracing::info!(
            enabled = settings.enabled,
            max_requests = settings.max_requests,
            window_seconds = settings.window_seconds,
            excluded_prefixes = ?settings.excluded_prefixes().collect::<Vec<_>>(),
            "Rate limit settings loaded"
        );

        let throttler = Arc::new(Throttler::new(
            SettingsHandle::new(settings),
            KeyResolver::new(config.trust_forwarded_headers),
            Arc::new(WindowCounterStore::new(config.max_tracked_keys)),
            Arc::new(SystemClock),
        ));

        Ok(Self {
            throttler,
            bind_addr: config.bind_addr,
            admin_bind_addr: config.admin_bind_addr,
            sweep: config.sweep_options(),
        })
    }

    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        let admin_listener = TcpListener::bind(self.admin_bind_addr).await?;

        tracing::info!("Gatekeeper server starting on {}", self.bind_addr);
        tracing::info!("Admin API listening on {}", self.admin_bind_addr);
        tracing::info!("Health check available at /health");

        let sweeper = spawn_sweeper(Arc::clone(&self.throttler), self.sweep);
        let app = create_app(Arc::clone(&self.throttler));
        let admin_app = create_admin_app(self.throttler);

        // Run both listeners until a shutdown signal arrives
        let public = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal());
        let admin = axum::serve(admin_listener, admin_app.into_make_service())
            .with_graceful_shutdown(shutdown_signal());

        let served = tokio::try_join!(async { public.await }, async { admin.await });

        sweeper.abort();
        served?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to install signal handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
