use anyhow::Result;
use clap::Parser;
use gatekeeper::config::Config;
use gatekeeper::server::Server;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Admission control server. Flags override the matching environment variables.
#[derive(Debug, Parser)]
#[command(name = "gatekeeper", version, about)]
struct Cli {
    /// Address to bind (BIND_ADDR)
    #[arg(long)]
    bind_addr: Option<SocketAddr>,

    /// Address of the admin API (ADMIN_BIND_ADDR)
    #[arg(long)]
    admin_bind_addr: Option<SocketAddr>,

    /// Log level used when RUST_LOG is not set (LOG_LEVEL)
    #[arg(long)]
    log_level: Option<String>,

    /// Requests allowed per window (RATE_LIMIT_MAX_REQUESTS)
    #[arg(long)]
    max_requests: Option<u32>,

    /// Window length in seconds (RATE_LIMIT_WINDOW_SECONDS)
    #[arg(long)]
    window_seconds: Option<u64>,

    /// Turn rate limiting off (RATE_LIMIT_ENABLED=false)
    #[arg(long)]
    disable_rate_limit: bool,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(bind_addr) = self.bind_addr {
            config.bind_addr = bind_addr;
        }
        if let Some(admin_bind_addr) = self.admin_bind_addr {
            config.admin_bind_addr = admin_bind_addr;
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }
        if let Some(max_requests) = self.max_requests {
            config.rate_limit_max_requests = Some(max_requests.to_string());
        }
        if let Some(window_seconds) = self.window_seconds {
            config.rate_limit_window_seconds = Some(window_seconds.to_string());
        }
        if self.disable_rate_limit {
            config.rate_limit_enabled = Some("false".to_string());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    // Load configuration from environment
    let mut config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    cli.apply(&mut config);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("gatekeeper={},tower_http=debug", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting gatekeeper service");
    tracing::info!(
        bind_addr = %config.bind_addr,
        admin_bind_addr = %config.admin_bind_addr,
        max_tracked_keys = config.max_tracked_keys,
        sweep_interval_secs = config.sweep_interval_secs,
        "Configuration loaded"
    );

    // Create and run the server
    let server = Server::new(config)
        .map_err(|e| anyhow::anyhow!("Failed to create server: {}", e))?;

    server
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
