use envconfig::Envconfig;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::error::ThrottlerError;
use crate::rate_limit_config::{RateLimitSettings, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_SECONDS};
use crate::sweeper::{SweepOptions, DEFAULT_RETENTION_MULTIPLE, DEFAULT_SWEEP_INTERVAL_SECS};
use crate::window_counter::DEFAULT_MAX_TRACKED_KEYS;

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Server bind address
    #[envconfig(from = "BIND_ADDR", default = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Bind address of the admin API; keep it on a private interface
    #[envconfig(from = "ADMIN_BIND_ADDR", default = "127.0.0.1:3001")]
    pub admin_bind_addr: SocketAddr,

    /// Log level used when RUST_LOG is not set
    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,

    /// Rate limit values are parsed leniently, see `rate_limit_settings`
    #[envconfig(from = "RATE_LIMIT_ENABLED")]
    pub rate_limit_enabled: Option<String>,

    #[envconfig(from = "RATE_LIMIT_MAX_REQUESTS")]
    pub rate_limit_max_requests: Option<String>,

    #[envconfig(from = "RATE_LIMIT_WINDOW_SECONDS")]
    pub rate_limit_window_seconds: Option<String>,

    /// Comma separated path prefixes excluded on top of the built-in set
    #[envconfig(from = "RATE_LIMIT_EXCLUDED_PREFIXES")]
    pub rate_limit_excluded_prefixes: Option<String>,

    /// Idle counter sweep interval in seconds
    #[envconfig(from = "RATE_LIMIT_SWEEP_INTERVAL_SECS", default = "60")]
    pub sweep_interval_secs: u64,

    /// Counters idle for this many windows are evicted
    #[envconfig(from = "RATE_LIMIT_RETENTION_MULTIPLE", default = "2")]
    pub retention_multiple: u64,

    /// Maximum number of distinct keys tracked at once
    #[envconfig(from = "RATE_LIMIT_MAX_TRACKED_KEYS", default = "100000")]
    pub max_tracked_keys: usize,

    /// Prefer X-Forwarded-For / X-Real-IP over the socket address
    #[envconfig(from = "RATE_LIMIT_TRUST_FORWARDED_HEADERS", default = "false")]
    pub trust_forwarded_headers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            admin_bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            log_level: "info".to_string(),
            rate_limit_enabled: None,
            rate_limit_max_requests: None,
            rate_limit_window_seconds: None,
            rate_limit_excluded_prefixes: None,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            retention_multiple: DEFAULT_RETENTION_MULTIPLE,
            max_tracked_keys: DEFAULT_MAX_TRACKED_KEYS,
            trust_forwarded_headers: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> crate::error::Result<Self> {
        let config = Config::init_from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the server cannot run with
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.bind_addr == self.admin_bind_addr {
            return Err(ThrottlerError::ConfigurationError(format!(
                "BIND_ADDR and ADMIN_BIND_ADDR must differ (both {})",
                self.bind_addr
            )));
        }
        Ok(())
    }

    /// Rate limit settings with defaults for anything absent or malformed
    pub fn rate_limit_settings(&self) -> RateLimitSettings {
        let extra_excluded_prefixes = match self.rate_limit_excluded_prefixes.as_deref() {
            Some(raw) => {
                let prefixes = parse_prefixes(raw);
                if prefixes.is_empty() {
                    warn!(
                        target: "gatekeeper::config",
                        value = raw,
                        "RATE_LIMIT_EXCLUDED_PREFIXES has no valid prefixes, ignoring it"
                    );
                }
                prefixes
            }
            None => Vec::new(),
        };

        RateLimitSettings {
            enabled: parse_or_default(
                "RATE_LIMIT_ENABLED",
                self.rate_limit_enabled.as_deref(),
                true,
            ),
            max_requests: parse_or_default(
                "RATE_LIMIT_MAX_REQUESTS",
                self.rate_limit_max_requests.as_deref(),
                DEFAULT_MAX_REQUESTS,
            ),
            window_seconds: parse_or_default(
                "RATE_LIMIT_WINDOW_SECONDS",
                self.rate_limit_window_seconds.as_deref(),
                DEFAULT_WINDOW_SECONDS,
            ),
            extra_excluded_prefixes,
        }
        .sanitized()
    }

    pub fn sweep_options(&self) -> SweepOptions {
        SweepOptions {
            interval: Duration::from_secs(self.sweep_interval_secs.max(1)),
            retention_multiple: self.retention_multiple.max(1),
        }
    }
}

fn parse_or_default<T>(name: &str, raw: Option<&str>, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return default;
    };
    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(
                target: "gatekeeper::config",
                variable = name,
                value = raw,
                fallback = %default,
                "Invalid rate limit setting, using default"
            );
            default
        }
    }
}

fn parse_prefixes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|prefix| prefix.starts_with('/'))
        .map(str::to_string)
        .collect()
}
