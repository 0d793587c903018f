use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::warn;
use validator::{Validate, ValidationError};

pub const DEFAULT_MAX_REQUESTS: u32 = 100;
pub const DEFAULT_WINDOW_SECONDS: u64 = 60;

/// Paths that are never throttled: login, API docs and health probes.
/// Always applied; configuration can only add to this set.
pub const DEFAULT_EXCLUDED_PREFIXES: &[&str] =
    &["/api/auth/", "/swagger-ui", "/api-docs", "/health", "/ready"];

/// Process-wide rate limiting settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RateLimitSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_requests")]
    #[validate(range(min = 1))]
    pub max_requests: u32,
    #[serde(default = "default_window_seconds")]
    #[validate(range(min = 1))]
    pub window_seconds: u64,
    /// Excluded in addition to [`DEFAULT_EXCLUDED_PREFIXES`]
    #[serde(default)]
    #[validate(custom(function = "validate_prefixes"))]
    pub extra_excluded_prefixes: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_max_requests() -> u32 {
    DEFAULT_MAX_REQUESTS
}

fn default_window_seconds() -> u64 {
    DEFAULT_WINDOW_SECONDS
}

fn validate_prefixes(prefixes: &Vec<String>) -> Result<(), ValidationError> {
    if prefixes.iter().all(|prefix| prefix.starts_with('/')) {
        Ok(())
    } else {
        Err(ValidationError::new("prefix_must_start_with_slash"))
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: DEFAULT_MAX_REQUESTS,
            window_seconds: DEFAULT_WINDOW_SECONDS,
            extra_excluded_prefixes: Vec::new(),
        }
    }
}

impl RateLimitSettings {
    /// Enabled settings with only the built-in exclusions
    pub fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window_seconds,
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Replace zero limits with the defaults instead of rejecting them.
    pub fn sanitized(mut self) -> Self {
        if self.max_requests == 0 {
            warn!(
                target: "gatekeeper::config",
                fallback = DEFAULT_MAX_REQUESTS,
                "max_requests must be positive, using default"
            );
            self.max_requests = DEFAULT_MAX_REQUESTS;
        }
        if self.window_seconds == 0 {
            warn!(
                target: "gatekeeper::config",
                fallback = DEFAULT_WINDOW_SECONDS,
                "window_seconds must be positive, using default"
            );
            self.window_seconds = DEFAULT_WINDOW_SECONDS;
        }
        self
    }

    /// Built-in and configured prefixes together
    pub fn excluded_prefixes(&self) -> impl Iterator<Item = &str> {
        DEFAULT_EXCLUDED_PREFIXES
            .iter()
            .copied()
            .chain(self.extra_excluded_prefixes.iter().map(String::as_str))
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_prefixes().any(|prefix| path.starts_with(prefix))
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_requests: self.max_requests,
            window_seconds: self.window_seconds,
        }
    }

    /// Decide how the admission step treats a request for `path`
    pub fn resolve(&self, path: &str) -> Resolution {
        if self.is_excluded(path) {
            Resolution::Excluded
        } else if !self.enabled {
            Resolution::Disabled
        } else {
            Resolution::Enforce(self.limits())
        }
    }
}

/// Limits applied to a single admission decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Limits {
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl Default for Limits {
    fn default() -> Self {
        RateLimitSettings::default().limits()
    }
}

/// Outcome of resolving settings against a request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Path matches a never-throttled prefix
    Excluded,
    /// Rate limiting is switched off
    Disabled,
    Enforce(Limits),
}

/// Hot-reloadable handle to the current settings.
///
/// Readers clone an `Arc` to the current snapshot, so a reload never blocks
/// in-flight decisions for longer than the pointer swap.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    current: Arc<RwLock<Arc<RateLimitSettings>>>,
}

impl SettingsHandle {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(settings.sanitized()))),
        }
    }

    /// Current snapshot. A poisoned lock falls back to the defaults.
    pub fn snapshot(&self) -> Arc<RateLimitSettings> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(_) => {
                warn!(
                    target: "gatekeeper::config",
                    "settings lock poisoned, using default rate limit settings"
                );
                Arc::new(RateLimitSettings::default())
            }
        }
    }

    pub fn resolve(&self, path: &str) -> Resolution {
        self.snapshot().resolve(path)
    }

    /// Install new settings for every subsequent request
    pub fn replace(&self, settings: RateLimitSettings) {
        let settings = Arc::new(settings.sanitized());
        match self.current.write() {
            Ok(mut guard) => *guard = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
    }
}
