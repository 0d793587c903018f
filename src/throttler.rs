use axum::http::Request;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::key_resolver::KeyResolver;
use crate::metrics::{AdmissionMetrics, MetricsSnapshot};
use crate::rate_limit_config::{RateLimitSettings, Resolution, SettingsHandle};
use crate::rate_limiter::{Decision, RateLimiter};
use crate::window_counter::{Counter, WindowCounterStore, DEFAULT_MAX_TRACKED_KEYS};

/// Per-request admission outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Path is never throttled
    Excluded,
    /// Rate limiting is switched off
    Disabled,
    Allowed { key: String },
    Rejected { key: String, retry_after_secs: u64 },
}

impl Admission {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Admission::Rejected { .. })
    }
}

/// Admission controller tying together settings, key resolution and the
/// fixed-window limiter
pub struct Throttler {
    settings: SettingsHandle,
    key_resolver: KeyResolver,
    limiter: RateLimiter,
    metrics: Arc<AdmissionMetrics>,
    clock: Arc<dyn Clock>,
}

impl Throttler {
    pub fn new(
        settings: SettingsHandle,
        key_resolver: KeyResolver,
        store: Arc<WindowCounterStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let metrics = Arc::new(AdmissionMetrics::new());
        Self {
            settings,
            key_resolver,
            limiter: RateLimiter::new(store, Arc::clone(&metrics)),
            metrics,
            clock,
        }
    }

    /// Wall-clock throttler with a default-sized store
    pub fn with_settings(settings: RateLimitSettings) -> Self {
        Self::new(
            SettingsHandle::new(settings),
            KeyResolver::default(),
            Arc::new(WindowCounterStore::new(DEFAULT_MAX_TRACKED_KEYS)),
            Arc::new(SystemClock),
        )
    }

    /// Decide whether `request` may proceed. Counts the request when the
    /// limiter applies to it.
    pub fn admit<B>(&self, request: &Request<B>) -> Admission {
        let limits = match self.settings.resolve(request.uri().path()) {
            Resolution::Excluded => {
                self.metrics.record_bypassed();
                return Admission::Excluded;
            }
            Resolution::Disabled => {
                self.metrics.record_bypassed();
                return Admission::Disabled;
            }
            Resolution::Enforce(limits) => limits,
        };

        let key = self.key_resolver.resolve(request);
        match self.limiter.decide(&key, &limits, self.clock.now_millis()) {
            Decision::Allow => Admission::Allowed { key },
            Decision::Deny { retry_after_secs } => {
                warn!(
                    target: "gatekeeper::throttler",
                    key = %key,
                    path = %request.uri().path(),
                    retry_after_secs,
                    "Rate limit exceeded"
                );
                Admission::Rejected {
                    key,
                    retry_after_secs,
                }
            }
        }
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    /// Replace the settings for all subsequent requests
    pub fn update_settings(&self, settings: RateLimitSettings) {
        debug!(
            target: "gatekeeper::throttler",
            enabled = settings.enabled,
            max_requests = settings.max_requests,
            window_seconds = settings.window_seconds,
            "Rate limit settings updated"
        );
        self.settings.replace(settings);
    }

    /// Forget the counter for one key
    pub fn reset_key(&self, key: &str) -> Option<Counter> {
        self.limiter.store().remove(key)
    }

    pub fn counter(&self, key: &str) -> Option<Counter> {
        self.limiter.store().get(key)
    }

    pub fn store(&self) -> &Arc<WindowCounterStore> {
        self.limiter.store()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn stats(&self) -> ThrottlerStats {
        ThrottlerStats {
            tracked_keys: self.limiter.store().len(),
            max_tracked_keys: self.limiter.store().max_keys(),
            metrics: self.metrics.snapshot(),
        }
    }
}

/// Counter store and admission statistics
#[derive(Debug, Clone, Serialize)]
pub struct ThrottlerStats {
    pub tracked_keys: usize,
    pub max_tracked_keys: usize,
    pub metrics: MetricsSnapshot,
}
