use std::sync::Arc;
use tracing::{error, trace};

use crate::metrics::AdmissionMetrics;
use crate::rate_limit_config::Limits;
use crate::window_counter::{WindowCounterStore, WindowHit};

/// Outcome of a single admission decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { retry_after_secs: u64 },
}

/// Fixed-window admission decisions on top of the shared counter store.
///
/// The request being decided is always counted, including the one that
/// crosses the limit and gets denied.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    store: Arc<WindowCounterStore>,
    metrics: Arc<AdmissionMetrics>,
}

impl RateLimiter {
    pub fn new(store: Arc<WindowCounterStore>, metrics: Arc<AdmissionMetrics>) -> Self {
        Self { store, metrics }
    }

    /// Count a request for `key` at `now` (epoch millis) and decide on it.
    ///
    /// Store faults fail open: the fault is logged and the request allowed.
    pub fn decide(&self, key: &str, limits: &Limits, now: u64) -> Decision {
        let hit = match self
            .store
            .increment_and_get(key, now, limits.window_seconds)
        {
            Ok(hit) => hit,
            Err(err) => {
                error!(
                    target: "gatekeeper::rate_limiter",
                    key = %key,
                    error = %err,
                    "Counter store fault, failing open"
                );
                self.metrics.record_failed_open();
                self.metrics.record_allowed();
                return Decision::Allow;
            }
        };

        trace!(
            target: "gatekeeper::rate_limiter",
            key = %key,
            count = hit.count,
            limit = limits.max_requests,
            "Counted request"
        );

        if hit.count > u64::from(limits.max_requests) {
            self.metrics.record_denied();
            Decision::Deny {
                retry_after_secs: retry_after_secs(&hit, limits.window_seconds, now),
            }
        } else {
            self.metrics.record_allowed();
            Decision::Allow
        }
    }

    pub fn store(&self) -> &Arc<WindowCounterStore> {
        &self.store
    }
}

/// Whole seconds until the window of `hit` closes, rounded up and clamped
/// to `[0, window_seconds]`.
pub fn retry_after_secs(hit: &WindowHit, window_seconds: u64, now: u64) -> u64 {
    let window_millis = window_seconds.saturating_mul(1000);
    let elapsed = now.saturating_sub(hit.window_start);
    let remaining = window_millis.saturating_sub(elapsed);
    remaining.div_ceil(1000)
}
