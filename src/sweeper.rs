//! Background eviction of idle counters.
//!
//! Counters are only reset lazily, so without a sweep every client that ever
//! sent a request would stay in memory for the life of the process.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use crate::throttler::Throttler;

pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_RETENTION_MULTIPLE: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepOptions {
    pub interval: Duration,
    /// Counters idle for this many windows are evicted
    pub retention_multiple: u64,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            retention_multiple: DEFAULT_RETENTION_MULTIPLE,
        }
    }
}

/// Run one sweep against the current settings and clock. Returns the number
/// of evicted keys.
pub fn sweep_once(throttler: &Throttler, retention_multiple: u64) -> usize {
    let window_seconds = throttler.settings().snapshot().window_seconds;
    let retention_millis = window_seconds
        .saturating_mul(retention_multiple.max(1))
        .saturating_mul(1000);
    let now = throttler.clock().now_millis();

    let evicted = throttler.store().sweep(now, retention_millis);
    debug!(
        target: "gatekeeper::sweeper",
        evicted,
        remaining = throttler.store().len(),
        "Swept idle rate limit counters"
    );
    evicted
}

/// Spawn the periodic sweep task. Abort the returned handle to stop it.
pub fn spawn_sweeper(throttler: Arc<Throttler>, options: SweepOptions) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(options.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;
            sweep_once(&throttler, options.retention_multiple);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::key_resolver::KeyResolver;
    use crate::rate_limit_config::{RateLimitSettings, SettingsHandle};
    use crate::window_counter::WindowCounterStore;

    fn throttler(clock: Arc<ManualClock>) -> Arc<Throttler> {
        Arc::new(Throttler::new(
            SettingsHandle::new(RateLimitSettings::new(10, 60)),
            KeyResolver::default(),
            Arc::new(WindowCounterStore::default()),
            clock,
        ))
    }

    #[test]
    fn test_sweep_once_uses_window_multiple() {
        let clock = Arc::new(ManualClock::new(0));
        let throttler = throttler(clock.clone());
        throttler.store().increment_and_get("idle", 0, 60).unwrap();
        throttler.store().increment_and_get("active", 100_000, 60).unwrap();

        clock.set_secs(119);
        assert_eq!(sweep_once(&throttler, 2), 0);

        clock.set_secs(120);
        assert_eq!(sweep_once(&throttler, 2), 1);
        assert!(throttler.counter("idle").is_none());
        assert!(throttler.counter("active").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_sweeper_evicts_on_tick() {
        let clock = Arc::new(ManualClock::new(0));
        let throttler = throttler(clock.clone());
        throttler.store().increment_and_get("idle", 0, 60).unwrap();
        clock.set_secs(600);

        let handle = spawn_sweeper(
            Arc::clone(&throttler),
            SweepOptions {
                interval: Duration::from_secs(5),
                retention_multiple: 2,
            },
        );
        time::sleep(Duration::from_secs(6)).await;

        assert!(throttler.store().is_empty());
        handle.abort();
    }
}
