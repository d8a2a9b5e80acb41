// Cache Janitor - periodic TTL eviction off the request path

use crate::application::cache::ResultCache;
use crate::application::config::CacheConfig;
use crate::application::lifecycle::ShutdownToken;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: usize,
    pub remaining: usize,
    /// Attempted when something was evicted or an earlier persist failed
    pub persisted: bool,
}

/// Cache janitor
///
/// A persist that fails after an eviction leaves the janitor dirty; the
/// next sweep persists again even if nothing new expired.
pub struct CacheJanitor {
    cache: Arc<ResultCache>,
    ttl: Duration,
    sweep_interval: Duration,
    dirty: AtomicBool,
}

impl CacheJanitor {
    pub fn new(cache: Arc<ResultCache>, config: &CacheConfig) -> Self {
        Self {
            cache,
            ttl: config.ttl,
            sweep_interval: config.sweep_interval,
            dirty: AtomicBool::new(false),
        }
    }

    /// Sweep loop, first sweep immediately. Spawn with `tokio::spawn`.
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            interval_secs = self.sweep_interval.as_secs(),
            ttl_secs = self.ttl.as_secs(),
            "Cache janitor started"
        );

        let mut tick = interval(self.sweep_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.sweep_now().await;
                }
                _ = shutdown.wait() => break,
            }
        }

        info!("Cache janitor stopped");
    }

    /// Run one sweep immediately
    pub async fn sweep_now(&self) -> SweepReport {
        let evicted = self.cache.evict_expired(self.ttl);
        let remaining = self.cache.len();
        let retry = self.dirty.load(Ordering::SeqCst);

        if evicted == 0 && !retry {
            debug!(remaining, "Cache sweep found nothing expired");
            return SweepReport {
                evicted,
                remaining,
                persisted: false,
            };
        }

        let persisted = self.cache.persist().await;
        self.dirty.store(!persisted, Ordering::SeqCst);
        if persisted {
            info!(evicted, remaining, retry, "Cache snapshot saved after sweep");
        } else {
            warn!(evicted, remaining, "Cache snapshot not saved, retrying next sweep");
        }

        SweepReport {
            evicted,
            remaining,
            persisted,
        }
    }
}
