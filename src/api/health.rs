//! Shared health state for the /health endpoint.
//! Stamped by the sync job and the cache warmer.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Job timestamps are unix seconds, 0 meaning "never ran".
pub struct HealthState {
    started: Instant,
    pub last_sync_at: AtomicI64,
    pub last_sync_ok: AtomicBool,
    pub last_cache_warm_at: AtomicI64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub uptime_secs: u64,
    pub last_sync_at: Option<i64>,
    pub last_sync_ok: bool,
    pub last_cache_warm_at: Option<i64>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            last_sync_at: AtomicI64::new(0),
            last_sync_ok: AtomicBool::new(false),
            last_cache_warm_at: AtomicI64::new(0),
        }
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sync(&self, at: i64, ok: bool) {
        self.last_sync_at.store(at, Ordering::Relaxed);
        self.last_sync_ok.store(ok, Ordering::Relaxed);
    }

    pub fn record_cache_warm(&self, at: i64) {
        self.last_cache_warm_at.store(at, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let stamp = |v: &AtomicI64| Some(v.load(Ordering::Relaxed)).filter(|t| *t > 0);
        HealthSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            last_sync_at: stamp(&self.last_sync_at),
            last_sync_ok: self.last_sync_ok.load(Ordering::Relaxed),
            last_cache_warm_at: stamp(&self.last_cache_warm_at),
        }
    }
}
