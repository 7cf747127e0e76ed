//! In-memory per-identity rate governor.
//!
//! Enforces a minimum inter-command interval plus a rolling-window command
//! cap. State lives in process memory only; a restart resets abuse counters,
//! which is an accepted trade-off. Each check-and-update runs under the
//! map entry's guard, so it is atomic per identity.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::RateConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied { retry_after_secs: u64 },
}

struct RateEntry {
    last_command: Instant,
    count: u32,
    window_reset: Instant,
}

#[derive(Clone)]
pub struct RateGovernor {
    table: Arc<DashMap<String, RateEntry>>,
    cfg: RateConfig,
}

impl RateGovernor {
    pub fn new(cfg: RateConfig) -> Self {
        Self {
            table: Arc::new(DashMap::new()),
            cfg,
        }
    }

    pub fn check(&self, identity: &str) -> RateDecision {
        let now = Instant::now();
        match self.table.entry(identity.to_string()) {
            Entry::Vacant(vacant) => {
                // First command always opens a fresh window.
                vacant.insert(RateEntry {
                    last_command: now,
                    count: 1,
                    window_reset: now + self.cfg.window,
                });
                RateDecision::Allowed
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if now >= entry.window_reset {
                    entry.count = 0;
                    entry.window_reset = now + self.cfg.window;
                }

                let since_last = now.duration_since(entry.last_command);
                if since_last < self.cfg.cooldown {
                    return RateDecision::Denied {
                        retry_after_secs: secs_ceil(self.cfg.cooldown - since_last),
                    };
                }
                if entry.count >= self.cfg.max_per_window {
                    return RateDecision::Denied {
                        retry_after_secs: secs_ceil(entry.window_reset - now),
                    };
                }

                entry.count += 1;
                entry.last_command = now;
                RateDecision::Allowed
            }
        }
    }

    /// Evicts identities whose window expired over one window-length ago,
    /// bounding table memory.
    pub fn sweep(&self) {
        let now = Instant::now();
        let horizon = self.cfg.window;
        let before = self.table.len();
        self.table
            .retain(|_, entry| now < entry.window_reset + horizon);
        // check() may insert concurrently between the snapshot and the
        // retain, so the difference can only be treated as a lower bound.
        let evicted = before.saturating_sub(self.table.len());
        if evicted > 0 {
            tracing::debug!(evicted, "rate table sweep");
        }
    }

    /// Spawns the periodic eviction sweep. Call once at startup.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let governor = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(governor.cfg.sweep_interval);
            interval.tick().await; // immediate first tick
            loop {
                interval.tick().await;
                governor.sweep();
            }
        })
    }

    #[cfg(test)]
    fn tracked_identities(&self) -> usize {
        self.table.len()
    }
}

fn secs_ceil(d: Duration) -> u64 {
    let mut secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs += 1;
    }
    secs.max(1)
}
