use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counter for delivery statistics.
#[derive(Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Counter").field(&self.get()).finish()
    }
}

/// Per-router delivery counters.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    pub push_sent: Counter,
    pub push_failed: Counter,
    /// Push skipped because the token is blacklisted.
    pub push_skipped: Counter,
    pub direct_sent: Counter,
    pub direct_failed: Counter,
    pub connect_failed: Counter,
}

impl DeliveryStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            push_sent: self.push_sent.get(),
            push_failed: self.push_failed.get(),
            push_skipped: self.push_skipped.get(),
            direct_sent: self.direct_sent.get(),
            direct_failed: self.direct_failed.get(),
            connect_failed: self.connect_failed.get(),
        }
    }
}

/// Point-in-time copy of [`DeliveryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub push_sent: u64,
    pub push_failed: u64,
    pub push_skipped: u64,
    pub direct_sent: u64,
    pub direct_failed: u64,
    pub connect_failed: u64,
}

impl StatsSnapshot {
    pub fn delivered(&self) -> u64 {
        self.push_sent + self.direct_sent
    }
}
