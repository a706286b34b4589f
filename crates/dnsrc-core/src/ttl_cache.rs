//! Short-TTL dedup cache, used to suppress repeated "preserved" / "already
//! cleaned up" log lines under rapid container churn without holding those
//! entries forever.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// A set of `T` where membership expires after a fixed TTL from insertion.
pub struct TtlSet<T> {
    ttl: Duration,
    entries: RwLock<HashMap<T, Instant>>,
}

impl<T: Eq + Hash + Clone> TtlSet<T> {
    /// Create a cache whose entries expire `ttl` after insertion.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert `value`, resetting its expiry, and return whether it was
    /// already present and unexpired (i.e. this is a duplicate).
    pub fn insert_and_check_duplicate(&self, value: T) -> bool {
        let now = Instant::now();
        let mut guard = self.entries.write().expect("ttl cache lock poisoned");
        let was_live = guard
            .get(&value)
            .map(|inserted_at| now.duration_since(*inserted_at) < self.ttl)
            .unwrap_or(false);
        guard.insert(value, now);
        was_live
    }

    /// Whether `value` is currently present and unexpired.
    pub fn contains(&self, value: &T) -> bool {
        let guard = self.entries.read().expect("ttl cache lock poisoned");
        guard
            .get(value)
            .map(|inserted_at| inserted_at.elapsed() < self.ttl)
            .unwrap_or(false)
    }

    /// Drop every entry whose TTL has elapsed.
    pub fn sweep(&self) {
        let mut guard = self.entries.write().expect("ttl cache lock poisoned");
        guard.retain(|_, inserted_at| inserted_at.elapsed() < self.ttl);
    }
}
