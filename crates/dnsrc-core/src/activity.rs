//! Activity Log: an append-only, bounded-retention record of DNS record
//! lifecycle events, fed by subscribing to the event bus.
//!
//! Exists purely for observability (an admin surface outside this crate's
//! scope would read it); the reconciler never consults it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bus::{Event, EventBus, Topic};
use crate::traits::RecordType;

/// The kind of lifecycle transition an [`ActivityEntry`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// A record was created.
    Created,
    /// A record was updated.
    Updated,
    /// A record was deleted after its grace period elapsed.
    Deleted,
    /// A managed hostname was ensured present.
    Managed,
    /// A record began being tracked (including legacy adoption).
    Tracked,
}

/// A single append-only activity entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Monotonically increasing id, unique within this process's lifetime.
    pub id: u64,
    /// What happened.
    pub kind: ActivityKind,
    /// The record's type.
    pub record_type: RecordType,
    /// The record's FQDN.
    pub hostname: String,
    /// When this entry was recorded.
    pub timestamp: DateTime<Utc>,
    /// Free-form human-readable detail (e.g. the new content/TTL).
    pub details: String,
    /// What produced this entry (provider name, monitor name, etc).
    pub source: String,
}

/// Bounded, append-only activity log.
pub struct ActivityLog {
    max_entries: usize,
    next_id: AtomicU64,
    entries: RwLock<VecDeque<ActivityEntry>>,
}

impl ActivityLog {
    /// Create a log retaining at most `max_entries`, oldest evicted first.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            next_id: AtomicU64::new(1),
            entries: RwLock::new(VecDeque::with_capacity(max_entries.min(1024))),
        }
    }

    /// Append an entry, evicting the oldest if the log is at capacity.
    pub fn record(&self, kind: ActivityKind, record_type: RecordType, hostname: impl Into<String>, details: impl Into<String>, source: impl Into<String>, now: DateTime<Utc>) {
        let entry = ActivityEntry {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            kind,
            record_type,
            hostname: hostname.into(),
            timestamp: now,
            details: details.into(),
            source: source.into(),
        };

        let mut entries = self.entries.write().expect("activity log lock poisoned");
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Return the most recent `limit` entries, newest last.
    pub fn recent(&self, limit: usize) -> Vec<ActivityEntry> {
        let entries = self.entries.read().expect("activity log lock poisoned");
        entries.iter().rev().take(limit).rev().cloned().collect()
    }

    /// Total entries currently retained.
    pub fn len(&self) -> usize {
        self.entries.read().expect("activity log lock poisoned").len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to the DNS record lifecycle topics and record each one.
    /// `now` is supplied by the caller rather than read internally, since
    /// this crate never calls `Utc::now()`/`SystemTime::now()` from deep
    /// inside subscription closures.
    pub fn subscribe(self: &Arc<Self>, bus: &EventBus, now: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) {
        let log = self.clone();
        let now = Arc::new(now);

        let log2 = log.clone();
        let now2 = now.clone();
        bus.subscribe(Topic::DnsRecordCreated, move |event| {
            if let Event::DnsRecordCreated(record) = event {
                log2.record(
                    ActivityKind::Created,
                    record.record_type,
                    &record.name,
                    format!("{} -> {}", record.record_type, record.content),
                    "DnsManager",
                    now2(),
                );
            }
            Ok(())
        });

        let log2 = log.clone();
        let now2 = now.clone();
        bus.subscribe(Topic::DnsRecordUpdated, move |event| {
            if let Event::DnsRecordUpdated(record) = event {
                log2.record(
                    ActivityKind::Updated,
                    record.record_type,
                    &record.name,
                    format!("{} -> {}", record.record_type, record.content),
                    "DnsManager",
                    now2(),
                );
            }
            Ok(())
        });

        let log2 = log.clone();
        let now2 = now.clone();
        bus.subscribe(Topic::DnsRecordDeleted, move |event| {
            if let Event::DnsRecordDeleted { name, record_type } = event {
                log2.record(
                    ActivityKind::Deleted,
                    *record_type,
                    name,
                    "grace period elapsed",
                    "DnsManager",
                    now2(),
                );
            }
            Ok(())
        });
    }
}
