// # Memory Record Tracker
//
// In-memory implementation of `RecordTracker`, used by tests and by the
// contract-test double crates depending on this one.
//
// ## Crash Behavior
//
// All state is lost on restart; there is no recovery. Useful only for
// tests — production deployments should use `FileRecordTracker`.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::tracker::{ManagedHostname, RecordKey, RecordTracker, TrackedRecord, matches_preserved};

/// In-memory record tracker.
#[derive(Debug, Clone)]
pub struct MemoryRecordTracker {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<TrackedRecord>,
    preserved_hostnames: Vec<String>,
    managed_hostnames: Vec<ManagedHostname>,
}

impl MemoryRecordTracker {
    /// Create an empty tracker with no preserved or managed hostnames.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Create a tracker seeded with preserved/managed hostname lists.
    pub fn with_lists(preserved_hostnames: Vec<String>, managed_hostnames: Vec<ManagedHostname>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                records: Vec::new(),
                preserved_hostnames,
                managed_hostnames,
            })),
        }
    }

    /// Number of tracked records.
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    /// Whether the tracker has no tracked records.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }
}

impl Default for MemoryRecordTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordTracker for MemoryRecordTracker {
    async fn is_tracked(&self, key: &RecordKey) -> Result<bool, Error> {
        Ok(self.inner.read().await.records.iter().any(|r| &r.key == key))
    }

    async fn track(&self, key: &RecordKey, id: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.records.retain(|r| &r.key != key);
        guard.records.push(TrackedRecord {
            key: key.clone(),
            id: id.to_string(),
            created_at: Utc::now(),
            orphaned_at: None,
        });
        Ok(())
    }

    async fn update_id(&self, key: &RecordKey, new_id: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        match guard.records.iter_mut().find(|r| &r.key == key) {
            Some(record) => {
                record.id = new_id.to_string();
                Ok(())
            }
            None => Err(Error::tracker(format!("cannot update id for untracked key {key:?}"))),
        }
    }

    async fn untrack(&self, key: &RecordKey) -> Result<(), Error> {
        self.inner.write().await.records.retain(|r| &r.key != key);
        Ok(())
    }

    async fn mark_orphan(&self, key: &RecordKey) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        if let Some(record) = guard.records.iter_mut().find(|r| &r.key == key) {
            record.orphaned_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn is_orphan(&self, key: &RecordKey) -> Result<bool, Error> {
        Ok(self
            .inner
            .read()
            .await
            .records
            .iter()
            .any(|r| &r.key == key && r.orphaned_at.is_some()))
    }

    async fn orphaned_at(&self, key: &RecordKey) -> Result<Option<chrono::DateTime<Utc>>, Error> {
        Ok(self
            .inner
            .read()
            .await
            .records
            .iter()
            .find(|r| &r.key == key)
            .and_then(|r| r.orphaned_at))
    }

    async fn clear_orphan(&self, key: &RecordKey) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        if let Some(record) = guard.records.iter_mut().find(|r| &r.key == key) {
            record.orphaned_at = None;
        }
        Ok(())
    }

    async fn should_preserve(&self, fqdn: &str) -> Result<bool, Error> {
        Ok(matches_preserved(fqdn, &self.inner.read().await.preserved_hostnames))
    }

    async fn all_tracked(&self) -> Result<Vec<TrackedRecord>, Error> {
        Ok(self.inner.read().await.records.clone())
    }

    async fn managed_hostnames(&self) -> Result<Vec<ManagedHostname>, Error> {
        Ok(self.inner.read().await.managed_hostnames.clone())
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}
