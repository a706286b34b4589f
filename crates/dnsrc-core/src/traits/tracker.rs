// # Record Tracker Trait
//
// Defines the interface for the durable index of records the reconciler
// created, plus the operator-owned preserved/managed hostname lists.
//
// ## Purpose
//
// The tracker ensures idempotency and safe garbage collection by recording,
// for every logical key `(provider, zone, name, type)`, the provider-side
// `id` and the orphan lifecycle timestamps. This prevents the reconciler
// from re-creating records it already manages and from deleting anything
// it didn't create.
//
// ## Implementations
//
// - File-based: `FileRecordTracker` (atomic write/rename/backup)
// - In-memory: `MemoryRecordTracker` (tests only)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::traits::RecordType;

/// Logical identity of a tracked record: `(provider, zone, name, type)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    /// Provider name (e.g. "cloudflare").
    pub provider: String,
    /// Zone the record lives in.
    pub zone: String,
    /// Fully-qualified record name.
    pub name: String,
    /// Record type.
    pub record_type: RecordType,
}

/// A single entry in the tracker's durable index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedRecord {
    /// Logical key.
    pub key: RecordKey,
    /// Current provider-assigned id. May change if the provider replaces
    /// the record; the index stays addressable by logical key regardless.
    pub id: String,
    /// When this record was first tracked.
    pub created_at: DateTime<Utc>,
    /// When this record was marked orphaned, if it currently is.
    pub orphaned_at: Option<DateTime<Utc>>,
}

/// A fully-specified hostname the core must keep present regardless of
/// whether any container currently demands it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedHostname {
    /// Hostname (not necessarily fully-qualified yet).
    pub hostname: String,
    /// Record type.
    pub record_type: RecordType,
    /// Desired content.
    pub content: String,
    /// Desired TTL.
    pub ttl: u32,
    /// Desired proxy flag, when applicable.
    pub proxied: Option<bool>,
}

/// Trait for the record tracker.
///
/// # Trust Level: Trusted (Core Component)
///
/// The tracker is a **trusted** core component:
///
/// ## Allowed Capabilities
/// - Perform I/O for persistent storage
/// - Implement locking/concurrency control for thread safety
/// - Cache state in memory for performance (with explicit flush)
///
/// ## Forbidden Capabilities
/// - Spawn background tasks without a clear lifecycle
/// - Implement reconciliation business logic (owned by the `DnsManager`)
/// - Perform DNS provider calls (owned by `DnsProvider`)
/// - Decide when to update (owned by the `DnsManager`)
#[async_trait]
pub trait RecordTracker: Send + Sync {
    /// Whether `key` is currently tracked.
    async fn is_tracked(&self, key: &RecordKey) -> Result<bool>;

    /// Begin tracking `key` with provider id `id`.
    async fn track(&self, key: &RecordKey, id: &str) -> Result<()>;

    /// Update the provider id for an already-tracked key (the provider
    /// replaced the underlying record).
    async fn update_id(&self, key: &RecordKey, new_id: &str) -> Result<()>;

    /// Stop tracking `key` entirely (used after grace-period deletion).
    async fn untrack(&self, key: &RecordKey) -> Result<()>;

    /// Mark `key` as orphaned, stamping `orphaned_at` with now.
    async fn mark_orphan(&self, key: &RecordKey) -> Result<()>;

    /// Whether `key` is currently marked orphaned.
    async fn is_orphan(&self, key: &RecordKey) -> Result<bool>;

    /// When `key` was marked orphaned, if it is.
    async fn orphaned_at(&self, key: &RecordKey) -> Result<Option<DateTime<Utc>>>;

    /// Clear the orphan mark on `key` (it was observed active again).
    async fn clear_orphan(&self, key: &RecordKey) -> Result<()>;

    /// Whether `fqdn` matches a preserved hostname, exactly or under a
    /// `*.suffix` wildcard (the wildcard matches strict subdomains only,
    /// never the suffix itself).
    async fn should_preserve(&self, fqdn: &str) -> Result<bool>;

    /// All currently-tracked records.
    async fn all_tracked(&self) -> Result<Vec<TrackedRecord>>;

    /// The operator-owned managed hostname list.
    async fn managed_hostnames(&self) -> Result<Vec<ManagedHostname>>;

    /// Persist any pending changes.
    async fn flush(&self) -> Result<()>;
}

/// Check whether `fqdn` is matched by `preserved_hostnames`, honoring the
/// `*.suffix` wildcard form. Shared by every [`RecordTracker`] implementation
/// so the matching rule stays identical across backends.
pub fn matches_preserved(fqdn: &str, preserved_hostnames: &[String]) -> bool {
    let fqdn = fqdn.trim_end_matches('.').to_lowercase();
    preserved_hostnames.iter().any(|pattern| {
        let pattern = pattern.trim_end_matches('.').to_lowercase();
        if let Some(suffix) = pattern.strip_prefix("*.") {
            fqdn != suffix && fqdn.ends_with(&format!(".{suffix}"))
        } else {
            fqdn == pattern
        }
    })
}

/// Helper trait for constructing record trackers from configuration.
pub trait RecordTrackerFactory: Send + Sync {
    /// Create a [`RecordTracker`] instance from its configuration value.
    fn create(&self, config: &serde_json::Value) -> Result<Box<dyn RecordTracker>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_strict_subdomains_only() {
        let preserved = vec!["*.admin.example.com".to_string()];
        assert!(matches_preserved("foo.admin.example.com", &preserved));
        assert!(matches_preserved("a.b.admin.example.com", &preserved));
        assert!(!matches_preserved("admin.example.com", &preserved));
        assert!(!matches_preserved("other.example.com", &preserved));
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        let preserved = vec!["Foo.Example.Com".to_string()];
        assert!(matches_preserved("foo.example.com", &preserved));
    }
}
