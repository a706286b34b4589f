//! Contract: `cleanupOrphanedRecords` invoked twice within 3 seconds
//! executes its scan at most once.
//!
//! The second call inside the debounce window must be a no-op — returning
//! a default (all-zero) summary — rather than re-scanning and potentially
//! double-marking or double-counting.

mod common;

use common::*;
use dnsrc_core::{ConfigManager, DnsManager, EventBus, MemoryRecordTracker, ProviderRecord, RecordTracker, RecordType};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn second_call_within_debounce_window_is_a_no_op() {
    let provider = Arc::new(StubProvider::new("example.com"));
    let tracker = Arc::new(MemoryRecordTracker::new());
    let bus = Arc::new(EventBus::new());
    let config_manager = Arc::new(ConfigManager::new(config("example.com")));
    let manager = DnsManager::new(provider.clone(), tracker.clone(), bus, config_manager);

    let key = record_key("example.com", "api.example.com", RecordType::A);
    provider.seed(ProviderRecord {
        id: "id-1".to_string(),
        zone: "example.com".to_string(),
        record_type: RecordType::A,
        name: "api.example.com".to_string(),
        content: "10.0.0.1".to_string(),
        ttl: 300,
        proxied: None,
        priority: None,
        weight: None,
        port: None,
        comment: None,
    });
    tracker.track(&key, "id-1").await.unwrap();

    let first = manager.cleanup_orphaned_records(&[]).await.unwrap();
    assert_eq!(first.newly_marked, 1);

    tokio::time::advance(Duration::from_secs(1)).await;

    // Still within the 3s debounce window and the record is already
    // orphaned, so a real second scan would report zero anyway — the
    // debounce is what actually prevents the scan from running at all.
    let second = manager.cleanup_orphaned_records(&[]).await.unwrap();
    assert_eq!(second.newly_marked, 0);
    assert_eq!(second.deleted_after_grace, 0);
    assert_eq!(second.reactivated, 0);

    tokio::time::advance(Duration::from_secs(3)).await;

    let third = manager.cleanup_orphaned_records(&[]).await.unwrap();
    // Outside the window, the scan runs again; the record is already
    // orphaned so it's neither newly marked nor (within its 60-minute
    // default grace) deleted yet.
    assert_eq!(third.newly_marked, 0);
    assert_eq!(third.deleted_after_grace, 0);
}
