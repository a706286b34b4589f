//! Contract: a record reappearing within its grace period is reactivated.
//!
//! If a tracked record's hostname stops being demanded and then reappears
//! before the grace period elapses, `orphanedAt` is cleared and the
//! provider-side record is left untouched — no delete, no recreate.

mod common;

use common::*;
use dnsrc_core::{ConfigManager, DnsManager, EventBus, MemoryRecordTracker, ProviderRecord, RecordTracker, RecordType};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn reactivation_inside_grace_period_clears_orphan_and_leaves_record_unchanged() {
    let provider = Arc::new(StubProvider::new("example.com"));
    let tracker = Arc::new(MemoryRecordTracker::new());
    let bus = Arc::new(EventBus::new());
    let mut cfg = config("example.com");
    cfg.cleanup_grace_period_minutes = 1;
    let config_manager = Arc::new(ConfigManager::new(cfg));
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

    // Poll 2, t=0: nothing active, record marked orphan.
    let summary = manager.cleanup_orphaned_records(&[]).await.unwrap();
    assert_eq!(summary.newly_marked, 1);
    assert!(tracker.is_orphan(&key).await.unwrap());

    // Poll 3, t=30s: the hostname is active again, well inside the 1-minute grace period.
    tokio::time::advance(Duration::from_secs(30)).await;
    let summary = manager
        .cleanup_orphaned_records(&["api.example.com".to_string()])
        .await
        .unwrap();

    assert_eq!(summary.reactivated, 1);
    assert_eq!(summary.deleted_after_grace, 0);
    assert!(!tracker.is_orphan(&key).await.unwrap());
    assert_eq!(provider.snapshot().len(), 1);
    assert_eq!(provider.snapshot()[0].content, "10.0.0.1");
}
