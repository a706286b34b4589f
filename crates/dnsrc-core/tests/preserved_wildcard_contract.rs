//! Contract: preserved wildcard hostnames are never garbage-collected.
//!
//! A provider record matching a `*.suffix` preserved pattern must survive
//! repeated cleanup passes even though no monitor currently reports it as
//! active, and even once any would-be grace period has long elapsed.

mod common;

use common::*;
use dnsrc_core::{ConfigManager, DnsManager, EventBus, MemoryRecordTracker, ProviderRecord, RecordTracker, RecordType};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn preserved_wildcard_record_survives_cleanup() {
    let provider = Arc::new(StubProvider::new("example.com"));
    let tracker = Arc::new(MemoryRecordTracker::with_lists(
        vec!["*.admin.example.com".to_string()],
        Vec::new(),
    ));
    let bus = Arc::new(EventBus::new());
    let mut cfg = config("example.com");
    cfg.cleanup_grace_period_minutes = 1;
    let config_manager = Arc::new(ConfigManager::new(cfg));
    let manager = DnsManager::new(provider.clone(), tracker.clone(), bus, config_manager);

    provider.seed(ProviderRecord {
        id: "id-1".to_string(),
        zone: "example.com".to_string(),
        record_type: RecordType::A,
        name: "foo.admin.example.com".to_string(),
        content: "10.0.0.9".to_string(),
        ttl: 300,
        proxied: None,
        priority: None,
        weight: None,
        port: None,
        comment: Some("Managed by dnsrc".to_string()),
    });

    // Not explicitly tracked yet — cleanup adopts it via the legacy marker,
    // same as a record this controller created in a previous run.
    for _ in 0..3 {
        let summary = manager.cleanup_orphaned_records(&[]).await.unwrap();
        assert_eq!(summary.newly_marked, 0);
        assert_eq!(summary.deleted_after_grace, 0);
        tokio::time::advance(Duration::from_secs(70)).await;
    }

    assert_eq!(provider.snapshot().len(), 1);
    assert_eq!(provider.snapshot()[0].name, "foo.admin.example.com");
}

#[tokio::test(start_paused = true)]
async fn wildcard_does_not_preserve_the_suffix_itself() {
    let provider = Arc::new(StubProvider::new("example.com"));
    let tracker = Arc::new(MemoryRecordTracker::with_lists(
        vec!["*.admin.example.com".to_string()],
        Vec::new(),
    ));
    let bus = Arc::new(EventBus::new());
    let mut cfg = config("example.com");
    cfg.cleanup_grace_period_minutes = 1;
    let config_manager = Arc::new(ConfigManager::new(cfg));
    let manager = DnsManager::new(provider.clone(), tracker.clone(), bus, config_manager);

    let key = record_key("example.com", "admin.example.com", RecordType::A);
    provider.seed(ProviderRecord {
        id: "id-2".to_string(),
        zone: "example.com".to_string(),
        record_type: RecordType::A,
        name: "admin.example.com".to_string(),
        content: "10.0.0.10".to_string(),
        ttl: 300,
        proxied: None,
        priority: None,
        weight: None,
        port: None,
        comment: None,
    });
    tracker.track(&key, "id-2").await.unwrap();

    manager.cleanup_orphaned_records(&[]).await.unwrap();
    assert!(tracker.is_orphan(&key).await.unwrap());

    tokio::time::advance(Duration::from_secs(70)).await;
    manager.cleanup_orphaned_records(&[]).await.unwrap();
    assert!(provider.snapshot().is_empty());
}
