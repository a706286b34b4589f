//! Contract: `batchEnsureRecords` is idempotent.
//!
//! Two consecutive calls with the same input must produce `created=0,
//! updated=0, upToDate=len(input)` on the second, and the tracker must not
//! grow past one entry per logical key no matter how many times the same
//! batch is submitted.

mod common;

use common::*;
use dnsrc_core::{ConfigManager, DnsManager, EventBus, MemoryRecordTracker, RecordTracker, RecordType};
use std::sync::Arc;

#[tokio::test]
async fn batch_ensure_records_is_idempotent_on_a_clean_zone() {
    let provider = Arc::new(StubProvider::new("example.com"));
    let tracker = Arc::new(MemoryRecordTracker::new());
    let bus = Arc::new(EventBus::new());
    let config_manager = Arc::new(ConfigManager::new(config("example.com")));
    let manager = DnsManager::new(provider.clone(), tracker.clone(), bus, config_manager);

    let hostnames = vec!["a.example.com".to_string()];
    let labels = labels_with("a.example.com", "1.2.3.4");

    let first = manager.process_hostnames(&hostnames, &labels, false).await.unwrap();
    assert_eq!((first.created, first.updated, first.up_to_date, first.errors, first.total), (1, 0, 0, 0, 1));
    assert_eq!(tracker.len().await, 1);

    let second = manager.process_hostnames(&hostnames, &labels, false).await.unwrap();
    assert_eq!((second.created, second.updated, second.up_to_date, second.errors, second.total), (0, 0, 1, 0, 1));
    assert_eq!(tracker.len().await, 1);
}

#[tokio::test]
async fn repeated_batches_never_duplicate_a_tracked_key() {
    let provider = Arc::new(StubProvider::new("example.com"));
    let tracker = Arc::new(MemoryRecordTracker::new());
    let bus = Arc::new(EventBus::new());
    let config_manager = Arc::new(ConfigManager::new(config("example.com")));
    let manager = DnsManager::new(provider, tracker.clone(), bus, config_manager);

    let hostnames = vec!["a.example.com".to_string()];
    let labels = labels_with("a.example.com", "1.2.3.4");

    for _ in 0..5 {
        manager.process_hostnames(&hostnames, &labels, false).await.unwrap();
    }

    assert_eq!(tracker.len().await, 1);
    let key = record_key("example.com", "a.example.com", RecordType::A);
    assert!(tracker.is_tracked(&key).await.unwrap());
}
