//! Contract: create → orphan → delete-after-grace lifecycle.
//!
//! A tracked record whose hostname stops being demanded is marked orphaned,
//! left untouched while inside the grace period, and deleted from both the
//! provider and the tracker once the grace period elapses — publishing
//! exactly one `DnsRecordDeleted` event for it.

mod common;

use common::*;
use dnsrc_core::{ConfigManager, DnsManager, Event, EventBus, MemoryRecordTracker, RecordTracker, RecordType, Topic};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn orphaned_record_is_deleted_once_grace_period_elapses() {
    let provider = Arc::new(StubProvider::new("example.com"));
    let tracker = Arc::new(MemoryRecordTracker::new());
    let bus = Arc::new(EventBus::new());
    let mut cfg = config("example.com");
    cfg.cleanup_grace_period_minutes = 1;
    let config_manager = Arc::new(ConfigManager::new(cfg));
    let manager = DnsManager::new(provider.clone(), tracker.clone(), bus.clone(), config_manager);

    let deletions = Arc::new(AtomicUsize::new(0));
    let deletions_clone = deletions.clone();
    bus.subscribe(Topic::DnsRecordDeleted, move |_event| {
        deletions_clone.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let hostnames = vec!["api.example.com".to_string()];
    let labels = labels_with("api.example.com", "10.0.0.1");
    let stats = manager.process_hostnames(&hostnames, &labels, false).await.unwrap();
    assert_eq!(stats.created, 1);
    assert_eq!(provider.snapshot().len(), 1);

    let key = record_key("example.com", "api.example.com", RecordType::A);

    // Poll 2: nothing demands the hostname any more. It's marked orphan but
    // stays present — the grace period hasn't elapsed.
    tokio::time::advance(Duration::from_secs(4)).await;
    manager.process_hostnames(&[], &HashMap::new(), false).await.unwrap();
    assert!(tracker.is_orphan(&key).await.unwrap());
    assert_eq!(provider.snapshot().len(), 1);
    assert_eq!(deletions.load(Ordering::SeqCst), 0);

    // Poll 3, t=70s after the orphan mark: the 1-minute grace period has
    // elapsed and the debounce window (3s) has long since passed.
    tokio::time::advance(Duration::from_secs(70)).await;
    manager.process_hostnames(&[], &HashMap::new(), false).await.unwrap();

    assert!(provider.snapshot().is_empty());
    assert!(!tracker.is_tracked(&key).await.unwrap());
    assert_eq!(deletions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn discovery_event_on_the_bus_drives_the_same_reconcile_path() {
    let provider = Arc::new(StubProvider::new("example.com"));
    let tracker = Arc::new(MemoryRecordTracker::new());
    let bus = Arc::new(EventBus::new());
    let config_manager = Arc::new(ConfigManager::new(config("example.com")));
    let manager = Arc::new(DnsManager::new(provider.clone(), tracker.clone(), bus.clone(), config_manager));
    manager.subscribe();

    bus.publish(
        Topic::LabelsUpdated,
        Event::DiscoveryUpdated {
            hostnames: vec!["web.example.com".to_string()],
            labels_by_hostname: labels_with("web.example.com", "10.0.0.2"),
            container_removed: false,
        },
    );

    // The handler spawns the actual reconcile as a task; give it a turn.
    for _ in 0..20 {
        if !provider.snapshot().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }

    assert_eq!(provider.snapshot().len(), 1);
    assert_eq!(provider.snapshot()[0].name, "web.example.com");
}
