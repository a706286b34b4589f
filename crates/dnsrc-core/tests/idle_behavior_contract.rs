//! Contract: no discovered hostnames means no provider work.
//!
//! An empty poll result, or a poll result whose hostnames are all skipped
//! by `manage`/`skip` label resolution, must not reach the provider at all
//! and must not publish a creation/update event.

mod common;

use common::*;
use dnsrc_core::{ConfigManager, DnsManager, EventBus, MemoryRecordTracker};
use std::collections::HashMap;
use std::sync::Arc;

#[tokio::test]
async fn empty_hostname_set_performs_no_provider_calls() {
    let provider = Arc::new(StubProvider::new("example.com"));
    let tracker = Arc::new(MemoryRecordTracker::new());
    let bus = Arc::new(EventBus::new());
    let config_manager = Arc::new(ConfigManager::new(config("example.com")));
    let manager = DnsManager::new(provider.clone(), tracker, bus, config_manager);

    let stats = manager
        .process_hostnames(&[], &HashMap::new(), false)
        .await
        .unwrap();

    assert_eq!(stats.total, 0);
    assert!(provider.snapshot().is_empty());
}

#[tokio::test]
async fn skip_label_excludes_a_hostname_from_the_batch() {
    let provider = Arc::new(StubProvider::new("example.com"));
    let tracker = Arc::new(MemoryRecordTracker::new());
    let bus = Arc::new(EventBus::new());
    let config_manager = Arc::new(ConfigManager::new(config("example.com")));
    let manager = DnsManager::new(provider.clone(), tracker, bus, config_manager);

    let hostnames = vec!["skipped.example.com".to_string()];
    let mut labels = labels_with("skipped.example.com", "1.2.3.4");
    labels
        .get_mut("skipped.example.com")
        .unwrap()
        .insert("dns.skip".to_string(), "true".to_string());

    let stats = manager.process_hostnames(&hostnames, &labels, false).await.unwrap();

    assert_eq!(stats.total, 0);
    assert!(provider.snapshot().is_empty());
}
