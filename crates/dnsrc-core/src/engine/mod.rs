//! DNS Manager: the reconciliation engine.
//!
//! Translates a discovered hostname set into desired record configs,
//! drives the provider to match them via batched upserts, keeps the
//! tracker's durable index current, and garbage-collects orphaned records
//! under grace-period semantics.

pub mod hostrule;
pub mod labels;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::bus::{Event, EventBus, Topic};
use crate::config::ConfigManager;
use crate::engine::labels::{LabelDefaults, extract_record_config, resolve_management_flag};
use crate::error::Result;
use crate::traits::monitor::LabelMap;
use crate::traits::provider::{DnsProvider, EnsureOutcome, ProviderRecord, RecordConfig, RecordType};
use crate::traits::tracker::{RecordKey, RecordTracker};
use crate::ttl_cache::TtlSet;

/// Minimum interval between consecutive [`DnsManager::cleanup_orphaned_records`] runs.
const CLEANUP_DEBOUNCE: Duration = Duration::from_secs(3);

/// How long a `(fqdn, type)` pair stays suppressed from the "record
/// preserved" info log after it's logged once; bounds the dedup set's size
/// under long-running churn instead of remembering every key forever.
const PRESERVED_LOG_TTL: Duration = Duration::from_secs(300);

/// Aggregated outcome of one `processHostnames` batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileStats {
    /// Records newly created.
    pub created: usize,
    /// Records updated because they differed from the desired config.
    pub updated: usize,
    /// Records already matching the desired config.
    pub up_to_date: usize,
    /// Individual entries that failed.
    pub errors: usize,
    /// Total entries submitted.
    pub total: usize,
}

impl ReconcileStats {
    fn record_outcome(&mut self, outcome: &EnsureOutcome) {
        match outcome {
            EnsureOutcome::Created(_) => self.created += 1,
            EnsureOutcome::Updated(_) => self.updated += 1,
            EnsureOutcome::UpToDate(_) => self.up_to_date += 1,
            EnsureOutcome::Error(_) => self.errors += 1,
        }
    }
}

/// One-line summary of a `cleanupOrphanedRecords` pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupSummary {
    /// Records newly marked orphaned this pass.
    pub newly_marked: usize,
    /// Records deleted because their grace period elapsed.
    pub deleted_after_grace: usize,
    /// Previously-orphaned records observed active again.
    pub reactivated: usize,
}

/// The reconciliation engine.
///
/// Owns no monitor and no concrete transport: it is driven entirely by bus
/// events and the `DnsProvider`/`RecordTracker` trait objects it's built
/// with, so it is agnostic to whether hostnames arrived via the router
/// catalog or direct container labels.
pub struct DnsManager {
    provider: Arc<dyn DnsProvider>,
    tracker: Arc<dyn RecordTracker>,
    bus: Arc<EventBus>,
    config: Arc<ConfigManager>,
    controller_name: &'static str,
    last_cleanup: StdMutex<Option<Instant>>,
    preserved_logged: TtlSet<(String, RecordType)>,
}

impl DnsManager {
    /// Build a reconciler over `provider`/`tracker`, wired to `bus` for
    /// publication and `config` for the live settings snapshot.
    pub fn new(
        provider: Arc<dyn DnsProvider>,
        tracker: Arc<dyn RecordTracker>,
        bus: Arc<EventBus>,
        config: Arc<ConfigManager>,
    ) -> Self {
        Self {
            provider,
            tracker,
            bus,
            config,
            controller_name: "dnsrc",
            last_cleanup: StdMutex::new(None),
            preserved_logged: TtlSet::new(PRESERVED_LOG_TTL),
        }
    }

    /// Probe the provider and ensure every `managedHostnames` entry exists.
    pub async fn init(&self) -> Result<()> {
        self.provider.init().await?;
        self.process_managed_hostnames().await?;
        Ok(())
    }

    /// Subscribe this manager's reconcile handler to discovery events.
    ///
    /// Handlers run synchronously on the publisher's task per the bus's
    /// delivery guarantee; each handler spawns the actual reconcile work so
    /// a slow provider call never blocks the monitor that published the
    /// event, while ordering for a single hostname is still preserved
    /// because each spawned task awaits the previous one via the tracker's
    /// own locking.
    pub fn subscribe(self: &Arc<Self>) {
        let manager = self.clone();
        self.bus
            .subscribe(Topic::RoutersUpdated, move |event| manager.handle_discovery(event));

        let manager = self.clone();
        self.bus
            .subscribe(Topic::LabelsUpdated, move |event| manager.handle_discovery(event));
    }

    fn handle_discovery(self: &Arc<Self>, event: &Event) -> std::result::Result<(), String> {
        let Event::DiscoveryUpdated {
            hostnames,
            labels_by_hostname,
            container_removed,
        } = event
        else {
            return Ok(());
        };

        let manager = self.clone();
        let hostnames = hostnames.clone();
        let labels_by_hostname = labels_by_hostname.clone();
        let container_removed = *container_removed;

        tokio::spawn(async move {
            if let Err(err) = manager
                .process_hostnames(&hostnames, &labels_by_hostname, container_removed)
                .await
            {
                tracing::warn!(error = %err, "processHostnames failed");
                manager.bus.publish(
                    Topic::ErrorOccurred,
                    Event::ErrorOccurred {
                        source: "DnsManager".to_string(),
                        error: err.to_string(),
                    },
                );
            }
        });

        Ok(())
    }

    /// Compute desired configs for `hostnames`, batch them to the
    /// provider, update tracking, and conditionally run cleanup.
    pub async fn process_hostnames(
        &self,
        hostnames: &[String],
        labels_by_hostname: &HashMap<String, LabelMap>,
        container_removed: bool,
    ) -> Result<ReconcileStats> {
        let config = self.config.current();
        let mut stats = ReconcileStats::default();
        let empty_labels = LabelMap::new();
        let mut configs = Vec::with_capacity(hostnames.len());
        let mut fqdns = Vec::with_capacity(hostnames.len());

        for hostname in hostnames {
            let labels = labels_by_hostname.get(hostname).unwrap_or(&empty_labels);

            let manage = resolve_management_flag(
                config.default_manage,
                &config.generic_label_prefix,
                &config.provider_label_prefix,
                labels,
            );
            if !manage {
                continue;
            }

            let fqdn = config.canonicalize(hostname);
            let defaults = LabelDefaults {
                record_type: config.defaults.default_type,
                ttl: config.defaults.default_ttl,
                proxied: config.defaults.default_proxied,
            };
            let record_config = extract_record_config(
                &fqdn,
                labels,
                &config.generic_label_prefix,
                &config.provider_label_prefix,
                &defaults,
            );

            fqdns.push(fqdn);
            configs.push(record_config);
        }

        stats.total = configs.len();

        if !configs.is_empty() {
            let outcomes = self.provider.batch_ensure_records(&configs).await?;
            for outcome in &outcomes {
                stats.record_outcome(outcome);
                match outcome {
                    EnsureOutcome::Created(record) => {
                        self.track_result(record).await?;
                        self.bus.publish(Topic::DnsRecordCreated, Event::DnsRecordCreated(record.clone()));
                    }
                    EnsureOutcome::Updated(record) => {
                        self.track_result(record).await?;
                        self.bus.publish(Topic::DnsRecordUpdated, Event::DnsRecordUpdated(record.clone()));
                    }
                    EnsureOutcome::UpToDate(record) => {
                        self.track_result(record).await?;
                    }
                    EnsureOutcome::Error(message) => {
                        tracing::warn!(error = %message, "batchEnsureRecords entry failed");
                    }
                }
            }
        }

        if config.cleanup_orphaned || container_removed {
            match self.cleanup_orphaned_records(&fqdns).await {
                Ok(summary) => {
                    tracing::info!(
                        newly_marked = summary.newly_marked,
                        deleted_after_grace = summary.deleted_after_grace,
                        reactivated = summary.reactivated,
                        "cleanup completed"
                    );
                }
                Err(err) => tracing::warn!(error = %err, "cleanup failed, tracker left unchanged"),
            }
        }

        self.bus.publish(
            Topic::DnsRecordsUpdated,
            Event::DnsRecordsUpdated {
                stats: stats.clone(),
                processed_hostnames: fqdns,
            },
        );

        Ok(stats)
    }

    /// Ensure every operator-declared managed hostname exists, regardless
    /// of whether any monitor currently reports demand for it.
    pub async fn process_managed_hostnames(&self) -> Result<()> {
        let managed = self.tracker.managed_hostnames().await?;
        if managed.is_empty() {
            return Ok(());
        }

        let config = self.config.current();
        let configs: Vec<RecordConfig> = managed
            .iter()
            .map(|m| RecordConfig {
                record_type: m.record_type,
                name: config.canonicalize(&m.hostname),
                content: m.content.clone(),
                ttl: m.ttl,
                proxied: m.proxied,
                priority: None,
                weight: None,
                port: None,
                flags: None,
                tag: None,
            })
            .collect();

        let outcomes = self.provider.batch_ensure_records(&configs).await?;
        for outcome in &outcomes {
            if let Some(record) = outcome.record() {
                self.track_result(record).await?;
            }
        }
        Ok(())
    }

    /// Track or retag `record` by its logical key, depending on whether
    /// that key was already tracked.
    async fn track_result(&self, record: &ProviderRecord) -> Result<()> {
        let key = RecordKey {
            provider: self.provider.provider_name().to_string(),
            zone: record.zone.clone(),
            name: record.name.clone(),
            record_type: record.record_type,
        };
        if self.tracker.is_tracked(&key).await? {
            self.tracker.update_id(&key, &record.id).await?;
        } else {
            self.tracker.track(&key, &record.id).await?;
        }
        Ok(())
    }

    /// Garbage-collect tracked records no longer demanded, with
    /// grace-period and preserve/managed protections.
    pub async fn cleanup_orphaned_records(&self, active: &[String]) -> Result<CleanupSummary> {
        {
            let mut last_cleanup = self.last_cleanup.lock().expect("last_cleanup lock poisoned");
            if let Some(previous) = *last_cleanup {
                if previous.elapsed() < CLEANUP_DEBOUNCE {
                    tracing::debug!("cleanupOrphanedRecords debounced, previous run too recent");
                    return Ok(CleanupSummary::default());
                }
            }
            *last_cleanup = Some(Instant::now());
        }

        let config = self.config.current();
        let zone = config.provider_domain.trim_end_matches('.').to_lowercase();
        let active: HashSet<String> = active.iter().map(|h| h.trim_end_matches('.').to_lowercase()).collect();
        let managed = self.tracker.managed_hostnames().await?;
        let managed_set: HashSet<(String, RecordType)> = managed
            .iter()
            .map(|m| (config.canonicalize(&m.hostname), m.record_type))
            .collect();

        let records = self.provider.from_cache(true).await?;
        let mut summary = CleanupSummary::default();

        for record in &records {
            let name_lower = record.name.trim_end_matches('.').to_lowercase();
            if name_lower == "@" || name_lower == zone {
                continue;
            }
            if record.record_type.is_infrastructure() {
                continue;
            }

            let fqdn = config.canonicalize(&record.name);
            let key = RecordKey {
                provider: self.provider.provider_name().to_string(),
                zone: record.zone.clone(),
                name: fqdn.clone(),
                record_type: record.record_type,
            };

            if !self.tracker.is_tracked(&key).await? {
                if record.has_legacy_marker(self.controller_name) {
                    self.tracker.track(&key, &record.id).await?;
                } else {
                    continue;
                }
            }

            let should_preserve =
                self.tracker.should_preserve(&fqdn).await? || managed_set.contains(&(fqdn.clone(), record.record_type));
            if should_preserve {
                self.log_preserved_once(&fqdn, record.record_type);
                continue;
            }

            if active.contains(&fqdn) {
                if self.tracker.is_orphan(&key).await? {
                    self.tracker.clear_orphan(&key).await?;
                    summary.reactivated += 1;
                    tracing::info!(hostname = %fqdn, "record reactivated, orphan mark cleared");
                }
                continue;
            }

            if !self.tracker.is_orphan(&key).await? {
                self.tracker.mark_orphan(&key).await?;
                summary.newly_marked += 1;
                tracing::info!(
                    hostname = %fqdn,
                    grace_minutes = config.cleanup_grace_period_minutes,
                    "record orphaned, will delete after grace period"
                );
                continue;
            }

            let Some(orphaned_at) = self.tracker.orphaned_at(&key).await? else {
                continue;
            };
            let elapsed = chrono::Utc::now() - orphaned_at;
            let grace = chrono::Duration::minutes(config.cleanup_grace_period_minutes as i64);
            if elapsed >= grace {
                match self.provider.delete(&record.id).await {
                    Ok(()) => {
                        self.tracker.untrack(&key).await?;
                        summary.deleted_after_grace += 1;
                        self.bus.publish(
                            Topic::DnsRecordDeleted,
                            Event::DnsRecordDeleted {
                                name: fqdn.clone(),
                                record_type: record.record_type,
                            },
                        );
                        tracing::info!(hostname = %fqdn, "record deleted after grace period");
                    }
                    Err(err) => {
                        tracing::warn!(hostname = %fqdn, error = %err, "failed to delete orphaned record, will retry next pass");
                    }
                }
            } else {
                tracing::debug!(
                    hostname = %fqdn,
                    remaining_minutes = (grace - elapsed).num_minutes().max(0),
                    "orphaned record still within grace period"
                );
            }
        }

        Ok(summary)
    }

    fn log_preserved_once(&self, fqdn: &str, record_type: RecordType) {
        if self.preserved_logged.insert_and_check_duplicate((fqdn.to_string(), record_type)) {
            tracing::debug!(hostname = %fqdn, record_type = %record_type, "record preserved, cleanup skipped");
        } else {
            tracing::info!(hostname = %fqdn, record_type = %record_type, "record preserved, cleanup skipped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OperationMode, RecordDefaults, ReconcilerConfig};
    use crate::tracker::MemoryRecordTracker;
    use async_trait::async_trait;
    use std::sync::RwLock as StdRwLock;

    struct MockProvider {
        records: StdRwLock<Vec<ProviderRecord>>,
    }

    #[async_trait]
    impl DnsProvider for MockProvider {
        async fn init(&self) -> Result<()> {
            Ok(())
        }

        async fn list(&self) -> Result<Vec<ProviderRecord>> {
            Ok(self.records.read().unwrap().clone())
        }

        async fn from_cache(&self, _force_refresh: bool) -> Result<Vec<ProviderRecord>> {
            self.list().await
        }

        async fn create(&self, record: &RecordConfig) -> Result<ProviderRecord> {
            let created = ProviderRecord {
                id: format!("id-{}", record.name),
                zone: "example.com".to_string(),
                record_type: record.record_type,
                name: record.name.clone(),
                content: record.content.clone(),
                ttl: record.ttl,
                proxied: record.proxied,
                priority: record.priority,
                weight: record.weight,
                port: record.port,
                comment: None,
            };
            self.records.write().unwrap().push(created.clone());
            Ok(created)
        }

        async fn update(&self, id: &str, record: &RecordConfig) -> Result<ProviderRecord> {
            let mut guard = self.records.write().unwrap();
            let existing = guard.iter_mut().find(|r| r.id == id).expect("update target exists");
            existing.content = record.content.clone();
            existing.ttl = record.ttl;
            Ok(existing.clone())
        }

        async fn delete(&self, id: &str) -> Result<()> {
            self.records.write().unwrap().retain(|r| r.id != id);
            Ok(())
        }

        async fn batch_ensure_records(&self, configs: &[RecordConfig]) -> Result<Vec<EnsureOutcome>> {
            let mut outcomes = Vec::with_capacity(configs.len());
            for cfg in configs {
                let existing = self
                    .records
                    .read()
                    .unwrap()
                    .iter()
                    .find(|r| r.name == cfg.name && r.record_type == cfg.record_type)
                    .cloned();
                let outcome = match existing {
                    None => EnsureOutcome::Created(self.create(cfg).await?),
                    Some(r) if cfg.matches(&r) => EnsureOutcome::UpToDate(r),
                    Some(r) => EnsureOutcome::Updated(self.update(&r.id, cfg).await?),
                };
                outcomes.push(outcome);
            }
            Ok(outcomes)
        }

        fn provider_name(&self) -> &'static str {
            "mock"
        }
    }

    fn config() -> ReconcilerConfig {
        ReconcilerConfig {
            poll_interval_ms: 1000,
            operation_mode: OperationMode::Direct,
            dns_provider: "mock".to_string(),
            provider_domain: "example.com".to_string(),
            default_manage: true,
            defaults: RecordDefaults::default(),
            cleanup_orphaned: true,
            cleanup_grace_period_minutes: 1,
            generic_label_prefix: "dns.".to_string(),
            provider_label_prefix: "dns.mock.".to_string(),
            router_api_url: None,
            router_auth: None,
            api_timeout_secs: 10,
            preserved_hostnames: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    fn manager() -> (DnsManager, Arc<MockProvider>) {
        let provider = Arc::new(MockProvider {
            records: StdRwLock::new(Vec::new()),
        });
        let tracker = Arc::new(MemoryRecordTracker::new());
        let bus = Arc::new(EventBus::new());
        let config = Arc::new(ConfigManager::new(config()));
        (DnsManager::new(provider.clone(), tracker, bus, config), provider)
    }

    fn labels_with(hostname: &str, content: &str) -> HashMap<String, LabelMap> {
        let mut labels = LabelMap::new();
        labels.insert("dns.content".to_string(), content.to_string());
        let mut map = HashMap::new();
        map.insert(hostname.to_string(), labels);
        map
    }

    #[tokio::test(start_paused = true)]
    async fn create_then_orphan_then_delete_lifecycle() {
        let (manager, _provider) = manager();

        let hostnames = vec!["api.example.com".to_string()];
        let labels = labels_with("api.example.com", "10.0.0.1");
        let stats = manager.process_hostnames(&hostnames, &labels, false).await.unwrap();
        assert_eq!(stats.created, 1);

        tokio::time::advance(Duration::from_secs(4)).await;

        let empty_hostnames: Vec<String> = Vec::new();
        let empty_labels = HashMap::new();
        manager.process_hostnames(&empty_hostnames, &empty_labels, false).await.unwrap();

        let key = RecordKey {
            provider: "mock".to_string(),
            zone: "example.com".to_string(),
            name: "api.example.com".to_string(),
            record_type: RecordType::A,
        };
        assert!(manager.tracker.is_orphan(&key).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn reactivation_clears_orphan_mark() {
        let (manager, provider) = manager();
        let key = RecordKey {
            provider: "mock".to_string(),
            zone: "example.com".to_string(),
            name: "api.example.com".to_string(),
            record_type: RecordType::A,
        };
        provider.records.write().unwrap().push(ProviderRecord {
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
        manager.tracker.track(&key, "id-1").await.unwrap();

        let summary = manager.cleanup_orphaned_records(&[]).await.unwrap();
        assert_eq!(summary.newly_marked, 1);
        assert!(manager.tracker.is_orphan(&key).await.unwrap());

        tokio::time::advance(Duration::from_secs(4)).await;

        let summary = manager
            .cleanup_orphaned_records(&["api.example.com".to_string()])
            .await
            .unwrap();
        assert_eq!(summary.reactivated, 1);
        assert!(!manager.tracker.is_orphan(&key).await.unwrap());
    }

    #[tokio::test]
    async fn batch_ensure_is_idempotent_via_reconciler() {
        let (manager, _provider) = manager();
        let hostnames = vec!["api.example.com".to_string()];
        let labels = labels_with("api.example.com", "10.0.0.1");

        let first = manager.process_hostnames(&hostnames, &labels, false).await.unwrap();
        assert_eq!((first.created, first.updated, first.up_to_date), (1, 0, 0));

        let second = manager.process_hostnames(&hostnames, &labels, false).await.unwrap();
        assert_eq!((second.created, second.updated, second.up_to_date), (0, 0, 1));
    }

    #[tokio::test]
    async fn skip_label_excludes_hostname() {
        let (manager, provider) = manager();
        let mut labels = labels_with("api.example.com", "10.0.0.1");
        labels
            .get_mut("api.example.com")
            .unwrap()
            .insert("dns.skip".to_string(), "true".to_string());

        let hostnames = vec!["api.example.com".to_string()];
        let stats = manager.process_hostnames(&hostnames, &labels, false).await.unwrap();
        assert_eq!(stats.total, 0);
        assert!(provider.records.read().unwrap().is_empty());
    }
}
