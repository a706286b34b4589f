//! Test doubles shared by the reconciliation contract tests.
//!
//! These are deliberately minimal: an in-memory `DnsProvider` that mimics
//! just enough provider behavior (create/update/up-to-date, cache mutation)
//! for the reconciler's contract to be exercised end-to-end without a real
//! DNS API.

use std::sync::RwLock as StdRwLock;

use async_trait::async_trait;
use dnsrc_core::config::{OperationMode, RecordDefaults, ReconcilerConfig};
use dnsrc_core::error::Result;
use dnsrc_core::{EnsureOutcome, ProviderRecord, RecordConfig, RecordType};
use std::collections::HashMap;

/// Records every record the reconciler asked it to hold, with no network
/// calls and no retry/backoff of its own — same contract as a real adapter,
/// minus the HTTP.
pub struct StubProvider {
    records: StdRwLock<Vec<ProviderRecord>>,
    zone: String,
}

impl StubProvider {
    pub fn new(zone: &str) -> Self {
        Self {
            records: StdRwLock::new(Vec::new()),
            zone: zone.to_string(),
        }
    }

    pub fn seed(&self, record: ProviderRecord) {
        self.records.write().unwrap().push(record);
    }

    pub fn snapshot(&self) -> Vec<ProviderRecord> {
        self.records.read().unwrap().clone()
    }
}

#[async_trait]
impl dnsrc_core::DnsProvider for StubProvider {
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
        record.validate()?;
        let created = ProviderRecord {
            id: format!("id-{}", record.name),
            zone: self.zone.clone(),
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
        record.validate()?;
        let mut guard = self.records.write().unwrap();
        let existing = guard
            .iter_mut()
            .find(|r| r.id == id)
            .expect("update target must already exist in the stub's cache");
        existing.content = record.content.clone();
        existing.ttl = record.ttl;
        existing.proxied = record.proxied;
        Ok(existing.clone())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.records.write().unwrap().retain(|r| r.id != id);
        Ok(())
    }

    async fn batch_ensure_records(&self, configs: &[RecordConfig]) -> Result<Vec<EnsureOutcome>> {
        let mut outcomes = Vec::with_capacity(configs.len());
        for cfg in configs {
            if let Err(err) = cfg.validate() {
                outcomes.push(EnsureOutcome::Error(err.to_string()));
                continue;
            }
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
        "stub"
    }
}

/// A `ReconcilerConfig` with the fields every contract test needs, ready to
/// be tweaked field-by-field per scenario.
pub fn config(zone: &str) -> ReconcilerConfig {
    ReconcilerConfig {
        poll_interval_ms: 1000,
        operation_mode: OperationMode::Direct,
        dns_provider: "stub".to_string(),
        provider_domain: zone.to_string(),
        default_manage: true,
        defaults: RecordDefaults::default(),
        cleanup_orphaned: true,
        cleanup_grace_period_minutes: 1,
        generic_label_prefix: "dns.".to_string(),
        provider_label_prefix: "dns.stub.".to_string(),
        router_api_url: None,
        router_auth: None,
        api_timeout_secs: 10,
        preserved_hostnames: Vec::new(),
        metadata: HashMap::new(),
    }
}

pub fn labels_with(hostname: &str, content: &str) -> HashMap<String, HashMap<String, String>> {
    let mut labels = HashMap::new();
    labels.insert("dns.content".to_string(), content.to_string());
    let mut map = HashMap::new();
    map.insert(hostname.to_string(), labels);
    map
}

pub fn record_key(zone: &str, name: &str, record_type: RecordType) -> dnsrc_core::RecordKey {
    dnsrc_core::RecordKey {
        provider: "stub".to_string(),
        zone: zone.to_string(),
        name: name.to_string(),
        record_type,
    }
}
