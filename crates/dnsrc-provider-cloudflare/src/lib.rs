//! Cloudflare DNS provider for the DNS reconciliation controller.
//!
//! # Trust Level: Untrusted
//!
//! Providers are **untrusted** components, isolated and single-shot per
//! call:
//!
//! ## Allowed Capabilities
//! - Perform HTTPS calls to the Cloudflare API v4
//! - Maintain the in-memory zone cache this trait owns
//! - Parse Cloudflare's responses
//!
//! ## Forbidden Capabilities
//! - Spawn long-lived tasks (bounded, short-lived concurrency for batch
//!   upserts is the one exception, capped per [`MAX_CONCURRENT_UPSERTS`])
//! - Retry or back off (owned by the `DnsManager`)
//! - Access the record tracker (owned by the `DnsManager`)
//! - Cache state beyond the zone record list this trait owns
//!
//! The API token is never logged; [`CloudflareProvider`]'s `Debug` impl
//! redacts it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;

use dnsrc_core::error::{Error, Result};
use dnsrc_core::traits::{DnsProvider, DnsProviderFactory, EnsureOutcome, ProviderRecord, RecordConfig, RecordType};

const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_CONCURRENT_UPSERTS: usize = 10;

struct Inner {
    api_token: String,
    domain: String,
    zone_id: RwLock<Option<String>>,
    client: reqwest::Client,
    cache: RwLock<Vec<ProviderRecord>>,
    dry_run: bool,
    controller_name: &'static str,
}

/// Cloudflare DNS provider.
///
/// Wraps its mutable state (`zone_id`, the record cache) in an `Arc<Inner>`
/// so [`Self::batch_ensure_records`] can hand clones of it to bounded
/// concurrent tasks without the trait needing `&self` to be `Arc<Self>`.
pub struct CloudflareProvider(Arc<Inner>);

impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("domain", &self.0.domain)
            .field("dry_run", &self.0.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Build a provider for `domain`, with an optional pre-known zone id.
    /// `controller_name` is stamped into every record this provider creates
    /// as a `Managed by <controller_name>` comment, the legacy marker the
    /// tracker adopts records by.
    pub fn new(
        api_token: impl Into<String>,
        domain: impl Into<String>,
        zone_id: Option<String>,
        dry_run: bool,
        controller_name: &'static str,
    ) -> Self {
        let api_token = api_token.into();
        if api_token.is_empty() {
            panic!("Cloudflare API token cannot be empty");
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .expect("failed to build Cloudflare HTTP client");

        Self(Arc::new(Inner {
            api_token,
            domain: domain.into(),
            zone_id: RwLock::new(zone_id),
            client,
            cache: RwLock::new(Vec::new()),
            dry_run,
            controller_name,
        }))
    }

    async fn ensure_zone_id(&self) -> Result<String> {
        if let Some(id) = self.0.zone_id.read().await.clone() {
            return Ok(id);
        }

        let url = format!("{CLOUDFLARE_API_BASE}/zones?name={}", self.0.domain);
        let response = self
            .0
            .client
            .get(&url)
            .bearer_auth(&self.0.api_token)
            .send()
            .await
            .map_err(|e| Error::provider("cloudflare", format!("zone lookup request failed: {e}")))?;

        let body = check_status(response, "cloudflare", "zone lookup").await?;
        let zones = body["result"]
            .as_array()
            .ok_or_else(|| Error::provider("cloudflare", "zone lookup: result is not an array"))?;
        let zone_id = zones
            .first()
            .and_then(|z| z["id"].as_str())
            .ok_or_else(|| Error::not_found(format!("zone not found for domain {}", self.0.domain)))?
            .to_string();

        *self.0.zone_id.write().await = Some(zone_id.clone());
        Ok(zone_id)
    }

    fn record_url(&self, zone_id: &str, record_id: &str) -> String {
        format!("{CLOUDFLARE_API_BASE}/zones/{zone_id}/dns_records/{record_id}")
    }

    fn managed_comment(&self) -> String {
        format!("Managed by {}", self.0.controller_name)
    }

    async fn ensure_one(inner: Arc<Inner>, zone_id: String, cfg: RecordConfig) -> EnsureOutcome {
        if let Err(err) = cfg.validate() {
            return EnsureOutcome::Error(err.to_string());
        }

        let existing = {
            let cache = inner.cache.read().await;
            cache
                .iter()
                .find(|r| r.record_type == cfg.record_type && r.name == cfg.name)
                .cloned()
        };

        match existing {
            None => match create_record(&inner, &zone_id, &cfg).await {
                Ok(record) => {
                    inner.cache.write().await.push(record.clone());
                    EnsureOutcome::Created(record)
                }
                Err(err) => EnsureOutcome::Error(err.to_string()),
            },
            Some(current) if cfg.matches(&current) => EnsureOutcome::UpToDate(current),
            Some(current) => match update_record(&inner, &zone_id, &current.id, &cfg).await {
                Ok(record) => {
                    let mut cache = inner.cache.write().await;
                    if let Some(slot) = cache.iter_mut().find(|r| r.id == record.id) {
                        *slot = record.clone();
                    }
                    EnsureOutcome::Updated(record)
                }
                Err(err) => EnsureOutcome::Error(err.to_string()),
            },
        }
    }
}

async fn create_record(inner: &Inner, zone_id: &str, cfg: &RecordConfig) -> Result<ProviderRecord> {
    let comment = format!("Managed by {}", inner.controller_name);
    let payload = build_payload(cfg, &comment);

    if inner.dry_run {
        tracing::info!(name = %cfg.name, record_type = %cfg.record_type, "dry-run: would create record");
        return Ok(dry_run_record(zone_id, cfg, &comment));
    }

    let url = format!("{CLOUDFLARE_API_BASE}/zones/{zone_id}/dns_records");
    let response = inner
        .client
        .post(&url)
        .bearer_auth(&inner.api_token)
        .json(&payload)
        .send()
        .await
        .map_err(|e| Error::provider("cloudflare", format!("create request failed: {e}")))?;

    let body = check_status(response, "cloudflare", "create record").await?;
    parse_provider_record(&body["result"], zone_id)
        .ok_or_else(|| Error::provider("cloudflare", "create response missing result fields"))
}

async fn update_record(inner: &Inner, zone_id: &str, id: &str, cfg: &RecordConfig) -> Result<ProviderRecord> {
    let comment = format!("Managed by {}", inner.controller_name);
    let payload = build_payload(cfg, &comment);

    if inner.dry_run {
        tracing::info!(name = %cfg.name, record_type = %cfg.record_type, "dry-run: would update record");
        let mut record = dry_run_record(zone_id, cfg, &comment);
        record.id = id.to_string();
        return Ok(record);
    }

    let url = format!("{CLOUDFLARE_API_BASE}/zones/{zone_id}/dns_records/{id}");
    let response = inner
        .client
        .put(&url)
        .bearer_auth(&inner.api_token)
        .json(&payload)
        .send()
        .await
        .map_err(|e| Error::provider("cloudflare", format!("update request failed: {e}")))?;

    let body = check_status(response, "cloudflare", "update record").await?;
    parse_provider_record(&body["result"], zone_id)
        .ok_or_else(|| Error::provider("cloudflare", "update response missing result fields"))
}

fn dry_run_record(zone_id: &str, cfg: &RecordConfig, comment: &str) -> ProviderRecord {
    ProviderRecord {
        id: format!("dry-run-{}", cfg.name),
        zone: zone_id.to_string(),
        record_type: cfg.record_type,
        name: cfg.name.clone(),
        content: cfg.content.clone(),
        ttl: cfg.ttl,
        proxied: cfg.proxied,
        priority: cfg.priority,
        weight: cfg.weight,
        port: cfg.port,
        comment: Some(comment.to_string()),
    }
}

fn build_payload(cfg: &RecordConfig, comment: &str) -> Value {
    let mut obj = serde_json::json!({
        "type": cfg.record_type.to_string(),
        "name": cfg.name,
        "ttl": cfg.ttl,
        "comment": comment,
    });

    match cfg.record_type {
        RecordType::Srv => {
            obj["data"] = serde_json::json!({
                "priority": cfg.priority.unwrap_or(0),
                "weight": cfg.weight.unwrap_or(0),
                "port": cfg.port.unwrap_or(0),
                "target": cfg.content,
            });
        }
        RecordType::Caa => {
            obj["data"] = serde_json::json!({
                "flags": cfg.flags.unwrap_or(0),
                "tag": cfg.tag.clone().unwrap_or_default(),
                "value": cfg.content,
            });
        }
        RecordType::Mx => {
            obj["content"] = serde_json::Value::String(cfg.content.clone());
            obj["priority"] = serde_json::Value::from(cfg.priority.unwrap_or(10));
        }
        _ => {
            obj["content"] = serde_json::Value::String(cfg.content.clone());
        }
    }

    if cfg.record_type.is_proxy_capable() {
        if let Some(proxied) = cfg.proxied {
            obj["proxied"] = serde_json::Value::Bool(proxied);
        }
    }

    obj
}

fn parse_provider_record(value: &Value, zone_id: &str) -> Option<ProviderRecord> {
    let id = value.get("id")?.as_str()?.to_string();
    let record_type = parse_record_type(value.get("type")?.as_str()?)?;
    let name = value.get("name")?.as_str()?.to_string();
    let ttl = value.get("ttl").and_then(|v| v.as_u64()).unwrap_or(300) as u32;
    let proxied = value.get("proxied").and_then(|v| v.as_bool());
    let comment = value.get("comment").and_then(|v| v.as_str()).map(|s| s.to_string());

    let data = value.get("data");
    let (content, priority, weight, port) = match record_type {
        RecordType::Srv => (
            data.and_then(|d| d.get("target")).and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            data.and_then(|d| d.get("priority")).and_then(|v| v.as_u64()).map(|v| v as u16),
            data.and_then(|d| d.get("weight")).and_then(|v| v.as_u64()).map(|v| v as u16),
            data.and_then(|d| d.get("port")).and_then(|v| v.as_u64()).map(|v| v as u16),
        ),
        RecordType::Caa => (
            data.and_then(|d| d.get("value")).and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            None,
            None,
            None,
        ),
        RecordType::Mx => (
            value.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            value.get("priority").and_then(|v| v.as_u64()).map(|v| v as u16),
            None,
            None,
        ),
        _ => (value.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string(), None, None, None),
    };

    Some(ProviderRecord {
        id,
        zone: zone_id.to_string(),
        record_type,
        name,
        content,
        ttl,
        proxied,
        priority,
        weight,
        port,
        comment,
    })
}

fn parse_record_type(s: &str) -> Option<RecordType> {
    match s.to_uppercase().as_str() {
        "A" => Some(RecordType::A),
        "AAAA" => Some(RecordType::Aaaa),
        "CNAME" => Some(RecordType::Cname),
        "TXT" => Some(RecordType::Txt),
        "MX" => Some(RecordType::Mx),
        "SRV" => Some(RecordType::Srv),
        "CAA" => Some(RecordType::Caa),
        "NS" => Some(RecordType::Ns),
        "PTR" => Some(RecordType::Ptr),
        _ => None,
    }
}

/// Check a response's status, mapping Cloudflare's status codes onto the
/// shared error taxonomy, and return the parsed JSON body on success.
async fn check_status(response: reqwest::Response, provider: &str, context: &str) -> Result<Value> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<Value>()
            .await
            .map_err(|e| Error::provider(provider, format!("{context}: failed to parse response: {e}")));
    }

    let body = response.text().await.unwrap_or_default();
    match status.as_u16() {
        401 | 403 => Err(Error::auth(format!("{context}: {status} {body}"))),
        404 => Err(Error::not_found(format!("{context}: {status}"))),
        429 => Err(Error::rate_limited(format!("{context}: {status}"))),
        500..=599 => Err(Error::provider(provider, format!("{context}: transient {status} {body}"))),
        _ => Err(Error::provider(provider, format!("{context}: {status} {body}"))),
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn init(&self) -> Result<()> {
        self.ensure_zone_id().await?;
        self.list().await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ProviderRecord>> {
        let zone_id = self.ensure_zone_id().await?;
        let url = format!("{CLOUDFLARE_API_BASE}/zones/{zone_id}/dns_records?per_page=100");
        let response = self
            .0
            .client
            .get(&url)
            .bearer_auth(&self.0.api_token)
            .send()
            .await
            .map_err(|e| Error::provider("cloudflare", format!("list records request failed: {e}")))?;

        let body = check_status(response, "cloudflare", "list records").await?;
        let entries = body["result"]
            .as_array()
            .ok_or_else(|| Error::provider("cloudflare", "list records: result is not an array"))?;

        let records: Vec<ProviderRecord> = entries.iter().filter_map(|v| parse_provider_record(v, &zone_id)).collect();
        *self.0.cache.write().await = records.clone();
        Ok(records)
    }

    async fn from_cache(&self, force_refresh: bool) -> Result<Vec<ProviderRecord>> {
        if force_refresh || self.0.cache.read().await.is_empty() {
            return self.list().await;
        }
        Ok(self.0.cache.read().await.clone())
    }

    async fn create(&self, record: &RecordConfig) -> Result<ProviderRecord> {
        record.validate()?;
        let zone_id = self.ensure_zone_id().await?;
        let created = create_record(&self.0, &zone_id, record).await?;
        self.0.cache.write().await.push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: &str, record: &RecordConfig) -> Result<ProviderRecord> {
        record.validate()?;
        let zone_id = self.ensure_zone_id().await?;
        let updated = update_record(&self.0, &zone_id, id, record).await?;
        let mut cache = self.0.cache.write().await;
        if let Some(slot) = cache.iter_mut().find(|r| r.id == updated.id) {
            *slot = updated.clone();
        }
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let zone_id = self.ensure_zone_id().await?;

        if self.0.dry_run {
            tracing::info!(id, "dry-run: would delete record");
        } else {
            let url = self.record_url(&zone_id, id);
            let response = self
                .0
                .client
                .delete(&url)
                .bearer_auth(&self.0.api_token)
                .send()
                .await
                .map_err(|e| Error::provider("cloudflare", format!("delete request failed: {e}")))?;

            // Deleting an already-gone record is success, per contract.
            if response.status().as_u16() != 404 {
                check_status(response, "cloudflare", "delete record").await?;
            }
        }

        self.0.cache.write().await.retain(|r| r.id != id);
        Ok(())
    }

    async fn batch_ensure_records(&self, configs: &[RecordConfig]) -> Result<Vec<EnsureOutcome>> {
        self.from_cache(true).await?;
        let zone_id = self.ensure_zone_id().await?;

        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_UPSERTS));
        let mut set = JoinSet::new();
        for (idx, cfg) in configs.iter().cloned().enumerate() {
            let inner = self.0.clone();
            let zone_id = zone_id.clone();
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                (idx, Self::ensure_one(inner, zone_id, cfg).await)
            });
        }

        let mut outcomes: Vec<Option<EnsureOutcome>> = vec![None; configs.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, outcome)) => outcomes[idx] = Some(outcome),
                Err(err) => tracing::error!(error = %err, "batch ensure task panicked"),
            }
        }

        Ok(outcomes
            .into_iter()
            .map(|o| o.unwrap_or_else(|| EnsureOutcome::Error("batch task did not complete".to_string())))
            .collect())
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Factory for constructing Cloudflare providers from
/// `{"api_token": "...", "domain": "...", "zone_id": "...", "dry_run": false}`.
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, config: &Value) -> Result<Box<dyn DnsProvider>> {
        let api_token = config
            .get("api_token")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::config("cloudflare provider requires a non-empty \"api_token\""))?;
        let domain = config
            .get("domain")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::config("cloudflare provider requires a \"domain\""))?;
        let zone_id = config.get("zone_id").and_then(|v| v.as_str()).map(|s| s.to_string());
        let dry_run = config.get("dry_run").and_then(|v| v.as_bool()).unwrap_or(false);

        if dry_run {
            tracing::warn!("Cloudflare provider running in dry-run mode, no changes will be made");
        }

        Ok(Box::new(CloudflareProvider::new(api_token, domain, zone_id, dry_run, "dnsrc")))
    }
}

/// Register the Cloudflare provider with a registry.
pub fn register(registry: &dnsrc_core::registry::ComponentRegistry) {
    registry.register_provider("cloudflare", Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_config(record_type: RecordType, name: &str, content: &str) -> RecordConfig {
        RecordConfig {
            record_type,
            name: name.to_string(),
            content: content.to_string(),
            ttl: 300,
            proxied: None,
            priority: None,
            weight: None,
            port: None,
            flags: None,
            tag: None,
        }
    }

    #[test]
    fn factory_creation_succeeds() {
        let factory = CloudflareFactory;
        let config = serde_json::json!({"api_token": "tok", "domain": "example.com"});
        assert!(factory.create(&config).is_ok());
    }

    #[test]
    fn factory_requires_token() {
        let factory = CloudflareFactory;
        let config = serde_json::json!({"api_token": "", "domain": "example.com"});
        assert!(factory.create(&config).is_err());
    }

    #[test]
    #[should_panic(expected = "cannot be empty")]
    fn empty_token_panics() {
        CloudflareProvider::new("", "example.com", None, false, "dnsrc");
    }

    #[test]
    fn api_token_not_exposed_in_debug() {
        let provider = CloudflareProvider::new("super-secret-token", "example.com", None, false, "dnsrc");
        let debug_str = format!("{provider:?}");
        assert!(!debug_str.contains("super-secret-token"));
        assert!(debug_str.contains("CloudflareProvider"));
    }

    #[test]
    fn provider_name_is_cloudflare() {
        let provider = CloudflareProvider::new("token", "example.com", None, false, "dnsrc");
        assert_eq!(provider.provider_name(), "cloudflare");
    }

    #[test]
    fn build_payload_includes_proxied_only_for_proxy_capable_types() {
        let mut cfg = record_config(RecordType::A, "a.example.com", "1.2.3.4");
        cfg.proxied = Some(true);
        let payload = build_payload(&cfg, "Managed by dnsrc");
        assert_eq!(payload["proxied"], true);

        let mut txt = record_config(RecordType::Txt, "txt.example.com", "v=spf1 -all");
        txt.proxied = Some(true);
        let payload = build_payload(&txt, "Managed by dnsrc");
        assert!(payload.get("proxied").is_none());
    }

    #[test]
    fn build_payload_srv_uses_data_object() {
        let mut cfg = record_config(RecordType::Srv, "_svc._tcp.example.com", "target.example.com");
        cfg.priority = Some(10);
        cfg.weight = Some(5);
        cfg.port = Some(443);
        let payload = build_payload(&cfg, "Managed by dnsrc");
        assert_eq!(payload["data"]["target"], "target.example.com");
        assert_eq!(payload["data"]["port"], 443);
    }

    #[test]
    fn parse_provider_record_round_trips_a_record() {
        let raw = serde_json::json!({
            "id": "abc123",
            "type": "A",
            "name": "a.example.com",
            "content": "1.2.3.4",
            "ttl": 300,
            "proxied": false,
            "comment": "Managed by dnsrc",
        });
        let record = parse_provider_record(&raw, "zone-1").unwrap();
        assert_eq!(record.content, "1.2.3.4");
        assert!(record.has_legacy_marker("dnsrc"));
    }
}
