//! Reverse-proxy router catalog monitor for the DNS reconciliation
//! controller.
//!
//! Periodically GETs a router catalog endpoint (a JSON mapping of
//! `routerName -> {rule, service}`), extracts hostnames from each rule's
//! `Host(...)` expression, and joins each hostname to the labels of the
//! container backing that router's service — reusing the same
//! [`DockerLabelCache`] the direct-mode monitor's event listener keeps
//! current, so both discovery modes see the same live container labels.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use dnsrc_core::bus::Topic;
use dnsrc_core::config::RouterAuth;
use dnsrc_core::engine::hostrule::extract_hostnames;
use dnsrc_core::error::{Error, Result};
use dnsrc_core::traits::monitor::{LabelMap, Monitor, MonitorFactory, PollResult};
use dnsrc_source_docker::DockerLabelCache;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct RouterEntry {
    rule: String,
    #[serde(default)]
    service: Option<String>,
}

/// [`Monitor`] implementation that discovers hostnames from a reverse-proxy
/// router catalog.
pub struct RouterMonitor {
    url: String,
    auth: Option<RouterAuth>,
    client: reqwest::Client,
    label_cache: Option<Arc<DockerLabelCache>>,
}

impl RouterMonitor {
    /// Build a monitor polling `url`, optionally joining discovered
    /// hostnames to container labels via `label_cache`.
    pub fn new(
        url: impl Into<String>,
        auth: Option<RouterAuth>,
        timeout: Duration,
        label_cache: Option<Arc<DockerLabelCache>>,
    ) -> Self {
        Self {
            url: url.into(),
            auth,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            label_cache,
        }
    }

    async fn fetch_catalog(&self) -> Result<HashMap<String, RouterEntry>> {
        let mut request = self.client.get(&self.url);
        if let Some(auth) = &self.auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::monitor(format!("router catalog request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::monitor(format!("router catalog returned {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::monitor(format!("reading router catalog body: {e}")))?;

        serde_json::from_str(&body).map_err(|e| Error::monitor(format!("parsing router catalog: {e}")))
    }

    async fn labels_for_service(&self, service: Option<&str>) -> LabelMap {
        let (Some(cache), Some(service)) = (&self.label_cache, service) else {
            return LabelMap::new();
        };
        cache.labels_for_name(service).await.unwrap_or_default()
    }
}

#[async_trait]
impl Monitor for RouterMonitor {
    async fn poll(&self) -> Result<PollResult> {
        // A malformed or unreachable catalog must not abort the pipeline:
        // log and substitute an empty result instead of propagating `Err`.
        let catalog = match self.fetch_catalog().await {
            Ok(catalog) => catalog,
            Err(err) => {
                tracing::warn!(error = %err, "router catalog poll failed, reporting no hostnames");
                return Ok(PollResult::default());
            }
        };

        let mut hostnames = Vec::new();
        let mut labels_by_hostname: HashMap<String, LabelMap> = HashMap::new();

        for entry in catalog.values() {
            let hosts = extract_hostnames(&entry.rule);
            if hosts.is_empty() {
                continue;
            }
            let labels = self.labels_for_service(entry.service.as_deref()).await;
            for host in hosts {
                labels_by_hostname.entry(host.clone()).or_insert_with(|| labels.clone());
                hostnames.push(host);
            }
        }
        hostnames.sort();
        hostnames.dedup();

        Ok(PollResult { hostnames, labels_by_hostname, container_removed: false })
    }

    fn topic(&self) -> Topic {
        Topic::RoutersUpdated
    }

    fn monitor_name(&self) -> &'static str {
        "router-catalog"
    }
}

/// Factory constructing a [`RouterMonitor`] from
/// `{"url": "...", "auth": {"username": "...", "password": "..."}, "timeout_secs": 10}`.
/// Built without a [`DockerLabelCache`] join, since wiring one needs a cache
/// shared with the direct-mode monitor that this trait's `create` signature
/// doesn't carry; a daemon wanting the join constructs [`RouterMonitor::new`]
/// directly with a shared cache instead.
pub struct RouterMonitorFactory;

impl MonitorFactory for RouterMonitorFactory {
    fn create(&self, config: &serde_json::Value) -> Result<Box<dyn Monitor>> {
        let url = config
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::config("router monitor requires a \"url\""))?;

        let auth = config.get("auth").and_then(|a| {
            let username = a.get("username")?.as_str()?.to_string();
            let password = a.get("password")?.as_str()?.to_string();
            Some(RouterAuth { username, password })
        });

        let timeout_secs = config
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Box::new(RouterMonitor::new(url, auth, Duration::from_secs(timeout_secs), None)))
    }
}

/// Register the router catalog monitor with a registry.
pub fn register(registry: &dnsrc_core::registry::ComponentRegistry) {
    registry.register_monitor("router", Box::new(RouterMonitorFactory));
}
