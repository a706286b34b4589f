//! Configuration types for the reconciliation core.
//!
//! Holds a typed configuration snapshot. Callers mutate it through
//! [`ConfigManager`], which performs an atomic swap and notifies registered
//! observers of the change.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};

/// Which discovery source is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    /// Discover hostnames from a reverse-proxy router catalog.
    Router,
    /// Discover hostnames directly from container labels.
    Direct,
}

/// Optional HTTP basic-auth credentials for the router catalog endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterAuth {
    /// Basic-auth username.
    pub username: String,
    /// Basic-auth password.
    pub password: String,
}

/// Default record attributes applied when labels don't override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDefaults {
    /// Record type used when labels don't specify one.
    #[serde(default = "default_record_type")]
    pub default_type: crate::traits::RecordType,
    /// TTL in seconds used when labels don't specify one.
    #[serde(default = "default_ttl")]
    pub default_ttl: u32,
    /// `proxied` flag used when labels don't specify one.
    #[serde(default)]
    pub default_proxied: bool,
}

impl Default for RecordDefaults {
    fn default() -> Self {
        Self {
            default_type: default_record_type(),
            default_ttl: default_ttl(),
            default_proxied: false,
        }
    }
}

fn default_record_type() -> crate::traits::RecordType {
    crate::traits::RecordType::A
}

fn default_ttl() -> u32 {
    300
}

/// Typed runtime configuration for the reconciler.
///
/// Field names mirror the recognized option table: `pollInterval`,
/// `operationMode`, `dnsProvider`, `providerDomain`, `defaultManage`,
/// `cleanupOrphaned`, `cleanupGracePeriod`, label prefixes, router
/// endpoint, and `apiTimeout`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Monitor poll cadence, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Which discovery source is active.
    #[serde(default = "default_operation_mode")]
    pub operation_mode: OperationMode,

    /// Selected DNS provider name (e.g. "cloudflare").
    pub dns_provider: String,

    /// Domain/zone the provider is authoritative for.
    pub provider_domain: String,

    /// Opt-in (false) vs opt-out (true) DNS management.
    #[serde(default)]
    pub default_manage: bool,

    /// Default record attributes applied when labels omit them.
    #[serde(default)]
    pub defaults: RecordDefaults,

    /// Enables orphan garbage collection.
    #[serde(default = "default_true")]
    pub cleanup_orphaned: bool,

    /// Minutes between marking an orphan and deleting it.
    #[serde(default = "default_grace_period_minutes")]
    pub cleanup_grace_period_minutes: u64,

    /// Label namespace without provider qualification, e.g. `"dns."`.
    #[serde(default = "default_generic_prefix")]
    pub generic_label_prefix: String,

    /// Label namespace qualified by the active provider, e.g. `"dns.cloudflare."`.
    #[serde(default)]
    pub provider_label_prefix: String,

    /// Router-mode catalog endpoint.
    #[serde(default)]
    pub router_api_url: Option<String>,

    /// Router-mode catalog basic-auth credentials.
    #[serde(default)]
    pub router_auth: Option<RouterAuth>,

    /// Outbound HTTP timeout, in seconds.
    #[serde(default = "default_api_timeout_secs")]
    pub api_timeout_secs: u64,

    /// Hostnames (possibly `*.suffix`) that are never deleted by cleanup.
    #[serde(default)]
    pub preserved_hostnames: Vec<String>,

    /// Additional metadata attached to reconcile operations.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ReconcilerConfig {
    /// Validate the configuration, rejecting unknown/inconsistent settings.
    pub fn validate(&self) -> Result<()> {
        if self.dns_provider.is_empty() {
            return Err(Error::config("dnsProvider must not be empty"));
        }
        if self.provider_domain.is_empty() {
            return Err(Error::config("providerDomain must not be empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::config("pollInterval must be > 0"));
        }
        if self.api_timeout_secs == 0 {
            return Err(Error::config("apiTimeout must be > 0"));
        }
        if self.operation_mode == OperationMode::Router && self.router_api_url.is_none() {
            return Err(Error::config(
                "routerApiUrl is required when operationMode is router",
            ));
        }
        Ok(())
    }

    /// Fully-qualify `name` against [`Self::provider_domain`], lowercasing it.
    pub fn canonicalize(&self, name: &str) -> String {
        let name = name.trim_end_matches('.').to_lowercase();
        let zone = self.provider_domain.trim_end_matches('.').to_lowercase();
        if name == zone || name.ends_with(&format!(".{zone}")) {
            name
        } else {
            format!("{name}.{zone}")
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    30_000
}

fn default_operation_mode() -> OperationMode {
    OperationMode::Router
}

fn default_true() -> bool {
    true
}

fn default_grace_period_minutes() -> u64 {
    60
}

fn default_generic_prefix() -> String {
    "dns.".to_string()
}

fn default_api_timeout_secs() -> u64 {
    10
}

/// A change to a single configuration key, delivered to [`ConfigManager`]
/// observers as `(key, old, new)`.
pub struct ConfigChange<'a> {
    /// The dotted key that changed (e.g. `"operationMode"`).
    pub key: &'a str,
    /// The previous configuration snapshot.
    pub old: &'a ReconcilerConfig,
    /// The newly committed configuration snapshot.
    pub new: &'a ReconcilerConfig,
}

type ChangeObserver = Box<dyn Fn(ConfigChange<'_>) + Send + Sync>;

/// Holds the live configuration snapshot and notifies observers on commit.
///
/// `set` replaces the whole document atomically, diffs the top-level keys
/// that changed, and invokes every registered observer once per changed key
/// in registration order.
pub struct ConfigManager {
    inner: RwLock<Arc<ReconcilerConfig>>,
    observers: RwLock<Vec<ChangeObserver>>,
}

impl ConfigManager {
    /// Create a manager seeded with an already-validated configuration.
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            inner: RwLock::new(Arc::new(config)),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Return the current configuration snapshot.
    pub fn current(&self) -> Arc<ReconcilerConfig> {
        self.inner.read().expect("config lock poisoned").clone()
    }

    /// Register a callback invoked `(key, old, new)` after every commit that
    /// changes `key`.
    pub fn on_change<F>(&self, observer: F)
    where
        F: Fn(ConfigChange<'_>) + Send + Sync + 'static,
    {
        self.observers
            .write()
            .expect("observers lock poisoned")
            .push(Box::new(observer));
    }

    /// Validate and atomically install `new_config`, then notify observers
    /// of every top-level field that changed.
    pub fn set(&self, new_config: ReconcilerConfig) -> Result<()> {
        new_config.validate()?;
        let new_config = Arc::new(new_config);

        let old_config = {
            let mut guard = self.inner.write().expect("config lock poisoned");
            std::mem::replace(&mut *guard, new_config.clone())
        };

        let changed_keys = diff_keys(&old_config, &new_config);
        if changed_keys.is_empty() {
            return Ok(());
        }

        let observers = self.observers.read().expect("observers lock poisoned");
        for key in &changed_keys {
            for observer in observers.iter() {
                observer(ConfigChange {
                    key,
                    old: &old_config,
                    new: &new_config,
                });
            }
        }
        Ok(())
    }
}

fn diff_keys(old: &ReconcilerConfig, new: &ReconcilerConfig) -> Vec<&'static str> {
    let mut keys = Vec::new();
    if old.poll_interval_ms != new.poll_interval_ms {
        keys.push("pollInterval");
    }
    if old.operation_mode != new.operation_mode {
        keys.push("operationMode");
    }
    if old.dns_provider != new.dns_provider {
        keys.push("dnsProvider");
    }
    if old.provider_domain != new.provider_domain {
        keys.push("providerDomain");
    }
    if old.default_manage != new.default_manage {
        keys.push("defaultManage");
    }
    if old.cleanup_orphaned != new.cleanup_orphaned {
        keys.push("cleanupOrphaned");
    }
    if old.cleanup_grace_period_minutes != new.cleanup_grace_period_minutes {
        keys.push("cleanupGracePeriod");
    }
    if old.router_api_url != new.router_api_url {
        keys.push("routerApiUrl");
    }
    if old.api_timeout_secs != new.api_timeout_secs {
        keys.push("apiTimeout");
    }
    keys
}
