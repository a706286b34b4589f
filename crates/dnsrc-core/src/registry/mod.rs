//! Plugin-based provider/monitor/tracker registry.
//!
//! The registry lets DNS providers, monitors, and record trackers be
//! registered dynamically at runtime, avoiding hardcoded if-else chains over
//! configuration type names.
//!
//! ## Registration
//!
//! Implementations register themselves during startup:
//!
//! ```rust,ignore
//! // in dnsrc-provider-cloudflare
//! pub fn register(registry: &ComponentRegistry) {
//!     registry.register_provider("cloudflare", Box::new(CloudflareFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory, Monitor, MonitorFactory, RecordTracker, RecordTrackerFactory};

/// Plugin registry for DNS providers, discovery monitors, and record
/// trackers, keyed by configured type name.
///
/// ## Thread Safety
///
/// Uses interior mutability via `RwLock`, allowing concurrent reads and
/// exclusive writes — the same shape the event bus uses for its subscriber
/// map.
#[derive(Default)]
pub struct ComponentRegistry {
    providers: RwLock<HashMap<String, Box<dyn DnsProviderFactory>>>,
    monitors: RwLock<HashMap<String, Box<dyn MonitorFactory>>>,
    trackers: RwLock<HashMap<String, Box<dyn RecordTrackerFactory>>>,
}

impl ComponentRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory under `name` (e.g. `"cloudflare"`).
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        self.providers.write().unwrap().insert(name.into(), factory);
    }

    /// Register a monitor factory under `name` (e.g. `"router"`, `"docker"`).
    pub fn register_monitor(&self, name: impl Into<String>, factory: Box<dyn MonitorFactory>) {
        self.monitors.write().unwrap().insert(name.into(), factory);
    }

    /// Register a record tracker factory under `name` (e.g. `"file"`).
    pub fn register_tracker(&self, name: impl Into<String>, factory: Box<dyn RecordTrackerFactory>) {
        self.trackers.write().unwrap().insert(name.into(), factory);
    }

    /// Instantiate a DNS provider of type `name` from `config`.
    pub fn create_provider(&self, name: &str, config: &serde_json::Value) -> Result<Box<dyn DnsProvider>> {
        let providers = self.providers.read().unwrap();
        let factory = providers
            .get(name)
            .ok_or_else(|| Error::config(format!("unknown provider type: {name}")))?;
        factory.create(config)
    }

    /// Instantiate a monitor of type `name` from `config`.
    pub fn create_monitor(&self, name: &str, config: &serde_json::Value) -> Result<Box<dyn Monitor>> {
        let monitors = self.monitors.read().unwrap();
        let factory = monitors
            .get(name)
            .ok_or_else(|| Error::config(format!("unknown monitor type: {name}")))?;
        factory.create(config)
    }

    /// Instantiate a record tracker of type `name` from `config`.
    pub fn create_tracker(&self, name: &str, config: &serde_json::Value) -> Result<Box<dyn RecordTracker>> {
        let trackers = self.trackers.read().unwrap();
        let factory = trackers
            .get(name)
            .ok_or_else(|| Error::config(format!("unknown tracker type: {name}")))?;
        factory.create(config)
    }

    /// List registered provider type names.
    pub fn list_providers(&self) -> Vec<String> {
        self.providers.read().unwrap().keys().cloned().collect()
    }

    /// List registered monitor type names.
    pub fn list_monitors(&self) -> Vec<String> {
        self.monitors.read().unwrap().keys().cloned().collect()
    }

    /// List registered tracker type names.
    pub fn list_trackers(&self) -> Vec<String> {
        self.trackers.read().unwrap().keys().cloned().collect()
    }

    /// Whether a provider type is registered.
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.read().unwrap().contains_key(name)
    }

    /// Whether a monitor type is registered.
    pub fn has_monitor(&self, name: &str) -> bool {
        self.monitors.read().unwrap().contains_key(name)
    }

    /// Whether a tracker type is registered.
    pub fn has_tracker(&self, name: &str) -> bool {
        self.trackers.read().unwrap().contains_key(name)
    }
}
