// # dnsrc-core
//
// Core library for the event-driven DNS reconciliation controller.
//
// ## Architecture Overview
//
// - **Monitor**: discovers desired hostnames, either from a reverse-proxy
//   router catalog or directly from container labels
// - **DnsProvider**: drives a concrete DNS API to match the desired record
//   set, with an in-memory zone cache and type-aware equality rules
// - **RecordTracker**: persistent index of records this controller created,
//   plus the operator-owned preserved/managed hostname lists
// - **DnsManager**: the reconciler — translates discovery events into
//   provider operations and runs orphan garbage collection
// - **ModeSwitcher**: activates exactly one monitor at a time
// - **EventBus**: typed in-process pub/sub coordinating all of the above
// - **ActivityLog**: append-only observability record of record lifecycle
//
// ## Design Principles
//
// 1. **Separation of Concerns**: discovery, provider I/O, and tracking are
//    isolated behind traits; the reconciler only orchestrates them.
// 2. **Event-Driven**: monitors publish, the reconciler subscribes; no
//    cyclic wiring.
// 3. **Plugin-Based**: providers, monitors, and trackers are registered
//    dynamically via `ComponentRegistry`, no hard-coded if-else chains.
// 4. **Idempotency**: `batchEnsureRecords` and the tracker together make
//    reconciliation safe to repeat.

pub mod activity;
pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod mode;
pub mod registry;
pub mod tracker;
pub mod traits;
pub mod ttl_cache;

pub use activity::{ActivityEntry, ActivityKind, ActivityLog};
pub use bus::{Event, EventBus, SubscriptionId, Topic};
pub use config::{ConfigChange, ConfigManager, OperationMode, ReconcilerConfig, RecordDefaults, RouterAuth};
pub use engine::{CleanupSummary, DnsManager, ReconcileStats};
pub use error::{Error, Result};
pub use mode::ModeSwitcher;
pub use registry::ComponentRegistry;
pub use tracker::{FileRecordTracker, MemoryRecordTracker};
pub use traits::{
    DnsProvider, DnsProviderFactory, EnsureOutcome, LabelMap, ManagedHostname, Monitor,
    MonitorFactory, PollResult, PollerLoop, ProviderRecord, RecordConfig, RecordKey, RecordTracker,
    RecordTrackerFactory, RecordType, TrackedRecord, TTL_AUTO,
};
pub use ttl_cache::TtlSet;
