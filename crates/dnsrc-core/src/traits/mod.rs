//! Core traits for the reconciliation engine.
//!
//! - [`Monitor`]: discover desired hostnames, from a router catalog or
//!   container labels
//! - [`DnsProvider`]: the DNS provider contract — record CRUD plus batched
//!   idempotent upsert
//! - [`RecordTracker`]: persistent index of records this controller
//!   created, plus the preserved/managed hostname lists

pub mod monitor;
pub mod provider;
pub mod tracker;

pub use monitor::{LabelMap, Monitor, MonitorFactory, PollResult, PollerLoop};
pub use provider::{
    DnsProvider, DnsProviderFactory, EnsureOutcome, ProviderRecord, RecordConfig, RecordType,
    TTL_AUTO,
};
pub use tracker::{
    ManagedHostname, RecordKey, RecordTracker, RecordTrackerFactory, TrackedRecord,
    matches_preserved,
};
