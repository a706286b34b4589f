// # Monitor Trait
//
// Defines the interface for discovering desired hostnames from a live
// workload inventory, either via a reverse-proxy router catalog or directly
// via container metadata.
//
// ## Implementations
//
// - Router catalog: `dnsrc-source-router` crate
// - Direct container labels: `dnsrc-source-docker` crate

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::bus::{Event, EventBus, Topic};
use crate::error::Result;

/// Per-hostname label map, as collected from container metadata.
pub type LabelMap = HashMap<String, String>;

/// Output of a single poll: the discovered hostname set and the labels that
/// back each one.
#[derive(Debug, Clone, Default)]
pub struct PollResult {
    /// Every hostname discovered this poll.
    pub hostnames: Vec<String>,
    /// Labels keyed by hostname.
    pub labels_by_hostname: HashMap<String, LabelMap>,
    /// Set when this poll was triggered by a container disappearing, so the
    /// reconciler knows to run cleanup even if `cleanupOrphaned` is off for
    /// routine polls.
    pub container_removed: bool,
}

/// Trait for workload-discovery monitors.
///
/// # Trust Level: Semi-Trusted
///
/// Monitors are **semi-trusted** components:
///
/// ## Allowed Capabilities
/// - Perform HTTP calls (router catalog) or Unix-socket I/O (Docker)
/// - Allocate bounded memory for the discovered hostname/label set
/// - Spawn tasks ONLY for event monitoring (the Docker event-stream
///   listener), never for polling loops with `sleep()`
///
/// ## Forbidden Capabilities
/// - Drive the DNS provider directly (that's the `DnsManager`'s job)
/// - Access the record tracker
/// - Decide whether a hostname should be managed (label-flag resolution is
///   the reconciler's job; the monitor reports labels verbatim)
///
/// Monitors are **observers**: they report what exists, never what should
/// be done about it.
#[async_trait]
pub trait Monitor: Send + Sync {
    /// Run one discovery pass and return the hostname/label set.
    ///
    /// Invalid upstream payloads (a malformed router catalog, an
    /// unreachable Docker socket) must not propagate as an error that
    /// aborts the pipeline — return an empty [`PollResult`] and let the
    /// caller log it.
    async fn poll(&self) -> Result<PollResult>;

    /// The bus topic this monitor publishes discovery results on
    /// (`ROUTERS_UPDATED` or `LABELS_UPDATED`).
    fn topic(&self) -> Topic;

    /// Static monitor name, for logging.
    fn monitor_name(&self) -> &'static str;
}

/// Helper trait for constructing monitors from configuration.
pub trait MonitorFactory: Send + Sync {
    /// Create a [`Monitor`] instance from its configuration value.
    fn create(&self, config: &serde_json::Value) -> Result<Box<dyn Monitor>>;
}

/// Shared poller skeleton used by both the router and direct monitors.
///
/// Runs `monitor.poll()` on a fixed interval, guarding against reentry with
/// an [`AtomicBool`] flag — a poll still in flight when the timer fires
/// again is coalesced by skipping that tick rather than stacking concurrent
/// polls. Publishes `POLL_STARTED`, the monitor's own topic, then
/// `POLL_COMPLETED`.
pub struct PollerLoop {
    monitor: Arc<dyn Monitor>,
    bus: Arc<EventBus>,
    in_flight: Arc<AtomicBool>,
}

impl PollerLoop {
    /// Build a poller for `monitor`, publishing results onto `bus`.
    pub fn new(monitor: Arc<dyn Monitor>, bus: Arc<EventBus>) -> Self {
        Self {
            monitor,
            bus,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run one guarded poll cycle. Returns `false` without polling if a
    /// previous cycle is still running.
    pub async fn tick(&self) -> bool {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!(
                monitor = self.monitor.monitor_name(),
                "skipping poll tick, previous poll still in flight"
            );
            return false;
        }

        let _guard = InFlightGuard(self.in_flight.clone());

        self.bus.publish(
            Topic::PollStarted,
            Event::PollStarted {
                monitor: self.monitor.monitor_name(),
            },
        );

        let result = match self.monitor.poll().await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(
                    monitor = self.monitor.monitor_name(),
                    error = %err,
                    "poll failed, substituting empty hostname set"
                );
                self.bus.publish(
                    Topic::ErrorOccurred,
                    Event::ErrorOccurred {
                        source: self.monitor.monitor_name().to_string(),
                        error: err.to_string(),
                    },
                );
                PollResult::default()
            }
        };

        let hostname_count = result.hostnames.len();
        self.bus.publish(
            self.monitor.topic(),
            Event::DiscoveryUpdated {
                hostnames: result.hostnames,
                labels_by_hostname: result.labels_by_hostname,
                container_removed: result.container_removed,
            },
        );
        self.bus.publish(
            Topic::PollCompleted,
            Event::PollCompleted {
                monitor: self.monitor.monitor_name(),
                hostname_count,
            },
        );

        true
    }

    /// Spawn a task that calls [`Self::tick`] every `interval`, until the
    /// returned handle is dropped/aborted.
    pub fn spawn(self: Arc<Self>, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }
}

struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingMonitor {
        calls: Arc<AtomicUsize>,
        delay: std::time::Duration,
    }

    #[async_trait]
    impl Monitor for CountingMonitor {
        async fn poll(&self) -> Result<PollResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(PollResult::default())
        }

        fn topic(&self) -> Topic {
            Topic::LabelsUpdated
        }

        fn monitor_name(&self) -> &'static str {
            "counting"
        }
    }

    #[tokio::test]
    async fn concurrent_ticks_are_coalesced() {
        let calls = Arc::new(AtomicUsize::new(0));
        let monitor = Arc::new(CountingMonitor {
            calls: calls.clone(),
            delay: std::time::Duration::from_millis(50),
        });
        let bus = Arc::new(EventBus::new());
        let poller = Arc::new(PollerLoop::new(monitor, bus));

        let p1 = poller.clone();
        let p2 = poller.clone();
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { p1.tick().await }),
            tokio::spawn(async move { p2.tick().await }),
        );

        let ran = [r1.unwrap(), r2.unwrap()].into_iter().filter(|b| *b).count();
        assert_eq!(ran, 1, "exactly one tick should have actually polled");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
