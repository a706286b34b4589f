//! Typed in-process publish/subscribe event bus with last-event replay.
//!
//! A `Topic -> Vec<Subscriber>` broker guarded by the same
//! `RwLock<HashMap<..>>` shape the provider/monitor/tracker registry uses.
//! Delivery is synchronous on the publisher's task: handlers for a topic
//! run in subscription order, and a handler that returns an error is
//! logged and triggers a republish on `ERROR_OCCURRED` without blocking
//! its siblings.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::engine::ReconcileStats;
use crate::traits::monitor::LabelMap;
use crate::traits::ProviderRecord;

/// Recognized bus topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Router-mode discovery completed.
    RoutersUpdated,
    /// Direct-mode discovery completed.
    LabelsUpdated,
    /// A container started.
    ContainerStarted,
    /// A container stopped.
    ContainerStopped,
    /// A container was destroyed/removed.
    ContainerDestroyed,
    /// A monitor poll began.
    PollStarted,
    /// A monitor poll finished.
    PollCompleted,
    /// The reconciler finished processing a hostname batch.
    DnsRecordsUpdated,
    /// A single DNS record was created.
    DnsRecordCreated,
    /// A single DNS record was updated.
    DnsRecordUpdated,
    /// A single DNS record was deleted.
    DnsRecordDeleted,
    /// The active operation mode changed.
    OperationModeChanged,
    /// A handler or pipeline stage reported an error.
    ErrorOccurred,
}

/// Payload carried by a bus event. One variant per recognized topic;
/// [`EventBus::publish`] pairs a [`Topic`] with the matching variant.
#[derive(Debug, Clone)]
pub enum Event {
    /// Discovery result from a monitor poll (`ROUTERS_UPDATED`/`LABELS_UPDATED`).
    DiscoveryUpdated {
        /// Every hostname discovered this poll.
        hostnames: Vec<String>,
        /// Labels keyed by hostname.
        labels_by_hostname: HashMap<String, LabelMap>,
        /// Set when this event was triggered by a container disappearing.
        container_removed: bool,
    },
    /// Container lifecycle transition (`CONTAINER_STARTED/STOPPED/DESTROYED`).
    ContainerLifecycle {
        /// Docker container id.
        container_id: String,
        /// Container name, when known.
        container_name: Option<String>,
    },
    /// A monitor began a poll cycle.
    PollStarted {
        /// Static monitor name.
        monitor: &'static str,
    },
    /// A monitor finished a poll cycle.
    PollCompleted {
        /// Static monitor name.
        monitor: &'static str,
        /// Number of hostnames discovered.
        hostname_count: usize,
    },
    /// The reconciler finished a `processHostnames` batch.
    DnsRecordsUpdated {
        /// Aggregated run stats.
        stats: ReconcileStats,
        /// Hostnames processed in this batch.
        processed_hostnames: Vec<String>,
    },
    /// A single record was created.
    DnsRecordCreated(ProviderRecord),
    /// A single record was updated.
    DnsRecordUpdated(ProviderRecord),
    /// A single record was deleted.
    DnsRecordDeleted {
        /// The deleted record's FQDN.
        name: String,
        /// The deleted record's type.
        record_type: crate::traits::RecordType,
    },
    /// The active operation mode changed.
    OperationModeChanged {
        /// Previous mode, as its config string.
        old: String,
        /// New mode, as its config string.
        new: String,
    },
    /// An error occurred somewhere in the pipeline.
    ErrorOccurred {
        /// Where the error originated (component name).
        source: String,
        /// Human-readable error description.
        error: String,
    },
}

/// A subscription handler. Returning `Err` logs the error and republishes it
/// on `ERROR_OCCURRED`, without stopping sibling handlers from running.
pub type Handler = Box<dyn Fn(&Event) -> Result<(), String> + Send + Sync>;

struct Subscription {
    id: u64,
    handler: Handler,
}

/// An opaque handle returned by [`EventBus::subscribe`]; drop or pass to
/// [`EventBus::unsubscribe`] to stop receiving events.
pub struct SubscriptionId(Topic, u64);

#[derive(Default)]
struct Inner {
    subscribers: HashMap<Topic, Vec<Arc<Subscription>>>,
    last_event: HashMap<Topic, Event>,
}

/// The event bus itself.
pub struct EventBus {
    inner: RwLock<Inner>,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create an empty bus with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `handler` for `topic`. Handlers for the same topic run in
    /// subscription order.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) -> Result<(), String> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.write().expect("bus lock poisoned");
        inner
            .subscribers
            .entry(topic)
            .or_default()
            .push(Arc::new(Subscription {
                id,
                handler: Box::new(handler),
            }));
        SubscriptionId(topic, id)
    }

    /// Remove a previously-registered subscription.
    pub fn unsubscribe(&self, subscription: SubscriptionId) {
        let SubscriptionId(topic, id) = subscription;
        let mut inner = self.inner.write().expect("bus lock poisoned");
        if let Some(subs) = inner.subscribers.get_mut(&topic) {
            subs.retain(|s| s.id != id);
        }
    }

    /// Return the last payload published on `topic`, if any.
    pub fn last_event(&self, topic: Topic) -> Option<Event> {
        self.inner
            .read()
            .expect("bus lock poisoned")
            .last_event
            .get(&topic)
            .cloned()
    }

    /// Publish `event` on `topic`, invoking every subscriber in registration
    /// order. A subscriber returning `Err` is logged and triggers a
    /// republish on `ERROR_OCCURRED`, but never stops remaining subscribers
    /// from running. Publishing on `ERROR_OCCURRED` itself never recurses,
    /// even if an `ERROR_OCCURRED` handler also errors.
    pub fn publish(&self, topic: Topic, event: Event) {
        let subs = {
            let mut inner = self.inner.write().expect("bus lock poisoned");
            inner.last_event.insert(topic, event.clone());
            inner.subscribers.get(&topic).cloned().unwrap_or_default()
        };

        let mut errors = Vec::new();
        for sub in &subs {
            if let Err(err) = (sub.handler)(&event) {
                tracing::error!(topic = ?topic, error = %err, "bus handler failed");
                errors.push(err);
            }
        }

        // Republishing happens after every subscriber has run, so one
        // failing handler never prevents its siblings from being invoked.
        if topic != Topic::ErrorOccurred {
            for err in errors {
                self.publish(
                    Topic::ErrorOccurred,
                    Event::ErrorOccurred {
                        source: format!("{topic:?}"),
                        error: err,
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(RwLock::new(Vec::new()));

        let o1 = order.clone();
        bus.subscribe(Topic::PollStarted, move |_| {
            o1.write().unwrap().push(1);
            Ok(())
        });
        let o2 = order.clone();
        bus.subscribe(Topic::PollStarted, move |_| {
            o2.write().unwrap().push(2);
            Ok(())
        });

        bus.publish(Topic::PollStarted, Event::PollStarted { monitor: "test" });

        assert_eq!(*order.read().unwrap(), vec![1, 2]);
    }

    #[test]
    fn handler_error_does_not_block_siblings_and_republishes() {
        let bus = EventBus::new();
        let ran = Arc::new(AtomicUsize::new(0));

        bus.subscribe(Topic::PollStarted, |_| Err("boom".to_string()));
        let ran2 = ran.clone();
        bus.subscribe(Topic::PollStarted, move |_| {
            ran2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(Topic::PollStarted, Event::PollStarted { monitor: "test" });

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        let last_error = bus.last_event(Topic::ErrorOccurred);
        assert!(matches!(last_error, Some(Event::ErrorOccurred { .. })));
    }

    #[test]
    fn last_event_replays_latest_payload() {
        let bus = EventBus::new();
        assert!(bus.last_event(Topic::PollStarted).is_none());
        bus.publish(Topic::PollStarted, Event::PollStarted { monitor: "test" });
        assert!(bus.last_event(Topic::PollStarted).is_some());
    }
}
