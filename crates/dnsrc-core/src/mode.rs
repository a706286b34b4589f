//! Mode Switcher: activates exactly one of the router/direct discovery
//! monitors at a time, swapping on startup and whenever `operationMode`
//! changes.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use crate::bus::{Event, EventBus, Topic};
use crate::config::{ConfigManager, OperationMode};
use crate::traits::{Monitor, PollerLoop};

struct ActiveState {
    mode: OperationMode,
    handle: Option<tokio::task::JoinHandle<()>>,
}

/// Owns both monitor instances and keeps exactly one polling at a time.
pub struct ModeSwitcher {
    router_monitor: Arc<dyn Monitor>,
    direct_monitor: Arc<dyn Monitor>,
    bus: Arc<EventBus>,
    config: Arc<ConfigManager>,
    active: StdMutex<ActiveState>,
}

impl ModeSwitcher {
    /// Build a switcher over both monitors; neither is started yet.
    pub fn new(
        router_monitor: Arc<dyn Monitor>,
        direct_monitor: Arc<dyn Monitor>,
        bus: Arc<EventBus>,
        config: Arc<ConfigManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            router_monitor,
            direct_monitor,
            bus,
            config,
            active: StdMutex::new(ActiveState {
                mode: OperationMode::Direct,
                handle: None,
            }),
        })
    }

    /// Activate the configured mode's monitor and subscribe to future
    /// `operationMode` changes.
    pub fn init(self: &Arc<Self>) {
        let mode = self.config.current().operation_mode;
        self.activate(mode);

        let switcher = self.clone();
        self.config.on_change(move |change| {
            if change.key == "operationMode" {
                switcher.switch_to(change.new.operation_mode);
            }
        });
    }

    /// Switch to `new_mode`, a no-op if it's already active.
    pub fn switch_to(self: &Arc<Self>, new_mode: OperationMode) {
        let old_mode = self.active.lock().expect("mode switcher lock poisoned").mode;
        if old_mode == new_mode {
            return;
        }

        self.activate(new_mode);

        self.bus.publish(
            Topic::OperationModeChanged,
            Event::OperationModeChanged {
                old: mode_label(old_mode).to_string(),
                new: mode_label(new_mode).to_string(),
            },
        );
    }

    fn activate(self: &Arc<Self>, mode: OperationMode) {
        let monitor = match mode {
            OperationMode::Router => self.router_monitor.clone(),
            OperationMode::Direct => self.direct_monitor.clone(),
        };
        let interval = Duration::from_millis(self.config.current().poll_interval_ms);
        let poller = Arc::new(PollerLoop::new(monitor, self.bus.clone()));
        let handle = poller.spawn(interval);

        let mut active = self.active.lock().expect("mode switcher lock poisoned");
        if let Some(old_handle) = active.handle.take() {
            old_handle.abort();
        }
        active.mode = mode;
        active.handle = Some(handle);
    }

    /// Currently active mode.
    pub fn current_mode(&self) -> OperationMode {
        self.active.lock().expect("mode switcher lock poisoned").mode
    }
}

fn mode_label(mode: OperationMode) -> &'static str {
    match mode {
        OperationMode::Router => "router",
        OperationMode::Direct => "direct",
    }
}
