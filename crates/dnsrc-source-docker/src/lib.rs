//! Container-label monitor for the DNS reconciliation controller.
//!
//! Talks to the Docker Engine API over its Unix domain socket directly:
//! one request to list running containers at startup, then a long-lived
//! connection to `/events` that keeps a [`DockerLabelCache`] current as
//! containers start, stop, and get removed. [`DirectMonitor`] reads that
//! cache on every poll tick rather than re-querying Docker: poll the
//! locally cached value, let a background event listener keep it fresh.
//!
//! The transport is `hyper` over a [`hyperlocal`] Unix-socket connector,
//! the same way the reverse-proxy router monitor uses `reqwest` over TCP:
//! neither monitor hand-rolls HTTP framing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use hyper::body::HttpBody;
use hyper::{Body, Client, Request};
use hyperlocal::UnixConnector;
use serde_json::Value;
use tokio::sync::RwLock;

use dnsrc_core::bus::{Event, EventBus, Topic};
use dnsrc_core::engine::labels::extract_hostnames_from_labels;
use dnsrc_core::error::{Error, Result};
use dnsrc_core::traits::monitor::{LabelMap, Monitor, MonitorFactory, PollResult};

const DEFAULT_SOCKET_PATH: &str = "/var/run/docker.sock";
const DEFAULT_GENERIC_PREFIX: &str = "dns.";
const RECONNECT_BACKOFF: std::time::Duration = std::time::Duration::from_secs(2);

/// A container's identity and labels, as reported by the Docker Engine API.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    /// Full container id.
    pub id: String,
    /// Primary container name (leading `/` stripped).
    pub name: String,
    /// Container labels.
    pub labels: HashMap<String, String>,
}

/// Live cache of running containers, kept current by [`DockerEventListener`]
/// and read by both [`DirectMonitor`] and, for its label-join step, the
/// router monitor.
#[derive(Default)]
pub struct DockerLabelCache {
    containers: RwLock<HashMap<String, ContainerInfo>>,
}

impl DockerLabelCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire cache contents, used to seed it from an initial
    /// `/containers/json` listing.
    pub async fn replace_all(&self, containers: Vec<ContainerInfo>) {
        let mut guard = self.containers.write().await;
        guard.clear();
        for c in containers {
            guard.insert(c.id.clone(), c);
        }
    }

    /// Insert or update a single container's entry.
    pub async fn upsert(&self, container: ContainerInfo) {
        self.containers.write().await.insert(container.id.clone(), container);
    }

    /// Remove a container's entry, e.g. on `die`/`destroy`.
    pub async fn remove(&self, id: &str) {
        self.containers.write().await.remove(id);
    }

    /// A point-in-time snapshot of every cached container.
    pub async fn snapshot(&self) -> Vec<ContainerInfo> {
        self.containers.read().await.values().cloned().collect()
    }

    /// Labels for a container by name, if cached.
    pub async fn labels_for_name(&self, name: &str) -> Option<HashMap<String, String>> {
        self.containers
            .read()
            .await
            .values()
            .find(|c| c.name == name)
            .map(|c| c.labels.clone())
    }
}

/// HTTP-over-Unix-socket client for the Docker Engine API, backed by
/// `hyper` and a [`hyperlocal::UnixConnector`].
pub struct DockerClient {
    client: Client<UnixConnector>,
    socket_path: String,
}

impl DockerClient {
    /// Build a client talking to the socket at `socket_path`.
    pub fn new(socket_path: impl Into<String>) -> Self {
        Self {
            client: Client::builder().build(UnixConnector),
            socket_path: socket_path.into(),
        }
    }

    fn request(&self, path: &str, keep_alive: bool) -> Result<Request<Body>> {
        let uri: hyper::Uri = hyperlocal::Uri::new(&self.socket_path, path).into();
        let mut builder = Request::get(uri).header("Accept", "application/json");
        if !keep_alive {
            builder = builder.header("Connection", "close");
        }
        builder
            .body(Body::empty())
            .map_err(|e| Error::monitor(format!("building docker request for {path}: {e}")))
    }

    /// Issue a `GET` against `path` and return the fully-buffered response
    /// body, with any `Transfer-Encoding: chunked` framing already decoded
    /// by `hyper`.
    async fn get(&self, path: &str) -> Result<String> {
        let req = self.request(path, false)?;
        let res = self
            .client
            .request(req)
            .await
            .map_err(|e| Error::monitor(format!("requesting {path} from docker socket {}: {e}", self.socket_path)))?;
        let body = hyper::body::to_bytes(res.into_body())
            .await
            .map_err(|e| Error::monitor(format!("reading docker response body for {path}: {e}")))?;
        Ok(String::from_utf8_lossy(&body).to_string())
    }

    /// Open a long-lived `GET` connection and return its body as a stream,
    /// for callers that read the response incrementally rather than buffer
    /// it whole (the `/events` feed).
    async fn open_stream(&self, path: &str) -> Result<Body> {
        let req = self.request(path, true)?;
        let res = self
            .client
            .request(req)
            .await
            .map_err(|e| Error::monitor(format!("connecting to docker socket {}: {e}", self.socket_path)))?;
        Ok(res.into_body())
    }

    /// List every running container.
    pub async fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        let body = self.get("/containers/json?all=false").await?;
        let value: Value = serde_json::from_str(&body)?;
        let entries = value
            .as_array()
            .ok_or_else(|| Error::monitor("unexpected /containers/json response shape"))?;

        Ok(entries.iter().filter_map(parse_container_summary).collect())
    }
}

fn parse_container_summary(entry: &Value) -> Option<ContainerInfo> {
    let id = entry.get("Id")?.as_str()?.to_string();
    let name = entry
        .get("Names")
        .and_then(|n| n.as_array())
        .and_then(|names| names.first())
        .and_then(|n| n.as_str())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| id.clone());
    let labels = entry
        .get("Labels")
        .and_then(|l| l.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    Some(ContainerInfo { id, name, labels })
}

/// Pull every complete `{...}` JSON object off the front of `pending`,
/// draining only the bytes consumed and leaving a chunk-boundary-split
/// trailing object (size prefix included, since `hyper` already strips
/// chunked-transfer framing before this code ever sees the bytes) in place
/// for the next read to complete. Whitespace between objects is skipped;
/// invalid UTF-8 at the tail (a multi-byte character split across reads)
/// is left in `pending` rather than consumed.
fn drain_complete_events(pending: &mut Vec<u8>) -> Vec<Value> {
    let mut values = Vec::new();
    let mut consumed = 0usize;

    loop {
        let rest = &pending[consumed..];
        let text = match std::str::from_utf8(rest) {
            Ok(t) => t,
            Err(e) if e.valid_up_to() > 0 => std::str::from_utf8(&rest[..e.valid_up_to()]).expect("validated prefix"),
            Err(_) => break,
        };

        let Some(start) = text.find(|c: char| !c.is_whitespace()) else {
            consumed += text.len();
            break;
        };

        match extract_balanced_object(&text[start..]) {
            Some(obj) => {
                if let Ok(v) = serde_json::from_str::<Value>(obj) {
                    values.push(v);
                }
                consumed += start + obj.len();
            }
            None => break,
        }
    }

    pending.drain(..consumed);
    values
}

fn extract_balanced_object(s: &str) -> Option<&str> {
    let mut depth = 0i32;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Listens to the Docker event stream and keeps a [`DockerLabelCache`]
/// current, publishing `CONTAINER_STARTED`/`STOPPED`/`DESTROYED` on the
/// bus as it goes.
pub struct DockerEventListener {
    client: Arc<DockerClient>,
    cache: Arc<DockerLabelCache>,
    bus: Arc<EventBus>,
    removal_flag: Arc<AtomicBool>,
}

impl DockerEventListener {
    /// Build a listener backed by `socket_path`, sharing `cache` with
    /// whatever [`DirectMonitor`] reads from it and `removal_flag` so the
    /// monitor can report `container_removed` on its next poll.
    pub fn new(
        socket_path: impl Into<String>,
        cache: Arc<DockerLabelCache>,
        bus: Arc<EventBus>,
        removal_flag: Arc<AtomicBool>,
    ) -> Self {
        Self {
            client: Arc::new(DockerClient::new(socket_path)),
            cache,
            bus,
            removal_flag,
        }
    }

    /// Seed the cache from a one-shot container listing. Call this once
    /// before [`Self::spawn`] so the monitor has data on its first poll.
    pub async fn seed(&self) -> Result<()> {
        let containers = self.client.list_containers().await?;
        self.cache.replace_all(containers).await;
        Ok(())
    }

    /// Spawn the event-stream task. Reconnects with a fixed backoff on any
    /// read/connect failure; never returns on its own.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Err(err) = self.run_once().await {
                    tracing::warn!(error = %err, "docker event stream disconnected, reconnecting");
                }
                tokio::time::sleep(RECONNECT_BACKOFF).await;
            }
        })
    }

    async fn run_once(&self) -> Result<()> {
        let mut body = self
            .client
            .open_stream("/events?filters=%7B%22type%22%3A%5B%22container%22%5D%7D")
            .await?;
        let mut pending = Vec::new();

        while let Some(chunk) = body.data().await {
            let chunk = chunk.map_err(|e| Error::monitor(format!("reading docker event stream: {e}")))?;
            pending.extend_from_slice(&chunk);
            for event in drain_complete_events(&mut pending) {
                self.handle_event(&event).await;
            }
        }

        Err(Error::monitor("docker event stream closed"))
    }

    async fn handle_event(&self, event: &Value) {
        let Some(action) = event.get("Action").and_then(|a| a.as_str()) else { return };
        let Some(id) = event
            .get("Actor")
            .and_then(|a| a.get("ID"))
            .and_then(|v| v.as_str())
            .or_else(|| event.get("id").and_then(|v| v.as_str()))
        else {
            return;
        };
        let name = event
            .get("Actor")
            .and_then(|a| a.get("Attributes"))
            .and_then(|attrs| attrs.get("name"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        match action {
            "start" => {
                let labels = event
                    .get("Actor")
                    .and_then(|a| a.get("Attributes"))
                    .and_then(|attrs| attrs.as_object())
                    .map(|obj| {
                        obj.iter()
                            .filter(|(k, _)| *k != "name")
                            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                            .collect()
                    })
                    .unwrap_or_default();
                self.cache
                    .upsert(ContainerInfo {
                        id: id.to_string(),
                        name: name.clone().unwrap_or_else(|| id.to_string()),
                        labels,
                    })
                    .await;
                self.bus.publish(
                    Topic::ContainerStarted,
                    Event::ContainerLifecycle { container_id: id.to_string(), container_name: name },
                );
            }
            "die" | "stop" | "kill" => {
                self.removal_flag.store(true, Ordering::SeqCst);
                self.bus.publish(
                    Topic::ContainerStopped,
                    Event::ContainerLifecycle { container_id: id.to_string(), container_name: name },
                );
            }
            "destroy" => {
                self.cache.remove(id).await;
                self.removal_flag.store(true, Ordering::SeqCst);
                self.bus.publish(
                    Topic::ContainerDestroyed,
                    Event::ContainerLifecycle { container_id: id.to_string(), container_name: name },
                );
            }
            _ => {}
        }
    }
}

/// Where a [`DirectMonitor`] reads its container set from.
enum Source {
    /// Read a cache kept current by a sibling [`DockerEventListener`];
    /// `container_removed` is reported from a flag the listener flips.
    Cached { cache: Arc<DockerLabelCache>, removal_flag: Arc<AtomicBool> },
    /// No listener is running (e.g. constructed via [`DirectMonitorFactory`]
    /// in isolation): query the Docker API fresh on every poll instead.
    Polling(Arc<DockerClient>),
}

/// [`Monitor`] implementation that discovers hostnames directly from
/// container labels, instead of a reverse-proxy router catalog.
pub struct DirectMonitor {
    source: Source,
    generic_label_prefix: String,
}

impl DirectMonitor {
    /// Build a monitor reading from a cache a [`DockerEventListener`]
    /// keeps current.
    pub fn cached(cache: Arc<DockerLabelCache>, removal_flag: Arc<AtomicBool>, generic_label_prefix: impl Into<String>) -> Self {
        Self {
            source: Source::Cached { cache, removal_flag },
            generic_label_prefix: generic_label_prefix.into(),
        }
    }

    /// Build a monitor that queries the Docker API directly on every poll,
    /// with no event-driven cache backing it.
    pub fn polling(socket_path: impl Into<String>, generic_label_prefix: impl Into<String>) -> Self {
        Self {
            source: Source::Polling(Arc::new(DockerClient::new(socket_path))),
            generic_label_prefix: generic_label_prefix.into(),
        }
    }

    fn build_result(containers: &[ContainerInfo], generic_label_prefix: &str, container_removed: bool) -> PollResult {
        let mut hostnames = Vec::new();
        let mut labels_by_hostname: HashMap<String, LabelMap> = HashMap::new();

        for container in containers {
            for hostname in extract_hostnames_from_labels(&container.labels, generic_label_prefix) {
                labels_by_hostname.entry(hostname.clone()).or_insert_with(|| container.labels.clone());
                hostnames.push(hostname);
            }
        }
        hostnames.sort();
        hostnames.dedup();

        PollResult { hostnames, labels_by_hostname, container_removed }
    }
}

#[async_trait]
impl Monitor for DirectMonitor {
    async fn poll(&self) -> Result<PollResult> {
        match &self.source {
            Source::Cached { cache, removal_flag } => {
                let containers = cache.snapshot().await;
                let container_removed = removal_flag.swap(false, Ordering::SeqCst);
                Ok(Self::build_result(&containers, &self.generic_label_prefix, container_removed))
            }
            Source::Polling(client) => {
                let containers = client.list_containers().await?;
                Ok(Self::build_result(&containers, &self.generic_label_prefix, false))
            }
        }
    }

    fn topic(&self) -> Topic {
        Topic::LabelsUpdated
    }

    fn monitor_name(&self) -> &'static str {
        "docker-direct"
    }
}

/// Factory constructing a standalone, polling [`DirectMonitor`] from
/// `{"socket_path": "...", "generic_label_prefix": "..."}`. A daemon
/// wanting the event-driven cache variant constructs
/// [`DockerLabelCache`]/[`DockerEventListener`]/[`DirectMonitor::cached`]
/// directly, since wiring an event listener needs the shared event bus
/// that this trait's `create` signature doesn't carry.
pub struct DirectMonitorFactory;

impl MonitorFactory for DirectMonitorFactory {
    fn create(&self, config: &Value) -> Result<Box<dyn Monitor>> {
        let socket_path = config
            .get("socket_path")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_SOCKET_PATH);
        let generic_label_prefix = config
            .get("generic_label_prefix")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_GENERIC_PREFIX);

        Ok(Box::new(DirectMonitor::polling(socket_path, generic_label_prefix)))
    }
}

/// Register the Docker direct-mode monitor with a registry.
pub fn register(registry: &dnsrc_core::registry::ComponentRegistry) {
    registry.register_monitor("docker", Box::new(DirectMonitorFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(id: &str, labels: &[(&str, &str)]) -> ContainerInfo {
        ContainerInfo {
            id: id.to_string(),
            name: id.to_string(),
            labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn factory_creation_succeeds_with_defaults() {
        let factory = DirectMonitorFactory;
        let monitor = factory.create(&serde_json::json!({}));
        assert!(monitor.is_ok());
    }

    #[test]
    fn drain_complete_events_handles_one_object() {
        let mut pending = br#"{"Action":"start","Actor":{"ID":"abc"}}"#.to_vec();
        let values = drain_complete_events(&mut pending);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["Action"], "start");
        assert!(pending.is_empty());
    }

    #[test]
    fn drain_complete_events_recovers_concatenated_objects() {
        let mut pending = br#"{"Action":"start","Actor":{"ID":"a"}}{"Action":"die","Actor":{"ID":"b"}}"#.to_vec();
        let values = drain_complete_events(&mut pending);
        assert_eq!(values.len(), 2);
        assert_eq!(values[0]["Action"], "start");
        assert_eq!(values[1]["Action"], "die");
        assert!(pending.is_empty());
    }

    #[test]
    fn drain_complete_events_leaves_a_split_object_for_the_next_read() {
        let mut pending = br#"{"Action":"start","Actor":{"ID":"a"}}{"Action":"di"#.to_vec();
        let values = drain_complete_events(&mut pending);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["Action"], "start");
        assert_eq!(pending, br#"{"Action":"di"#);

        pending.extend_from_slice(br#"e","Actor":{"ID":"b"}}"#);
        let values = drain_complete_events(&mut pending);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["Action"], "die");
        assert!(pending.is_empty());
    }

    #[test]
    fn drain_complete_events_waits_on_garbage_with_no_closing_brace() {
        let mut pending = b"not json at all".to_vec();
        let values = drain_complete_events(&mut pending);
        assert!(values.is_empty());
        assert_eq!(pending, b"not json at all");
    }

    #[tokio::test]
    async fn direct_monitor_builds_result_from_cache() {
        let cache = Arc::new(DockerLabelCache::new());
        cache
            .replace_all(vec![container("1", &[("dns.hostname", "api.example.com")])])
            .await;
        let removal_flag = Arc::new(AtomicBool::new(true));
        let monitor = DirectMonitor::cached(cache, removal_flag, "dns.".to_string());

        let result = monitor.poll().await.unwrap();
        assert_eq!(result.hostnames, vec!["api.example.com"]);
        assert!(result.container_removed);

        // The flag is consumed on read.
        let result2 = monitor.poll().await.unwrap();
        assert!(!result2.container_removed);
    }

    #[test]
    fn parse_container_summary_strips_leading_slash() {
        let raw = serde_json::json!({
            "Id": "abc123",
            "Names": ["/web-1"],
            "Labels": {"dns.hostname": "web.example.com"}
        });
        let info = parse_container_summary(&raw).unwrap();
        assert_eq!(info.name, "web-1");
        assert_eq!(info.labels.get("dns.hostname"), Some(&"web.example.com".to_string()));
    }
}
