// # dnsrcd - DNS Reconciliation Daemon
//
// This binary is a THIN integration layer: it reads environment
// configuration, wires the registered monitor/provider/tracker
// implementations together, and runs the reconciler until a shutdown
// signal arrives. No reconciliation logic lives here; that's owned by
// `dnsrc-core`.
//
// ## Configuration
//
// All configuration is via environment variables:
//
// ### Provider
// - `DNSRC_PROVIDER_TYPE`: provider type (default: cloudflare)
// - `DNSRC_PROVIDER_API_TOKEN`: provider API token (required)
// - `DNSRC_PROVIDER_DOMAIN`: zone/domain the provider manages (required)
// - `DNSRC_PROVIDER_ZONE_ID`: pre-known zone id (optional, else auto-discovered)
// - `DNSRC_DRY_RUN`: log intended changes without applying them (default: false)
//
// ### Discovery
// - `DNSRC_OPERATION_MODE`: `router` or `direct` (default: router)
// - `DNSRC_ROUTER_API_URL`: router catalog endpoint (required in router mode)
// - `DNSRC_ROUTER_AUTH_USERNAME` / `DNSRC_ROUTER_AUTH_PASSWORD`: optional basic auth
// - `DNSRC_DOCKER_SOCKET_PATH`: Docker Engine API socket (default: /var/run/docker.sock)
// - `DNSRC_POLL_INTERVAL_MS`: monitor poll cadence (default: 30000)
//
// ### Records
// - `DNSRC_DEFAULT_MANAGE`: opt-in (false) vs opt-out (true) management (default: false)
// - `DNSRC_GENERIC_LABEL_PREFIX`: generic label namespace (default: "dns.")
// - `DNSRC_PROVIDER_LABEL_PREFIX`: provider-qualified label namespace
// - `DNSRC_DEFAULT_RECORD_TYPE`, `DNSRC_DEFAULT_TTL`, `DNSRC_DEFAULT_PROXIED`
// - `DNSRC_PRESERVED_HOSTNAMES`: comma-separated, `*.suffix` wildcards allowed
// - `DNSRC_CLEANUP_ORPHANED`: enable orphan garbage collection (default: true)
// - `DNSRC_CLEANUP_GRACE_MINUTES`: minutes before deleting an orphan (default: 60)
//
// ### State store
// - `DNSRC_STATE_STORE_TYPE`: `file` or `memory` (default: file)
// - `DNSRC_STATE_STORE_PATH`: path to the tracker file (required for `file`)
//
// ### Ambient
// - `DNSRC_API_TIMEOUT_SECS`: outbound HTTP timeout (default: 10)
// - `DNSRC_ACTIVITY_LOG_CAPACITY`: entries retained in the activity log (default: 500)
// - `DNSRC_LOG_LEVEL`: trace/debug/info/warn/error (default: info)
//
// ## Example
//
// ```bash
// export DNSRC_PROVIDER_API_TOKEN=your_token
// export DNSRC_PROVIDER_DOMAIN=example.com
// export DNSRC_OPERATION_MODE=router
// export DNSRC_ROUTER_API_URL=http://router.internal/api/http/routers
// export DNSRC_STATE_STORE_PATH=/var/lib/dnsrc/state.json
//
// dnsrcd
// ```

use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use dnsrc_core::config::{OperationMode, RecordDefaults, ReconcilerConfig, RouterAuth};
use dnsrc_core::{ActivityLog, ComponentRegistry, ConfigManager, DnsManager, MemoryRecordTracker, ModeSwitcher, Monitor, RecordTracker, RecordType};

use dnsrc_source_docker::{DirectMonitor, DockerEventListener, DockerLabelCache};
use dnsrc_source_router::RouterMonitor;

/// Exit codes, following systemd conventions.
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon-level configuration, loaded from the environment.
struct Config {
    provider_type: String,
    provider_api_token: String,
    provider_domain: String,
    provider_zone_id: Option<String>,
    dry_run: bool,

    operation_mode: OperationMode,
    router_api_url: Option<String>,
    router_auth: Option<RouterAuth>,
    docker_socket_path: String,
    poll_interval_ms: u64,

    default_manage: bool,
    generic_label_prefix: String,
    provider_label_prefix: String,
    default_record_type: RecordType,
    default_ttl: u32,
    default_proxied: bool,
    preserved_hostnames: Vec<String>,
    cleanup_orphaned: bool,
    cleanup_grace_period_minutes: u64,

    state_store_type: String,
    state_store_path: Option<String>,

    api_timeout_secs: u64,
    activity_log_capacity: usize,
    log_level: String,
}

impl Config {
    fn from_env() -> Result<Self> {
        let operation_mode = match env::var("DNSRC_OPERATION_MODE").unwrap_or_else(|_| "router".to_string()).as_str() {
            "router" => OperationMode::Router,
            "direct" => OperationMode::Direct,
            other => bail!("DNSRC_OPERATION_MODE '{other}' is not supported. Supported: router, direct"),
        };

        let router_auth = match (env::var("DNSRC_ROUTER_AUTH_USERNAME").ok(), env::var("DNSRC_ROUTER_AUTH_PASSWORD").ok()) {
            (Some(username), Some(password)) => Some(RouterAuth { username, password }),
            _ => None,
        };

        let default_record_type = match env::var("DNSRC_DEFAULT_RECORD_TYPE").unwrap_or_else(|_| "A".to_string()).to_uppercase().as_str() {
            "A" => RecordType::A,
            "AAAA" => RecordType::Aaaa,
            "CNAME" => RecordType::Cname,
            other => bail!("DNSRC_DEFAULT_RECORD_TYPE '{other}' is not supported. Supported: A, AAAA, CNAME"),
        };

        Ok(Self {
            provider_type: env::var("DNSRC_PROVIDER_TYPE").unwrap_or_else(|_| "cloudflare".to_string()),
            provider_api_token: env::var("DNSRC_PROVIDER_API_TOKEN").context("DNSRC_PROVIDER_API_TOKEN is required")?,
            provider_domain: env::var("DNSRC_PROVIDER_DOMAIN").context("DNSRC_PROVIDER_DOMAIN is required")?,
            provider_zone_id: env::var("DNSRC_PROVIDER_ZONE_ID").ok(),
            dry_run: env::var("DNSRC_DRY_RUN").ok().map(|v| v == "true" || v == "1").unwrap_or(false),

            operation_mode,
            router_api_url: env::var("DNSRC_ROUTER_API_URL").ok(),
            router_auth,
            docker_socket_path: env::var("DNSRC_DOCKER_SOCKET_PATH").unwrap_or_else(|_| "/var/run/docker.sock".to_string()),
            poll_interval_ms: env::var("DNSRC_POLL_INTERVAL_MS").ok().and_then(|s| s.parse().ok()).unwrap_or(30_000),

            default_manage: env::var("DNSRC_DEFAULT_MANAGE").ok().map(|v| v == "true" || v == "1").unwrap_or(false),
            generic_label_prefix: env::var("DNSRC_GENERIC_LABEL_PREFIX").unwrap_or_else(|_| "dns.".to_string()),
            provider_label_prefix: env::var("DNSRC_PROVIDER_LABEL_PREFIX").unwrap_or_default(),
            default_record_type,
            default_ttl: env::var("DNSRC_DEFAULT_TTL").ok().and_then(|s| s.parse().ok()).unwrap_or(300),
            default_proxied: env::var("DNSRC_DEFAULT_PROXIED").ok().map(|v| v == "true" || v == "1").unwrap_or(false),
            preserved_hostnames: env::var("DNSRC_PRESERVED_HOSTNAMES")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            cleanup_orphaned: env::var("DNSRC_CLEANUP_ORPHANED").ok().map(|v| v != "false" && v != "0").unwrap_or(true),
            cleanup_grace_period_minutes: env::var("DNSRC_CLEANUP_GRACE_MINUTES").ok().and_then(|s| s.parse().ok()).unwrap_or(60),

            state_store_type: env::var("DNSRC_STATE_STORE_TYPE").unwrap_or_else(|_| "file".to_string()),
            state_store_path: env::var("DNSRC_STATE_STORE_PATH").ok(),

            api_timeout_secs: env::var("DNSRC_API_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()).unwrap_or(10),
            activity_log_capacity: env::var("DNSRC_ACTIVITY_LOG_CAPACITY").ok().and_then(|s| s.parse().ok()).unwrap_or(500),
            log_level: env::var("DNSRC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration, rejecting unknown or inconsistent settings.
    fn validate(&self) -> Result<()> {
        if self.provider_api_token.is_empty() {
            bail!("DNSRC_PROVIDER_API_TOKEN cannot be empty");
        }
        if self.provider_api_token.len() < 20 {
            bail!("DNSRC_PROVIDER_API_TOKEN appears too short ({} chars)", self.provider_api_token.len());
        }

        self.validate_domain_name(&self.provider_domain)?;

        match self.provider_type.as_str() {
            "cloudflare" => {}
            other => bail!("DNSRC_PROVIDER_TYPE '{other}' is not supported. Supported: cloudflare"),
        }

        if self.operation_mode == OperationMode::Router && self.router_api_url.as_ref().is_none_or(|u| u.is_empty()) {
            bail!("DNSRC_ROUTER_API_URL is required when DNSRC_OPERATION_MODE=router");
        }

        match self.state_store_type.as_str() {
            "file" => {
                let path = self
                    .state_store_path
                    .as_ref()
                    .filter(|p| !p.is_empty())
                    .context("DNSRC_STATE_STORE_PATH is required when DNSRC_STATE_STORE_TYPE=file")?;
                if let Some(parent) = std::path::Path::new(path).parent()
                    && !parent.as_os_str().is_empty()
                    && !parent.exists()
                {
                    bail!("DNSRC_STATE_STORE_PATH parent directory does not exist: {}", parent.display());
                }
            }
            "memory" => {}
            other => bail!("DNSRC_STATE_STORE_TYPE '{other}' is not supported. Supported: file, memory"),
        }

        if self.poll_interval_ms == 0 {
            bail!("DNSRC_POLL_INTERVAL_MS must be > 0");
        }
        if self.api_timeout_secs == 0 {
            bail!("DNSRC_API_TIMEOUT_SECS must be > 0");
        }

        for hostname in &self.preserved_hostnames {
            self.validate_domain_name(hostname.trim_start_matches("*."))?;
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => bail!("DNSRC_LOG_LEVEL '{other}' is not valid"),
        }

        Ok(())
    }

    /// Basic RFC 1035 domain-name validation.
    fn validate_domain_name(&self, domain: &str) -> Result<()> {
        if domain.is_empty() || domain.len() > 253 {
            bail!("invalid domain name length: '{domain}'");
        }
        for label in domain.split('.') {
            if label.is_empty() || label.len() > 63 {
                bail!("invalid domain label: '{label}' in '{domain}'");
            }
            if !label.chars().all(|c| c.is_alphanumeric() || c == '-') || label.starts_with('-') || label.ends_with('-') {
                bail!("invalid characters in domain label: '{label}' in '{domain}'");
            }
        }
        Ok(())
    }

    fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            poll_interval_ms: self.poll_interval_ms,
            operation_mode: self.operation_mode,
            dns_provider: self.provider_type.clone(),
            provider_domain: self.provider_domain.clone(),
            default_manage: self.default_manage,
            defaults: RecordDefaults {
                default_type: self.default_record_type,
                default_ttl: self.default_ttl,
                default_proxied: self.default_proxied,
            },
            cleanup_orphaned: self.cleanup_orphaned,
            cleanup_grace_period_minutes: self.cleanup_grace_period_minutes,
            generic_label_prefix: self.generic_label_prefix.clone(),
            provider_label_prefix: self.provider_label_prefix.clone(),
            router_api_url: self.router_api_url.clone(),
            router_auth: self.router_auth.clone(),
            api_timeout_secs: self.api_timeout_secs,
            preserved_hostnames: self.preserved_hostnames.clone(),
            metadata: Default::default(),
        }
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            return DaemonExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {e:#}");
        return DaemonExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
        return DaemonExitCode::ConfigError.into();
    }

    info!("Starting dnsrcd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {e}");
            return DaemonExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => DaemonExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {e:#}");
                DaemonExitCode::RuntimeError
            }
        }
    });

    result.into()
}

async fn run_daemon(config: Config) -> Result<()> {
    let registry = ComponentRegistry::new();
    dnsrc_provider_cloudflare::register(&registry);
    dnsrc_source_router::register(&registry);
    dnsrc_source_docker::register(&registry);

    let provider_config = serde_json::json!({
        "api_token": config.provider_api_token,
        "domain": config.provider_domain,
        "zone_id": config.provider_zone_id,
        "dry_run": config.dry_run,
    });
    let provider = Arc::from(
        registry
            .create_provider(&config.provider_type, &provider_config)
            .context("failed to construct DNS provider")?,
    );

    let tracker: Arc<dyn RecordTracker> = match config.state_store_type.as_str() {
        "file" => {
            let path = config.state_store_path.clone().expect("validated: path present for file store");
            Arc::new(
                dnsrc_core::FileRecordTracker::new(path, config.preserved_hostnames.clone(), Vec::new())
                    .await
                    .context("failed to open record tracker file")?,
            )
        }
        _ => Arc::new(MemoryRecordTracker::with_lists(config.preserved_hostnames.clone(), Vec::new())),
    };

    let bus = Arc::new(dnsrc_core::EventBus::new());
    let config_manager = Arc::new(ConfigManager::new(config.reconciler_config()));

    let docker_label_cache = Arc::new(DockerLabelCache::new());
    let container_removal_flag = Arc::new(AtomicBool::new(false));
    let event_listener = Arc::new(DockerEventListener::new(
        config.docker_socket_path.clone(),
        docker_label_cache.clone(),
        bus.clone(),
        container_removal_flag.clone(),
    ));

    let direct_monitor: Arc<dyn Monitor> = Arc::new(DirectMonitor::cached(
        docker_label_cache.clone(),
        container_removal_flag,
        config.generic_label_prefix.clone(),
    ));

    let router_monitor: Arc<dyn Monitor> = Arc::new(RouterMonitor::new(
        config.router_api_url.clone().unwrap_or_default(),
        config.router_auth.clone(),
        Duration::from_secs(config.api_timeout_secs),
        Some(docker_label_cache),
    ));

    let mode_switcher = ModeSwitcher::new(router_monitor, direct_monitor, bus.clone(), config_manager.clone());
    mode_switcher.init();

    let manager = Arc::new(DnsManager::new(provider, tracker, bus.clone(), config_manager.clone()));
    manager.init().await.context("provider init / managed-hostname reconcile failed")?;
    manager.subscribe();

    let activity_log = Arc::new(ActivityLog::new(config.activity_log_capacity));
    activity_log.subscribe(&bus, chrono::Utc::now);

    if let Err(e) = event_listener.seed().await {
        warn!(error = %e, "initial container label seed failed, continuing with an empty cache");
    }
    let event_listener_handle = event_listener.spawn();

    info!(mode = ?config.operation_mode, "dnsrcd initialized and running");

    let signal = wait_for_shutdown().await?;
    info!(signal = %signal, "received shutdown signal, shutting down");

    event_listener_handle.abort();

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c().await.context("failed to wait for CTRL-C")?;
    Ok("CTRL-C")
}
