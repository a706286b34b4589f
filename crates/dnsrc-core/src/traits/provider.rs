// # DNS Provider Contract
//
// Defines the interface a concrete DNS provider adapter implements: record
// CRUD, an in-memory zone cache, and the batched upsert operation the
// reconciler drives.
//
// ## Implementations
//
// - Cloudflare: `dnsrc-provider-cloudflare` crate
// - Future: Route53, DigitalOcean, GoDaddy, etc.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// DNS record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    /// IPv4 address record.
    A,
    /// IPv6 address record.
    Aaaa,
    /// Canonical name record.
    Cname,
    /// Free-form text record.
    Txt,
    /// Mail exchange record.
    Mx,
    /// Service locator record.
    Srv,
    /// Certification authority authorization record.
    Caa,
    /// Name server record.
    Ns,
    /// Pointer record.
    Ptr,
}

impl RecordType {
    /// Whether this type can carry a CDN `proxied` attribute.
    ///
    /// Only A/AAAA/CNAME are ever proxy-capable; the attribute is neither
    /// sent to the provider nor compared for any other type.
    pub fn is_proxy_capable(self) -> bool {
        matches!(self, RecordType::A | RecordType::Aaaa | RecordType::Cname)
    }

    /// Whether this type is an infrastructure record that cleanup must
    /// never touch (`NS`/`SOA`/`CAA` at the zone apex and friends).
    pub fn is_infrastructure(self) -> bool {
        matches!(self, RecordType::Ns | RecordType::Caa)
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Txt => "TXT",
            RecordType::Mx => "MX",
            RecordType::Srv => "SRV",
            RecordType::Caa => "CAA",
            RecordType::Ns => "NS",
            RecordType::Ptr => "PTR",
        };
        f.write_str(s)
    }
}

/// Sentinel TTL meaning "let the provider choose automatically".
pub const TTL_AUTO: u32 = 1;

/// Desired state for a single DNS record, as derived from labels/defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Record type.
    pub record_type: RecordType,
    /// Fully-qualified record name.
    pub name: String,
    /// Record content (IP literal, target hostname, free text, etc).
    pub content: String,
    /// TTL in seconds; `>= 60` or [`TTL_AUTO`].
    pub ttl: u32,
    /// CDN proxy flag; only meaningful when [`RecordType::is_proxy_capable`].
    pub proxied: Option<bool>,
    /// MX/SRV priority.
    pub priority: Option<u16>,
    /// SRV weight.
    pub weight: Option<u16>,
    /// SRV port.
    pub port: Option<u16>,
    /// CAA flags.
    pub flags: Option<u8>,
    /// CAA tag.
    pub tag: Option<String>,
}

impl RecordConfig {
    /// Validate type-specific content syntax before submission to the
    /// provider (A → IPv4, AAAA → IPv6 lexical form, CNAME → hostname).
    pub fn validate(&self) -> Result<()> {
        match self.record_type {
            RecordType::A => {
                self.content
                    .parse::<std::net::Ipv4Addr>()
                    .map_err(|_| crate::Error::invalid_input(format!(
                        "A record {} has non-IPv4 content {:?}",
                        self.name, self.content
                    )))?;
            }
            RecordType::Aaaa => {
                self.content
                    .parse::<std::net::Ipv6Addr>()
                    .map_err(|_| crate::Error::invalid_input(format!(
                        "AAAA record {} has non-IPv6 content {:?}",
                        self.name, self.content
                    )))?;
            }
            RecordType::Cname => {
                if self.content.trim().is_empty() {
                    return Err(crate::Error::invalid_input(format!(
                        "CNAME record {} has empty target",
                        self.name
                    )));
                }
            }
            _ => {}
        }
        if self.ttl != TTL_AUTO && self.ttl < 60 {
            return Err(crate::Error::invalid_input(format!(
                "record {} has ttl {} below the minimum of 60",
                self.name, self.ttl
            )));
        }
        Ok(())
    }

    /// Type-aware equality against an observed [`ProviderRecord`], per the
    /// contract's comparison rules (verbatim content for A/AAAA/TXT,
    /// trailing-dot-normalized CNAME, structured MX/SRV fields, `auto` TTL
    /// treated as equal to anything, `proxied` compared only when
    /// proxy-capable).
    pub fn matches(&self, observed: &ProviderRecord) -> bool {
        if self.record_type != observed.record_type || self.name != observed.name {
            return false;
        }

        let content_matches = match self.record_type {
            RecordType::Cname => {
                self.content.trim_end_matches('.') == observed.content.trim_end_matches('.')
            }
            RecordType::Mx => {
                self.priority == observed.priority
                    && self.content.trim_end_matches('.') == observed.content.trim_end_matches('.')
            }
            RecordType::Srv => {
                self.priority == observed.priority
                    && self.weight == observed.weight
                    && self.port == observed.port
                    && self.content.trim_end_matches('.') == observed.content.trim_end_matches('.')
            }
            _ => self.content == observed.content,
        };
        if !content_matches {
            return false;
        }

        let ttl_matches =
            self.ttl == observed.ttl || self.ttl == TTL_AUTO || observed.ttl == TTL_AUTO;
        if !ttl_matches {
            return false;
        }

        if self.record_type.is_proxy_capable() && self.proxied != observed.proxied {
            return false;
        }

        true
    }
}

/// Observed state of a record as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRecord {
    /// Opaque provider-assigned identifier.
    pub id: String,
    /// Zone this record lives in.
    pub zone: String,
    /// Record type.
    pub record_type: RecordType,
    /// Fully-qualified record name.
    pub name: String,
    /// Record content.
    pub content: String,
    /// TTL in seconds, or [`TTL_AUTO`].
    pub ttl: u32,
    /// CDN proxy flag, when applicable.
    pub proxied: Option<bool>,
    /// MX/SRV priority.
    pub priority: Option<u16>,
    /// SRV weight.
    pub weight: Option<u16>,
    /// SRV port.
    pub port: Option<u16>,
    /// Optional provider-side comment (used to detect the legacy marker).
    pub comment: Option<String>,
}

impl ProviderRecord {
    /// Whether this record carries the legacy `Managed by <controller>`
    /// marker comment adopted by the tracker on first observation.
    pub fn has_legacy_marker(&self, controller_name: &str) -> bool {
        self.comment
            .as_deref()
            .map(|c| c.contains(&format!("Managed by {controller_name}")))
            .unwrap_or(false)
    }
}

/// Outcome of a single entry within a [`DnsProvider::batch_ensure_records`]
/// call.
#[derive(Debug, Clone)]
pub enum EnsureOutcome {
    /// The record did not exist and was created.
    Created(ProviderRecord),
    /// The record existed but differed, and was updated.
    Updated(ProviderRecord),
    /// The record existed and already matched the desired config.
    UpToDate(ProviderRecord),
    /// The operation failed for this entry; the batch continues.
    Error(String),
}

impl EnsureOutcome {
    /// The resulting provider record, if this outcome carries one.
    pub fn record(&self) -> Option<&ProviderRecord> {
        match self {
            EnsureOutcome::Created(r) | EnsureOutcome::Updated(r) | EnsureOutcome::UpToDate(r) => {
                Some(r)
            }
            EnsureOutcome::Error(_) => None,
        }
    }
}

/// Trait for DNS provider implementations.
///
/// # Trust Level: Untrusted
///
/// DNS providers are **untrusted** components with strict limitations:
///
/// ## Allowed Capabilities
/// - Perform HTTP/HTTPS API calls to their endpoints only
/// - Maintain the in-memory zone cache this trait owns
/// - Parse provider-specific responses
/// - Return success or failure (reconciler handles retry/logging)
///
/// ## Forbidden Capabilities
/// - Spawn tasks or threads (violates shutdown determinism)
/// - Implement retry logic or backoff (owned by the `DnsManager`)
/// - Access the record tracker (owned by the `DnsManager`)
/// - Access other providers (must be isolated)
/// - Decide whether an update is needed beyond this trait's own equality
///   rules (no hidden caching of "did I already do this")
///
/// Providers are external integrations that should be isolated, single-shot
/// per call, and deterministic: same input, same output. See
/// [`RecordConfig::matches`] for the equality rules every implementation
/// must honor.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Credentials probe plus initial zone fetch.
    async fn init(&self) -> Result<()>;

    /// Fetch the full record list for the managed zone and populate the
    /// cache.
    async fn list(&self) -> Result<Vec<ProviderRecord>>;

    /// Read-through cache: return the cached record list, refreshing first
    /// when `force_refresh` is set or the cache is empty.
    async fn from_cache(&self, force_refresh: bool) -> Result<Vec<ProviderRecord>>;

    /// Create a new record.
    async fn create(&self, record: &RecordConfig) -> Result<ProviderRecord>;

    /// Update an existing record by id.
    async fn update(&self, id: &str, record: &RecordConfig) -> Result<ProviderRecord>;

    /// Delete a record by id. Deleting a record that no longer exists on
    /// the provider (observable as 404) MUST be treated as success.
    async fn delete(&self, id: &str) -> Result<()>;

    /// For each desired config, find an existing record with the same
    /// `(name, type)`: create if absent, update if present and
    /// semantically different (per [`RecordConfig::matches`]), or report
    /// up-to-date if identical. Returns one outcome per input, in order,
    /// with a tombstone entry on individual failure. Must update the zone
    /// cache in-place on success.
    async fn batch_ensure_records(&self, configs: &[RecordConfig]) -> Result<Vec<EnsureOutcome>>;

    /// Static provider name, used for logging and as the tracker's
    /// `provider` key.
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration.
pub trait DnsProviderFactory: Send + Sync {
    /// Create a [`DnsProvider`] instance from its configuration value.
    fn create(&self, config: &serde_json::Value) -> Result<Box<dyn DnsProvider>>;
}
