//! Container-label grammar: management-flag resolution and record-config
//! extraction.
//!
//! Label namespaces nest two deep: a generic prefix (e.g. `"dns."`) and a
//! provider-specific prefix (e.g. `"dns.cloudflare."`). For every
//! recognized key, the provider-prefixed value wins over the generic one
//! when both are present.

use std::collections::HashMap;

use crate::traits::{RecordConfig, RecordType};

/// Look up `key` under `provider_prefix` first, falling back to
/// `generic_prefix`.
fn get_label<'a>(
    labels: &'a HashMap<String, String>,
    generic_prefix: &str,
    provider_prefix: &str,
    key: &str,
) -> Option<&'a str> {
    if !provider_prefix.is_empty() {
        if let Some(v) = labels.get(&format!("{provider_prefix}{key}")) {
            return Some(v.as_str());
        }
    }
    labels.get(&format!("{generic_prefix}{key}")).map(|s| s.as_str())
}

/// Resolve whether a hostname should be managed.
///
/// Starts from `default_manage`; `<genericPrefix>manage=true` sets it true;
/// `<providerPrefix>manage` wins if set; any `skip=true` (generic or
/// provider) forces it false regardless of `manage`.
pub fn resolve_management_flag(
    default_manage: bool,
    generic_prefix: &str,
    provider_prefix: &str,
    labels: &HashMap<String, String>,
) -> bool {
    let mut manage = default_manage;

    if let Some(v) = labels.get(&format!("{generic_prefix}manage")) {
        if v == "true" {
            manage = true;
        }
    }
    if let Some(v) = get_label(labels, generic_prefix, provider_prefix, "manage") {
        manage = v == "true";
    }

    let skip = labels
        .get(&format!("{generic_prefix}skip"))
        .map(|v| v == "true")
        .unwrap_or(false)
        || labels
            .get(&format!("{provider_prefix}skip"))
            .map(|v| v == "true")
            .unwrap_or(false);

    if skip { false } else { manage }
}

/// Parse a record type label value, case-insensitively.
fn parse_record_type(value: &str) -> Option<RecordType> {
    match value.to_uppercase().as_str() {
        "A" => Some(RecordType::A),
        "AAAA" => Some(RecordType::Aaaa),
        "CNAME" => Some(RecordType::Cname),
        "TXT" => Some(RecordType::Txt),
        "MX" => Some(RecordType::Mx),
        "SRV" => Some(RecordType::Srv),
        "CAA" => Some(RecordType::Caa),
        "NS" => Some(RecordType::Ns),
        "PTR" => Some(RecordType::Ptr),
        _ => None,
    }
}

/// Defaults applied when a label is omitted, mirroring
/// [`crate::config::RecordDefaults`] without creating a dependency on the
/// config module from this leaf parsing code.
pub struct LabelDefaults {
    /// Default record type.
    pub record_type: RecordType,
    /// Default TTL in seconds.
    pub ttl: u32,
    /// Default proxy flag.
    pub proxied: bool,
}

/// Extract the desired [`RecordConfig`] for `fqdn` from its labels,
/// provider-specific labels overriding generic ones, falling back to
/// `defaults` when a key is entirely absent.
pub fn extract_record_config(
    fqdn: &str,
    labels: &HashMap<String, String>,
    generic_prefix: &str,
    provider_prefix: &str,
    defaults: &LabelDefaults,
) -> RecordConfig {
    let record_type = get_label(labels, generic_prefix, provider_prefix, "type")
        .and_then(parse_record_type)
        .unwrap_or(defaults.record_type);

    let content = get_label(labels, generic_prefix, provider_prefix, "content")
        .map(|s| s.to_string())
        .unwrap_or_default();

    let ttl = get_label(labels, generic_prefix, provider_prefix, "ttl")
        .and_then(|s| s.parse().ok())
        .unwrap_or(defaults.ttl);

    let proxied = if record_type.is_proxy_capable() {
        Some(
            get_label(labels, generic_prefix, provider_prefix, "proxied")
                .map(|s| s == "true")
                .unwrap_or(defaults.proxied),
        )
    } else {
        None
    };

    let priority = get_label(labels, generic_prefix, provider_prefix, "priority").and_then(|s| s.parse().ok());
    let weight = get_label(labels, generic_prefix, provider_prefix, "weight").and_then(|s| s.parse().ok());
    let port = get_label(labels, generic_prefix, provider_prefix, "port").and_then(|s| s.parse().ok());
    let flags = get_label(labels, generic_prefix, provider_prefix, "flags").and_then(|s| s.parse().ok());
    let tag = get_label(labels, generic_prefix, provider_prefix, "tag").map(|s| s.to_string());

    RecordConfig {
        record_type,
        name: fqdn.to_string(),
        content,
        ttl,
        proxied,
        priority,
        weight,
        port,
        flags,
        tag,
    }
}

/// Extract the hostname set declared directly in `labels` via the three
/// label forms: `<prefix>hostname=csv`, `<prefix>domain=d` +
/// `<prefix>subdomain=csv` (with optional `<prefix>use_apex=true`), and
/// `<prefix>host.*=h`.
pub fn extract_hostnames_from_labels(labels: &HashMap<String, String>, prefix: &str) -> Vec<String> {
    let mut hostnames = Vec::new();

    if let Some(csv) = labels.get(&format!("{prefix}hostname")) {
        hostnames.extend(csv.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()));
    }

    if let Some(domain) = labels.get(&format!("{prefix}domain")) {
        let use_apex = labels
            .get(&format!("{prefix}use_apex"))
            .map(|v| v == "true")
            .unwrap_or(false);
        if let Some(subdomains) = labels.get(&format!("{prefix}subdomain")) {
            for sub in subdomains.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
                hostnames.push(format!("{sub}.{domain}"));
            }
        } else if use_apex {
            hostnames.push(domain.clone());
        }
    }

    let host_prefix = format!("{prefix}host.");
    for (key, value) in labels {
        if key.starts_with(&host_prefix) && !value.trim().is_empty() {
            hostnames.push(value.trim().to_string());
        }
    }

    hostnames
}
