//! Router-catalog rule grammar: extracting hostnames from a reverse-proxy
//! routing rule string.
//!
//! Two forms are recognized: the Traefik-style `Host(\`h1\`,\`h2\`)`
//! (possibly combined with other matchers via `&&`) and the legacy
//! `Host:h1,h2` form. A rule that matches neither, or matches but is
//! malformed (unbalanced backticks/parens), yields an empty list rather
//! than an error — a bad rule must never abort discovery.

use std::sync::LazyLock;

use regex::Regex;

static HOST_FUNC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Host\(([^)]*)\)").expect("static regex is valid"));
static BACKTICKED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]*)`").expect("static regex is valid"));
static LEGACY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Host:(.+)$").expect("static regex is valid"));

/// Extract every hostname named by a router rule string.
///
/// Returns an empty vector for anything that isn't a recognized,
/// well-formed `Host(...)` or `Host:...` rule.
pub fn extract_hostnames(rule: &str) -> Vec<String> {
    if let Some(caps) = HOST_FUNC_RE.captures(rule) {
        let inner = &caps[1];
        let hosts: Vec<String> = BACKTICKED_RE
            .captures_iter(inner)
            .map(|c| c[1].trim().to_string())
            .filter(|h| !h.is_empty())
            .collect();
        return hosts;
    }

    if let Some(caps) = LEGACY_RE.captures(rule.trim()) {
        return caps[1]
            .split(',')
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect();
    }

    Vec::new()
}
