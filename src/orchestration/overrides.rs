//! Local overrides: values fixed at startup that beat any remote value.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::ingress::{OriginRequestConfig, WarpRoutingConfig};

/// Ceiling on concurrent warp routing flows.
pub const MAX_ACTIVE_FLOWS: &str = "max-active-flows";
/// Origin connect timeout, in seconds (`30` or `30s`).
pub const CONNECT_TIMEOUT: &str = "connect-timeout";
/// Skip origin certificate verification.
pub const NO_TLS_VERIFY: &str = "no-tls-verify";
/// Disable Happy Eyeballs when dialing origins.
pub const NO_HAPPY_EYEBALLS: &str = "no-happy-eyeballs";
/// Host header sent to origins.
pub const HTTP_HOST_HEADER: &str = "http-host-header";

/// Parsed override map. Immutable after construction.
#[derive(Debug, Clone, Default)]
pub struct LocalOverrides {
    raw: BTreeMap<String, String>,
    max_active_flows: Option<u64>,
    connect_timeout: Option<Duration>,
    no_tls_verify: Option<bool>,
    no_happy_eyeballs: Option<bool>,
    http_host_header: Option<String>,
}

impl LocalOverrides {
    /// Parse a raw `key → value` map.
    ///
    /// Unknown keys are kept for serialization but have no effect. Values
    /// that fail to parse are logged and ignored.
    pub fn parse<I, K, V>(flags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let raw: BTreeMap<String, String> = flags
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let mut out = Self::default();
        for (key, value) in &raw {
            match key.as_str() {
                MAX_ACTIVE_FLOWS => out.max_active_flows = parse_logged(key, value, |v| v.parse().ok()),
                CONNECT_TIMEOUT => out.connect_timeout = parse_logged(key, value, parse_seconds),
                NO_TLS_VERIFY => out.no_tls_verify = parse_logged(key, value, |v| v.parse().ok()),
                NO_HAPPY_EYEBALLS => out.no_happy_eyeballs = parse_logged(key, value, |v| v.parse().ok()),
                HTTP_HOST_HEADER => out.http_host_header = Some(value.clone()),
                _ => tracing::debug!(key = %key, "Local override has no effect on orchestrated config"),
            }
        }
        out.raw = raw;
        out
    }

    /// The raw map, as supplied.
    pub fn raw(&self) -> &BTreeMap<String, String> {
        &self.raw
    }

    /// Write every origin-level override into `config`.
    pub fn apply_origin(&self, config: &mut OriginRequestConfig) {
        if let Some(v) = self.connect_timeout {
            config.connect_timeout = v;
        }
        if let Some(v) = self.no_tls_verify {
            config.no_tls_verify = v;
        }
        if let Some(v) = self.no_happy_eyeballs {
            config.no_happy_eyeballs = v;
        }
        if let Some(v) = &self.http_host_header {
            config.http_host_header = Some(v.clone());
        }
    }

    /// Write every warp-routing override into `config`.
    pub fn apply_warp_routing(&self, config: &mut WarpRoutingConfig) {
        if let Some(v) = self.max_active_flows {
            config.max_active_flows = v;
        }
    }
}

impl From<HashMap<String, String>> for LocalOverrides {
    fn from(flags: HashMap<String, String>) -> Self {
        Self::parse(flags)
    }
}

fn parse_logged<T>(key: &str, value: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let parsed = parse(value.trim());
    if parsed.is_none() {
        tracing::error!(key = %key, value = %value, "Ignoring unparsable local override");
    }
    parsed
}

fn parse_seconds(value: &str) -> Option<Duration> {
    value
        .strip_suffix('s')
        .unwrap_or(value)
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_keys_are_applied() {
        let overrides = LocalOverrides::parse([
            (MAX_ACTIVE_FLOWS, "100"),
            (CONNECT_TIMEOUT, "15s"),
            (NO_TLS_VERIFY, "true"),
            (HTTP_HOST_HEADER, "internal.svc"),
        ]);

        let mut warp = WarpRoutingConfig {
            max_active_flows: 500,
            ..Default::default()
        };
        overrides.apply_warp_routing(&mut warp);
        assert_eq!(warp.max_active_flows, 100);

        let mut origin = OriginRequestConfig::default();
        overrides.apply_origin(&mut origin);
        assert_eq!(origin.connect_timeout, Duration::from_secs(15));
        assert!(origin.no_tls_verify);
        assert!(!origin.no_happy_eyeballs);
        assert_eq!(origin.http_host_header.as_deref(), Some("internal.svc"));
    }

    #[test]
    fn bad_values_are_ignored_but_kept_raw() {
        let overrides = LocalOverrides::parse([(MAX_ACTIVE_FLOWS, "lots"), ("a", "b")]);

        let mut warp = WarpRoutingConfig {
            max_active_flows: 7,
            ..Default::default()
        };
        overrides.apply_warp_routing(&mut warp);
        assert_eq!(warp.max_active_flows, 7);

        assert_eq!(overrides.raw().len(), 2);
        assert_eq!(overrides.raw().get("a").map(String::as_str), Some("b"));
    }
}
