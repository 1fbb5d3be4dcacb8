//! Resolved per-connection origin settings.
//!
//! Resolution is field-by-field: start from [`OriginRequestConfig::default`],
//! apply the global `originRequest` overrides, then a rule's own overrides.
//! A field absent at one level keeps the value from the level below.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::schema::OriginRequestJson;

/// Fully resolved origin settings for one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginRequestConfig {
    /// Timeout for establishing the TCP connection to the origin.
    pub connect_timeout: Duration,
    /// Timeout for the TLS handshake with the origin.
    pub tls_timeout: Duration,
    /// TCP keep-alive period on origin connections.
    pub tcp_keep_alive: Duration,
    /// Disable RFC 8305 dual-stack racing.
    pub no_happy_eyeballs: bool,
    /// Idle connections kept per origin.
    pub keep_alive_connections: usize,
    /// How long an idle origin connection is kept.
    pub keep_alive_timeout: Duration,
    /// Replaces the `Host` header sent to the origin.
    pub http_host_header: Option<String>,
    /// SNI / verification name for TLS origins.
    pub origin_server_name: Option<String>,
    /// PEM bundle of extra CAs trusted for this origin.
    pub ca_pool: Option<PathBuf>,
    /// Skip origin certificate verification.
    pub no_tls_verify: bool,
    /// Send bodies with Content-Length instead of chunked encoding.
    pub disable_chunked_encoding: bool,
    /// Speak HTTP/2 to the origin.
    pub http2_origin: bool,
}

impl Default for OriginRequestConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            tls_timeout: Duration::from_secs(10),
            tcp_keep_alive: Duration::from_secs(30),
            no_happy_eyeballs: false,
            keep_alive_connections: 100,
            keep_alive_timeout: Duration::from_secs(90),
            http_host_header: None,
            origin_server_name: None,
            ca_pool: None,
            no_tls_verify: false,
            disable_chunked_encoding: false,
            http2_origin: false,
        }
    }
}

impl OriginRequestConfig {
    /// Return a copy of `self` with every field set in `overrides` replaced.
    pub fn with_overrides(&self, overrides: &OriginRequestJson) -> Self {
        let mut out = self.clone();
        if let Some(secs) = overrides.connect_timeout {
            out.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = overrides.tls_timeout {
            out.tls_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = overrides.tcp_keep_alive {
            out.tcp_keep_alive = Duration::from_secs(secs);
        }
        if let Some(v) = overrides.no_happy_eyeballs {
            out.no_happy_eyeballs = v;
        }
        if let Some(v) = overrides.keep_alive_connections {
            out.keep_alive_connections = v;
        }
        if let Some(secs) = overrides.keep_alive_timeout {
            out.keep_alive_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = &overrides.http_host_header {
            out.http_host_header = Some(v.clone());
        }
        if let Some(v) = &overrides.origin_server_name {
            out.origin_server_name = Some(v.clone());
        }
        if let Some(v) = &overrides.ca_pool {
            out.ca_pool = Some(PathBuf::from(v));
        }
        if let Some(v) = overrides.no_tls_verify {
            out.no_tls_verify = v;
        }
        if let Some(v) = overrides.disable_chunked_encoding {
            out.disable_chunked_encoding = v;
        }
        if let Some(v) = overrides.http2_origin {
            out.http2_origin = v;
        }
        out
    }

    /// Wire form with every field present.
    pub fn to_json(&self) -> OriginRequestJson {
        OriginRequestJson {
            connect_timeout: Some(self.connect_timeout.as_secs()),
            tls_timeout: Some(self.tls_timeout.as_secs()),
            tcp_keep_alive: Some(self.tcp_keep_alive.as_secs()),
            no_happy_eyeballs: Some(self.no_happy_eyeballs),
            keep_alive_connections: Some(self.keep_alive_connections),
            keep_alive_timeout: Some(self.keep_alive_timeout.as_secs()),
            http_host_header: self.http_host_header.clone(),
            origin_server_name: self.origin_server_name.clone(),
            ca_pool: self.ca_pool.as_ref().map(|p| p.display().to_string()),
            no_tls_verify: Some(self.no_tls_verify),
            disable_chunked_encoding: Some(self.disable_chunked_encoding),
            http2_origin: Some(self.http2_origin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_only_present_fields() {
        let global = OriginRequestConfig::default().with_overrides(&OriginRequestJson {
            connect_timeout: Some(90),
            no_happy_eyeballs: Some(true),
            ..Default::default()
        });

        let rule = global.with_overrides(&OriginRequestJson {
            connect_timeout: Some(10),
            no_tls_verify: Some(true),
            ..Default::default()
        });

        assert_eq!(rule.connect_timeout, Duration::from_secs(10));
        assert!(rule.no_tls_verify);
        // inherited from the global level
        assert!(rule.no_happy_eyeballs);
        // inherited from the built-in defaults
        assert_eq!(rule.keep_alive_timeout, Duration::from_secs(90));

        assert_eq!(global.connect_timeout, Duration::from_secs(90));
        assert!(!global.no_tls_verify);
    }

    #[test]
    fn json_form_resolves_back_to_itself() {
        let cfg = OriginRequestConfig {
            http_host_header: Some("internal.svc".into()),
            ca_pool: Some(PathBuf::from("/etc/ca.pem")),
            ..Default::default()
        };
        let rebuilt = OriginRequestConfig::default().with_overrides(&cfg.to_json());
        assert_eq!(rebuilt, cfg);
    }
}
