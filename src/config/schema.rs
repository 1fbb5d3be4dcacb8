//! Wire schema for configuration payloads.
//!
//! These are the *unvalidated* shapes exchanged with the control plane and
//! written to local config files. Every field is optional so a payload only
//! needs to mention what it sets; unknown keys are ignored for forward
//! compatibility. Durations are integer seconds.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Treat an explicit `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Root of a remotely supplied configuration update.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfigJson {
    /// Global default origin settings.
    #[serde(rename = "originRequest", deserialize_with = "null_as_default")]
    pub origin_request: OriginRequestJson,

    /// Ordered ingress rules.
    #[serde(deserialize_with = "null_as_default")]
    pub ingress: Vec<UnvalidatedRule>,

    /// Raw TCP / IP routing settings.
    #[serde(rename = "warp-routing", deserialize_with = "null_as_default")]
    pub warp_routing: WarpRoutingJson,
}

/// A single ingress rule as received, before validation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct UnvalidatedRule {
    /// Exact hostname (or `*.suffix` wildcard). Absent matches every host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Regular expression the request path must match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Service token: origin URL, `http_status:<code>` or `hello_world`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    /// Per-rule overrides of the global origin settings.
    #[serde(
        rename = "originRequest",
        deserialize_with = "null_as_default",
        skip_serializing_if = "OriginRequestJson::is_empty"
    )]
    pub origin_request: OriginRequestJson,
}

/// Per-connection origin settings. Every field is an override: `None` means
/// "inherit from the level above".
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OriginRequestJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_timeout: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_keep_alive: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_happy_eyeballs: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive_connections: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive_timeout: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_host_header: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_server_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_pool: Option<String>,

    #[serde(rename = "noTLSVerify", skip_serializing_if = "Option::is_none")]
    pub no_tls_verify: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_chunked_encoding: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub http2_origin: Option<bool>,
}

impl OriginRequestJson {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Warp routing settings as received.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WarpRoutingJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_keep_alive: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_active_flows: Option<u64>,
}

/// Local-only form used to persist a configuration that is not managed by
/// the control plane. Identical to [`RemoteConfigJson`] plus the raw local
/// override map under a reserved key.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LocalConfigJson {
    #[serde(flatten)]
    pub remote: RemoteConfigJson,

    #[serde(rename = "__configuration_flags", default, deserialize_with = "null_as_default")]
    pub configuration_flags: BTreeMap<String, String>,
}
