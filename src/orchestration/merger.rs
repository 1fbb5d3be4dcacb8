//! Configuration merger.
//!
//! Turns an update payload into a [`RuntimeConfig`] in three fixed passes:
//!
//! ```text
//! built-in defaults
//!     ← remote originRequest / rule originRequest (fields present only)
//!     ← local overrides (always win)
//! ```
//!
//! Internal rules are prepended last. A failure at any step returns an error
//! and produces nothing.

use crate::config::loader::{parse_remote, ConfigError};
use crate::config::schema::{LocalConfigJson, RemoteConfigJson};
use crate::ingress::{Ingress, OriginRequestConfig, Rule, WarpRoutingConfig};
use crate::orchestration::overrides::LocalOverrides;

/// Canonical, immutable configuration of one generation.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Internal rules followed by user rules; the last rule is a catch-all.
    pub ingress: Ingress,
    /// Raw TCP / IP routing settings.
    pub warp_routing: WarpRoutingConfig,
}

impl RuntimeConfig {
    /// Wire form of the user-visible configuration. Internal rules are not
    /// part of it; local overrides appear as plain, already-applied values.
    pub fn to_json(&self) -> RemoteConfigJson {
        RemoteConfigJson {
            origin_request: self.ingress.defaults.to_json(),
            ingress: self.ingress.user_rules().iter().map(Rule::to_json).collect(),
            warp_routing: self.warp_routing.to_json(),
        }
    }
}

/// Combines remote payloads with the fixed internal rules and local overrides.
#[derive(Debug, Clone)]
pub struct ConfigMerger {
    internal_rules: Vec<Rule>,
    overrides: LocalOverrides,
}

impl ConfigMerger {
    pub fn new(internal_rules: Vec<Rule>, overrides: LocalOverrides) -> Self {
        Self {
            internal_rules,
            overrides,
        }
    }

    /// Parse, validate and merge raw update bytes.
    pub fn merge_payload(&self, payload: &[u8]) -> Result<RuntimeConfig, ConfigError> {
        let remote = parse_remote(payload)?;
        self.merge_remote(&remote)
    }

    /// Validate and merge an already-deserialized payload.
    pub fn merge_remote(&self, remote: &RemoteConfigJson) -> Result<RuntimeConfig, ConfigError> {
        let defaults = OriginRequestConfig::default().with_overrides(&remote.origin_request);
        let ingress = Ingress::parse(&remote.ingress, defaults)?;
        let warp_routing = WarpRoutingConfig::from_json(&remote.warp_routing);
        self.merge_typed(ingress, warp_routing)
    }

    /// Merge typed values: substitute the placeholder rule when there are no
    /// user rules, validate the rest, apply local overrides, prepend internal
    /// rules.
    pub fn merge_typed(
        &self,
        mut ingress: Ingress,
        mut warp_routing: WarpRoutingConfig,
    ) -> Result<RuntimeConfig, ConfigError> {
        ingress.validate()?;
        if ingress.is_empty() {
            let placeholder = Ingress::placeholder_rule(&ingress.defaults);
            ingress = Ingress::new(vec![placeholder], ingress.defaults);
        }

        self.overrides.apply_origin(&mut ingress.defaults);
        for rule in ingress.user_rules_mut() {
            self.overrides.apply_origin(&mut rule.config);
        }
        self.overrides.apply_warp_routing(&mut warp_routing);

        Ok(RuntimeConfig {
            ingress: ingress.with_internal_rules(&self.internal_rules),
            warp_routing,
        })
    }

    /// Local-only serialization: the merged values plus the raw override map.
    pub fn local_json(&self, config: &RuntimeConfig) -> LocalConfigJson {
        LocalConfigJson {
            remote: config.to_json(),
            configuration_flags: self.overrides.raw().clone(),
        }
    }
}
