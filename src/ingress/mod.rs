//! Ingress rules: the rule resolver consumed by the routing engine.
//!
//! # Data Flow
//! ```text
//! Incoming request (host, path)
//!     → Ingress::find_matching_rule
//!         → internal rules (fixed at orchestrator construction)
//!         → user rules (from the latest accepted update)
//!     → first match wins; the last user rule is always a catch-all
//! ```
//!
//! # Design Decisions
//! - Rules are validated and compiled once, immutable afterwards
//! - Deterministic: same input always matches same rule

pub mod origin_request;
pub mod rule;
pub mod service;
pub mod warp_routing;

pub use origin_request::OriginRequestConfig;
pub use rule::Rule;
pub use service::Service;
pub use warp_routing::WarpRoutingConfig;

use axum::http::StatusCode;

use crate::config::schema::UnvalidatedRule;
use crate::config::validation::{validate_hostname, ValidationError};

/// Ordered rule set. The first `internal_count` entries are internal rules.
#[derive(Debug, Clone, Default)]
pub struct Ingress {
    rules: Vec<Rule>,
    internal_count: usize,
    /// Global default origin settings the user rules were resolved against.
    pub defaults: OriginRequestConfig,
}

impl Ingress {
    /// Build an ingress from already-validated user rules.
    pub fn new(rules: Vec<Rule>, defaults: OriginRequestConfig) -> Self {
        Self {
            rules,
            internal_count: 0,
            defaults,
        }
    }

    /// Validate wire rules against `defaults`.
    ///
    /// An empty list is accepted here; the merger substitutes a placeholder.
    pub fn parse(raw: &[UnvalidatedRule], defaults: OriginRequestConfig) -> Result<Self, ValidationError> {
        let mut rules = Vec::with_capacity(raw.len());
        for (i, r) in raw.iter().enumerate() {
            rules.push(Rule::from_unvalidated(i + 1, r, &defaults)?);
        }

        let ingress = Self::new(rules, defaults);
        ingress.validate()?;
        Ok(ingress)
    }

    /// Check user rule hostnames and catch-all placement.
    ///
    /// An empty rule set passes; the merger substitutes a placeholder.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let rules = self.user_rules();
        let last = rules.len();
        for (i, r) in rules.iter().enumerate() {
            let number = i + 1;
            validate_hostname(number, &r.hostname)?;
            if number < last && r.is_catch_all() {
                return Err(ValidationError::CatchAllNotLast { rule: number });
            }
            if number == last && !r.is_catch_all() {
                return Err(ValidationError::LastRuleNotCatchAll { rule: number });
            }
        }
        Ok(())
    }

    /// Rule used when an update carries no ingress at all.
    pub fn placeholder_rule(defaults: &OriginRequestConfig) -> Rule {
        Rule::catch_all(
            Service::HttpStatus(StatusCode::SERVICE_UNAVAILABLE),
            defaults.clone(),
        )
    }

    /// Prepend internal rules. Any internal rules already present are replaced.
    pub fn with_internal_rules(mut self, internal: &[Rule]) -> Self {
        let user = self.rules.split_off(self.internal_count);
        self.rules = internal.iter().cloned().chain(user).collect();
        self.internal_count = internal.len();
        self
    }

    /// Every rule, internal rules first.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// The internal rules.
    pub fn internal_rules(&self) -> &[Rule] {
        &self.rules[..self.internal_count]
    }

    /// The user rules, in order.
    pub fn user_rules(&self) -> &[Rule] {
        &self.rules[self.internal_count..]
    }

    /// Mutable access to the user rules.
    pub fn user_rules_mut(&mut self) -> &mut [Rule] {
        &mut self.rules[self.internal_count..]
    }

    /// True when there are no user rules.
    pub fn is_empty(&self) -> bool {
        self.user_rules().is_empty()
    }

    /// Find the first rule matching `hostname` + `path`.
    ///
    /// Returns the rule and its index into [`Ingress::rules`].
    pub fn find_matching_rule(&self, hostname: &str, path: &str) -> Option<(usize, &Rule)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, r)| r.matches(hostname, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(hostname: Option<&str>, path: Option<&str>, service: &str) -> UnvalidatedRule {
        UnvalidatedRule {
            hostname: hostname.map(String::from),
            path: path.map(String::from),
            service: Some(service.into()),
            ..Default::default()
        }
    }

    #[test]
    fn first_match_wins() {
        let ingress = Ingress::parse(
            &[
                raw(Some("a"), Some("^/x"), "http_status:201"),
                raw(Some("a"), None, "http_status:202"),
                raw(None, None, "http_status:404"),
            ],
            OriginRequestConfig::default(),
        )
        .unwrap();

        assert_eq!(ingress.find_matching_rule("a", "/x/y").unwrap().0, 0);
        assert_eq!(ingress.find_matching_rule("a", "/z").unwrap().0, 1);
        assert_eq!(ingress.find_matching_rule("b", "/x/y").unwrap().0, 2);
    }

    #[test]
    fn internal_rules_come_first() {
        let internal = Rule {
            hostname: "management.tunnel.internal".into(),
            path: None,
            service: Service::HttpStatus(StatusCode::NO_CONTENT),
            config: OriginRequestConfig::default(),
        };
        let ingress = Ingress::parse(&[raw(None, None, "http_status:404")], OriginRequestConfig::default())
            .unwrap()
            .with_internal_rules(std::slice::from_ref(&internal));

        assert_eq!(ingress.rules().len(), 2);
        assert_eq!(ingress.internal_rules().len(), 1);
        assert_eq!(ingress.user_rules().len(), 1);
        assert_eq!(
            ingress.find_matching_rule("management.tunnel.internal", "/ping").unwrap().0,
            0
        );
        assert_eq!(ingress.find_matching_rule("other", "/ping").unwrap().0, 1);

        // re-prepending does not duplicate
        let again = ingress.with_internal_rules(&[internal]);
        assert_eq!(again.rules().len(), 2);
    }

    #[test]
    fn catch_all_placement_is_enforced() {
        let err = Ingress::parse(
            &[raw(None, None, "http_status:404"), raw(Some("a"), None, "http_status:200")],
            OriginRequestConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::CatchAllNotLast { rule: 1 }));

        let err = Ingress::parse(&[raw(Some("a"), None, "http_status:200")], OriginRequestConfig::default())
            .unwrap_err();
        assert!(matches!(err, ValidationError::LastRuleNotCatchAll { rule: 1 }));
    }

    #[test]
    fn typed_rules_are_validated_like_parsed_ones() {
        let status = |hostname: &str| Rule {
            hostname: hostname.into(),
            path: None,
            service: Service::HttpStatus(StatusCode::OK),
            config: OriginRequestConfig::default(),
        };

        let ingress = Ingress::new(vec![status("a.example")], OriginRequestConfig::default());
        assert!(matches!(ingress.validate(), Err(ValidationError::LastRuleNotCatchAll { rule: 1 })));

        let ingress = Ingress::new(vec![status("a.example:80"), status("")], OriginRequestConfig::default());
        assert!(matches!(ingress.validate(), Err(ValidationError::HostnameHasPort { rule: 1, .. })));

        assert!(Ingress::new(vec![status("a.example"), status("")], OriginRequestConfig::default())
            .validate()
            .is_ok());
        assert!(Ingress::default().validate().is_ok());
    }

    #[test]
    fn path_only_rule_may_precede_catch_all() {
        let ingress = Ingress::parse(
            &[raw(None, Some("^/api"), "http_status:200"), raw(None, None, "http_status:404")],
            OriginRequestConfig::default(),
        )
        .unwrap();
        assert_eq!(ingress.find_matching_rule("any", "/api/v1").unwrap().0, 0);
    }
}
