//! Route matching logic.
//!
//! # Responsibilities
//! - Match host (exact or leading wildcard, case-insensitive, port ignored)
//! - Match path against an optional regular expression
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Empty condition = always matches (wildcard)
//! - Path patterns are compiled once, when the rule is validated

use regex::Regex;

use crate::config::schema::UnvalidatedRule;
use crate::config::validation::{validate_hostname, ValidationError};
use crate::ingress::origin_request::OriginRequestConfig;
use crate::ingress::service::Service;

/// A validated ingress rule.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Hostname condition; empty matches every host.
    pub hostname: String,
    /// Path condition; `None` matches every path.
    pub path: Option<Regex>,
    /// Where matching requests go.
    pub service: Service,
    /// Resolved origin settings for this rule.
    pub config: OriginRequestConfig,
}

impl Rule {
    /// Build a rule with no conditions (a catch-all).
    pub fn catch_all(service: Service, config: OriginRequestConfig) -> Self {
        Self {
            hostname: String::new(),
            path: None,
            service,
            config,
        }
    }

    /// Validate a wire rule. `rule` is its 1-based position, used in errors.
    pub fn from_unvalidated(
        rule: usize,
        raw: &UnvalidatedRule,
        defaults: &OriginRequestConfig,
    ) -> Result<Self, ValidationError> {
        let hostname = raw.hostname.clone().unwrap_or_default();
        validate_hostname(rule, &hostname)?;

        let service = raw
            .service
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ValidationError::MissingService { rule })?
            .parse::<Service>()
            .map_err(|reason| ValidationError::InvalidService { rule, reason })?;

        let path = match raw.path.as_deref() {
            None | Some("") => None,
            Some(pattern) => Some(
                Regex::new(pattern).map_err(|source| ValidationError::InvalidPath { rule, source })?,
            ),
        };

        Ok(Self {
            hostname,
            path,
            service,
            config: defaults.with_overrides(&raw.origin_request),
        })
    }

    /// True if this rule has neither a hostname nor a path condition.
    pub fn is_catch_all(&self) -> bool {
        (self.hostname.is_empty() || self.hostname == "*") && self.path.is_none()
    }

    /// Does a request for `hostname` + `path` match this rule?
    pub fn matches(&self, hostname: &str, path: &str) -> bool {
        self.matches_host(hostname) && self.path.as_ref().map_or(true, |re| re.is_match(path))
    }

    fn matches_host(&self, requested: &str) -> bool {
        if self.hostname.is_empty() || self.hostname == "*" {
            return true;
        }

        let requested = strip_port(requested);
        if let Some(suffix) = self.hostname.strip_prefix("*.") {
            // `*.example.com` matches `a.example.com` but not `example.com`.
            let requested = requested.to_ascii_lowercase();
            let suffix = format!(".{}", suffix.to_ascii_lowercase());
            return requested.len() > suffix.len() && requested.ends_with(&suffix);
        }

        requested.eq_ignore_ascii_case(&self.hostname)
    }

    /// Wire form, with the resolved origin settings written out in full.
    pub fn to_json(&self) -> UnvalidatedRule {
        UnvalidatedRule {
            hostname: (!self.hostname.is_empty()).then(|| self.hostname.clone()),
            path: self.path.as_ref().map(|re| re.as_str().to_string()),
            service: Some(self.service.to_string()),
            origin_request: self.config.to_json(),
        }
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literal, possibly with a port.
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}
