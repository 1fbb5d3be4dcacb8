//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Hostname shape: no port, wildcard only as a leading `*.` label
//! - Service tokens and status codes
//! - Catch-all placement: exactly the last rule matches everything
//!
//! # Design Decisions
//! - Rule numbers in messages are 1-based, matching how operators count
//! - Validation is pure: it never touches live state

use thiserror::Error;

/// A rule failed semantic validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("rule #{rule} has no service")]
    MissingService { rule: usize },

    #[error("rule #{rule}: {reason}")]
    InvalidService { rule: usize, reason: String },

    #[error("rule #{rule}: hostname {hostname:?} must not contain a port")]
    HostnameHasPort { rule: usize, hostname: String },

    #[error("rule #{rule}: hostname {hostname:?} may only use a wildcard as its first label")]
    InvalidWildcard { rule: usize, hostname: String },

    #[error("rule #{rule}: invalid path pattern: {source}")]
    InvalidPath {
        rule: usize,
        #[source]
        source: regex::Error,
    },

    #[error("rule #{rule} matches every request but is not the last rule")]
    CatchAllNotLast { rule: usize },

    #[error("the last rule (#{rule}) must match every request")]
    LastRuleNotCatchAll { rule: usize },
}

/// Check a rule hostname for shape errors.
///
/// `rule` is the 1-based rule number used in the error.
pub fn validate_hostname(rule: usize, hostname: &str) -> Result<(), ValidationError> {
    if hostname.is_empty() || hostname == "*" {
        return Ok(());
    }

    if hostname.contains(':') {
        return Err(ValidationError::HostnameHasPort {
            rule,
            hostname: hostname.to_string(),
        });
    }

    let rest = hostname.strip_prefix("*.").unwrap_or(hostname);
    if rest.contains('*') {
        return Err(ValidationError::InvalidWildcard {
            rule,
            hostname: hostname.to_string(),
        });
    }

    Ok(())
}
