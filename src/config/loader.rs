//! Configuration loading from bytes and from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{LocalConfigJson, RemoteConfigJson};
use crate::config::validation::ValidationError;

/// Error type for configuration loading and merging.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed configuration: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid ingress rule: {0}")]
    Invalid(#[from] ValidationError),
}

/// Parse a remote update payload.
pub fn parse_remote(payload: &[u8]) -> Result<RemoteConfigJson, ConfigError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Load a local-only configuration file (JSON).
pub fn load_local_config(path: &Path) -> Result<LocalConfigJson, ConfigError> {
    let content = fs::read(path)?;
    Ok(serde_json::from_slice(&content)?)
}
