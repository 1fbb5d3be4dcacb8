//! Routing engine.
//!
//! # Data Flow
//! ```text
//! RuntimeConfig
//!     → builder.rs (resolve every rule to a Target, start owned responders)
//!     → Proxy + ReleaseHandle
//!
//! HTTP request → http.rs
//!     → Ingress::find_matching_rule
//!     → Target::Status    (answered inline)
//!     → Target::Origin    (forwarded with the rule's client, upgrades spliced)
//!     → Target::Responder (forwarded to the embedded hello-world server)
//!
//! TCP flow → tcp.rs (flow limit, dial, copy_bidirectional)
//! ```
//!
//! # Design Decisions
//! - A `Proxy` is immutable once built; an update builds a new one
//! - Spliced connections own their sockets, not the `Proxy`, so they
//!   outlive the generation that accepted them
//! - Only embedded responders are torn down by the release handle

pub mod builder;
pub mod http;
pub mod release;
pub mod responder;
pub mod tcp;

pub use builder::{BuildError, ProxyBuilder};
pub use release::ReleaseHandle;
pub use responder::HelloWorldResponder;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::uri::{Authority, Scheme};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::orchestration::RuntimeConfig;

/// HTTP client used to reach one rule's origin.
pub type OriginClient = Client<HttpConnector, Body>;

/// A `(name, value)` pair attached to every proxied request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Error type for request serving.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no ingress rule matched {host}{path}")]
    NoRuleMatched { host: String, path: String },

    #[error("failed to build origin URI: {0}")]
    InvalidUri(#[from] axum::http::uri::InvalidUriParts),

    #[error("origin request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("failed to read request body: {0}")]
    Body(#[source] axum::Error),

    #[error("too many active flows (limit {limit})")]
    FlowLimitReached { limit: u64 },

    #[error("failed to resolve {dest}")]
    Unresolvable { dest: String },

    #[error("dialing {dest} timed out")]
    DialTimeout { dest: String },

    #[error("failed to dial {dest}: {source}")]
    Dial {
        dest: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a matched rule sends traffic, resolved once at build time.
pub(crate) enum Target {
    Origin {
        scheme: Scheme,
        authority: Authority,
        client: OriginClient,
    },
    Status(StatusCode),
    Responder {
        authority: Authority,
        client: OriginClient,
    },
}

/// The routing engine of one generation.
pub struct Proxy {
    config: Arc<RuntimeConfig>,
    /// Parallel to `config.ingress.rules()`.
    targets: Vec<Target>,
    tag_headers: Arc<[(HeaderName, HeaderValue)]>,
    flows: Option<Arc<Semaphore>>,
    responder: Option<SocketAddr>,
}

impl Proxy {
    /// Configuration this engine was built from.
    pub fn config(&self) -> &Arc<RuntimeConfig> {
        &self.config
    }

    /// Address of the embedded hello-world responder, if any rule uses it.
    pub fn responder_addr(&self) -> Option<SocketAddr> {
        self.responder
    }

    /// Flows currently admitted, when a flow limit is configured.
    pub fn active_flows(&self) -> Option<u64> {
        let limit = self.config.warp_routing.max_active_flows;
        self.flows
            .as_ref()
            .map(|sem| limit.saturating_sub(sem.available_permits() as u64))
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("rules", &self.targets.len())
            .field("tags", &self.tag_headers.len())
            .field("max_active_flows", &self.config.warp_routing.max_active_flows)
            .field("responder", &self.responder)
            .finish()
    }
}
