//! Configuration orchestrator for a tunnel daemon.
//!
//! Accepts versioned routing configurations, builds a routing engine for each
//! accepted one and hands requests to the newest engine while connections
//! already established keep running on the engine that accepted them.

pub mod admin;
pub mod config;
pub mod http;
pub mod ingress;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod orchestration;
pub mod proxy;

pub use config::ConfigError;
pub use http::HttpServer;
pub use ingress::{Ingress, Rule, Service, WarpRoutingConfig};
pub use lifecycle::{Shutdown, ShutdownSignal};
pub use orchestration::{InitialConfig, Orchestrator, OrchestratorError, UpdateOutcome};
pub use proxy::{Proxy, ProxyError, Tag};
