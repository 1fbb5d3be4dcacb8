//! Daemon-side HTTP listener.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum, tracing layer)
//!     → Orchestrator::current_routing_engine
//!     → Proxy::proxy_http
//!     → response (or 502 on routing error)
//! ```

pub mod server;

pub use server::HttpServer;
