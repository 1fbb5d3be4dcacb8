//! Network layer for warp routing.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, stops on shutdown)
//!     → Orchestrator::current_routing_engine
//!     → Proxy::proxy_tcp (flow limit, dial, splice)
//! ```
//!
//! # Design Decisions
//! - The engine is picked per connection, at accept time
//! - A connection keeps the engine it was accepted with until it closes

pub mod listener;

pub use listener::{FlowListener, ListenerError};
