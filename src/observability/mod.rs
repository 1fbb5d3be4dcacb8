//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! orchestration / proxy
//!     → tracing events (structured fields: version, error, service)
//!     → logging.rs subscriber (stdout, plain or JSON)
//!
//! orchestration / proxy
//!     → metrics.rs record_* helpers
//!     → Prometheus exporter (scrape endpoint, when enabled)
//! ```

pub mod logging;
pub mod metrics;
