//! Configuration orchestration.
//!
//! # Data Flow
//! ```text
//! update_config(version, bytes)
//!     → version pre-check (stale → Ok, nothing parsed)
//!     → merger.rs (parse, validate, defaults ← remote ← overrides.rs)
//!     → proxy::ProxyBuilder (build engine + release handle)
//!     → generation.rs commit (version check again, swap, release previous)
//!
//! request path
//!     → Orchestrator::current_routing_engine (lock-free snapshot)
//! ```
//!
//! # Design Decisions
//! - One mutex for writers, none for readers (`ArcSwap`)
//! - Failures before the commit leave the current generation untouched
//! - Internal rules and local overrides are fixed at construction

pub mod generation;
pub mod merger;
pub mod orchestrator;
pub mod overrides;

pub use generation::{CommitOutcome, Generation, GenerationError, GenerationManager, INITIAL_VERSION};
pub use merger::{ConfigMerger, RuntimeConfig};
pub use orchestrator::{InitialConfig, Orchestrator, OrchestratorError, UpdateOutcome};
pub use overrides::LocalOverrides;
