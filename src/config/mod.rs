//! Configuration wire format and local sources.
//!
//! # Data Flow
//! ```text
//! update bytes (control plane) / local file
//!     → loader.rs (parse & deserialize into schema.rs types)
//!     → validation.rs (semantic checks, via ingress::Rule)
//!     → orchestration::ConfigMerger (defaults ← remote ← local overrides)
//!     → RuntimeConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new file
//!     → submitted to the orchestrator as the next version
//! ```
//!
//! # Design Decisions
//! - Every wire field is optional; unknown keys are ignored
//! - Durations travel as integer seconds
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::ConfigError;
pub use schema::{LocalConfigJson, OriginRequestJson, RemoteConfigJson, UnvalidatedRule, WarpRoutingJson};
pub use validation::ValidationError;
