//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Shutdown::trigger() → every ShutdownSignal::recv() resolves
//!     → orchestrator releases the current generation
//!     → embedded responders stop accepting
//!     → HTTP listeners drain and exit
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → Shutdown::trigger()
//! ```
//!
//! # Design Decisions
//! - One cancellation handle per scope: the daemon owns one, each
//!   generation's release handle owns another
//! - Late subscribers still observe a trigger (watch, not broadcast)

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
