//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     TLS context → broker + hook → bind & register listeners → serve
//!
//! Shutdown (shutdown.rs):
//!     Stop signal or serve fault → close broker → wait for serve task → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → stop future handed to the lifecycle manager
//! ```
//!
//! # Design Decisions
//! - Ordered, all-or-nothing startup: no listener serves until every
//!   enabled listener is bound and registered
//! - A missing or broken TLS context aborts; it never degrades to plaintext
//! - No shutdown deadline here; the broker bounds its own drain

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::TerminationSignals;
pub use startup::{BootstrapError, Lifecycle};
pub use state::State;
