//! Lifecycle states.
//!
//! # State Transitions
//! ```text
//! Configuring → Registering → Serving → Draining → Stopped
//!      │             │
//!      └─────────────┴──→ Aborted
//! ```

/// Where the lifecycle manager currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Building the security context, broker and hook.
    Configuring,
    /// Binding and registering listeners.
    Registering,
    /// Broker accept loop running.
    Serving,
    /// Stop requested, broker closing.
    Draining,
    /// Broker closed and serve task finished.
    Stopped,
    /// A fatal startup error occurred.
    Aborted,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            State::Configuring => "configuring",
            State::Registering => "registering",
            State::Serving => "serving",
            State::Draining => "draining",
            State::Stopped => "stopped",
            State::Aborted => "aborted",
        };
        f.write_str(s)
    }
}
