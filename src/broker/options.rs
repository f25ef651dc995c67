//! Broker construction options.

use serde::{Deserialize, Serialize};

/// Options handed verbatim to [`Broker::new`](super::Broker::new).
///
/// Read from the `[options]` table of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Options {
    /// Maximum concurrent stream connections across all stream listeners.
    /// Accepts beyond this wait for a free slot. Zero is raised to one.
    pub max_connections: usize,

    /// Per-connection read buffer in bytes. Zero is raised to one.
    pub read_buffer_size: usize,

    /// Seconds `close` waits for in-flight connections to end.
    pub drain_timeout_secs: u64,

    /// Seconds between debug-level `Info` log lines while serving (0 = off).
    pub info_interval_secs: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            read_buffer_size: 2048,
            drain_timeout_secs: 30,
            info_interval_secs: 0,
        }
    }
}
