//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → structured `tracing` events (listener, address, connection_id fields)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout)
//!     → diagnostics listener (broker Info snapshot over HTTP)
//! ```

pub mod logging;
