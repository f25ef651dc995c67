//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → tls.rs (mutual TLS handshake on the secured listener)
//!     → connection.rs (lifetime tracking)
//!     → Hand off to broker session
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - The TLS listener never falls back to plaintext

pub mod connection;
pub mod listener;
pub mod tls;
