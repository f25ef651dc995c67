//! mqttd: listener orchestration and secure bootstrap for a message broker.
//!
//! Turns a static configuration into live listeners (tcp, mutual TLS,
//! web-socket, diagnostics HTTP) attached to one broker, and runs the
//! process lifecycle around OS termination signals.

pub mod broker;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use broker::{Broker, Server};
pub use config::Config;
pub use lifecycle::{Lifecycle, State};
