//! Configuration schema definitions.
//!
//! [`FileConfig`] mirrors the file on disk, where an empty address disables
//! a listener. [`Config`] is what the core consumes: every listener is an
//! `Option`, so nothing downstream inspects string emptiness.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::broker::Options;

/// Configuration file as written by the operator.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FileConfig {
    /// Plain stream listener address (empty = disabled).
    pub tcp_addr: String,

    /// Mutual-TLS stream listener address (empty = disabled).
    pub tls_addr: String,

    /// Web-socket listener address (empty = disabled).
    pub ws_addr: String,

    /// Diagnostics HTTP listener address (empty = disabled).
    pub stats_addr: String,

    /// Server certificate (PEM), required with `tls_addr`.
    pub tls_cert: String,

    /// Server private key (PEM), required with `tls_addr`.
    pub tls_key: String,

    /// CA bundle verifying client certificates, required with `tls_addr`.
    pub tls_ca: String,

    /// Broker options, forwarded verbatim.
    pub options: Options,

    pub log: LogConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// The secured stream listener and its key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsListenerConfig {
    pub addr: String,
    pub cert: PathBuf,
    pub key: PathBuf,
    pub ca: PathBuf,
}

/// Validated configuration consumed by the lifecycle manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub tcp_addr: Option<String>,
    pub tls: Option<TlsListenerConfig>,
    pub ws_addr: Option<String>,
    pub stats_addr: Option<String>,
    pub options: Options,
    pub log: LogConfig,
}

impl Config {
    /// Number of listeners this configuration enables.
    pub fn enabled_listeners(&self) -> usize {
        [
            self.tcp_addr.is_some(),
            self.tls.is_some(),
            self.ws_addr.is_some(),
            self.stats_addr.is_some(),
        ]
        .into_iter()
        .filter(|enabled| *enabled)
        .count()
    }
}
