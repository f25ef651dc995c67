//! Configuration validation.
//!
//! # Responsibilities
//! - Resolve empty addresses to disabled listeners
//! - Require TLS material when the TLS listener is enabled
//!
//! Broker options are forwarded untouched; the broker owns their ranges.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FileConfig → Result<Config, Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::path::PathBuf;

use thiserror::Error;

use crate::config::schema::{Config, FileConfig, TlsListenerConfig};

/// A single semantic problem in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("`{field}` is required when `tls_addr` is set")]
    MissingTlsMaterial { field: &'static str },
}

/// Validate a file config and turn it into the core [`Config`].
pub fn validate_config(file: FileConfig) -> Result<Config, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let tls = match enabled(&file.tls_addr) {
        Some(addr) => {
            let mut path = |field: &'static str, value: &str| match enabled(value) {
                Some(value) => PathBuf::from(value),
                None => {
                    errors.push(ValidationError::MissingTlsMaterial { field });
                    PathBuf::new()
                }
            };
            let cert = path("tls_cert", &file.tls_cert);
            let key = path("tls_key", &file.tls_key);
            let ca = path("tls_ca", &file.tls_ca);
            Some(TlsListenerConfig { addr, cert, key, ca })
        }
        None => None,
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(Config {
        tcp_addr: enabled(&file.tcp_addr),
        tls,
        ws_addr: enabled(&file.ws_addr),
        stats_addr: enabled(&file.stats_addr),
        options: file.options,
        log: file.log,
    })
}

/// Only the empty string disables; anything else is handed on as written.
fn enabled(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_addresses_disable_listeners() {
        let config = validate_config(FileConfig::default()).unwrap();
        assert_eq!(config.tcp_addr, None);
        assert_eq!(config.tls, None);
        assert_eq!(config.ws_addr, None);
        assert_eq!(config.stats_addr, None);
        assert_eq!(config.enabled_listeners(), 0);
    }

    #[test]
    fn tls_requires_all_material() {
        let file = FileConfig {
            tls_addr: "0.0.0.0:8883".into(),
            tls_cert: "server.pem".into(),
            ..Default::default()
        };
        let errors = validate_config(file).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::MissingTlsMaterial { field: "tls_key" },
                ValidationError::MissingTlsMaterial { field: "tls_ca" },
            ]
        );
    }

    #[test]
    fn tls_paths_ignored_when_tls_disabled() {
        let file = FileConfig {
            tcp_addr: "127.0.0.1:1883".into(),
            tls_cert: "server.pem".into(),
            ..Default::default()
        };
        let config = validate_config(file).unwrap();
        assert_eq!(config.tcp_addr.as_deref(), Some("127.0.0.1:1883"));
        assert!(config.tls.is_none());
    }

    #[test]
    fn reports_every_problem() {
        let file = FileConfig {
            tls_addr: "0.0.0.0:8883".into(),
            ..Default::default()
        };
        assert_eq!(validate_config(file).unwrap_err().len(), 3);
    }

    #[test]
    fn whitespace_address_stays_enabled() {
        let file = FileConfig {
            tcp_addr: " ".into(),
            ..Default::default()
        };
        let config = validate_config(file).unwrap();
        assert_eq!(config.tcp_addr.as_deref(), Some(" "));
        assert_eq!(config.enabled_listeners(), 1);
    }

    #[test]
    fn options_are_forwarded_verbatim() {
        let mut file = FileConfig::default();
        file.options.max_connections = 0;
        file.options.read_buffer_size = 0;
        let config = validate_config(file).unwrap();
        assert_eq!(config.options.max_connections, 0);
        assert_eq!(config.options.read_buffer_size, 0);
    }
}
