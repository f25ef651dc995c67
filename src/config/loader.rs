//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{Config, FileConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: FileConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    validate_config(file).map_err(ConfigError::Validation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_full_config() {
        let file = write_config(
            r#"
            tcp_addr = "127.0.0.1:1883"
            tls_addr = ""
            ws_addr = "127.0.0.1:1882"
            stats_addr = "127.0.0.1:8080"

            [options]
            max_connections = 64
            drain_timeout_secs = 5

            [log]
            level = "debug"
            "#,
        );

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.tcp_addr.as_deref(), Some("127.0.0.1:1883"));
        assert!(config.tls.is_none());
        assert_eq!(config.ws_addr.as_deref(), Some("127.0.0.1:1882"));
        assert_eq!(config.stats_addr.as_deref(), Some("127.0.0.1:8080"));
        assert_eq!(config.options.max_connections, 64);
        assert_eq!(config.options.drain_timeout_secs, 5);
        assert_eq!(config.options.read_buffer_size, 2048);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.enabled_listeners(), 3);
    }

    #[test]
    fn loads_tls_listener() {
        let file = write_config(
            r#"
            tls_addr = "0.0.0.0:8883"
            tls_cert = "certs/server.pem"
            tls_key = "certs/server.key"
            tls_ca = "certs/ca.pem"
            "#,
        );

        let tls = load_config(file.path()).unwrap().tls.unwrap();
        assert_eq!(tls.addr, "0.0.0.0:8883");
        assert_eq!(tls.cert, PathBuf::from("certs/server.pem"));
        assert_eq!(tls.key, PathBuf::from("certs/server.key"));
        assert_eq!(tls.ca, PathBuf::from("certs/ca.pem"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/mqttd.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/mqttd.toml"));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let file = write_config("tcp_addr = [1, 2");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn semantic_errors_are_collected() {
        let file = write_config("tls_addr = \"0.0.0.0:8883\"");
        match load_config(file.path()) {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
