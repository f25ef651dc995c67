//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & deserialize into FileConfig)
//!     → validation.rs (semantic checks, empty strings → None)
//!     → Config (validated, immutable)
//!     → handed to the lifecycle manager once at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{Config, FileConfig, LogConfig, TlsListenerConfig};
pub use validation::ValidationError;

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
