//! Snopher Configuration
//!
//! Resolves the settings the `snopher` tools need before any native call:
//! - Which shared library to open
//! - Capacity of host-allocated string buffers
//! - Default log filter
//!
//! # Configuration Hierarchy
//!
//! Later sources override earlier ones:
//! 1. Global config (~/.snopher/config.toml)
//! 2. Project config (snopher.toml, searched upward from the working directory)
//! 3. Environment variables (SNOPHER_LIBRARY, SNOPHER_STRING_CAPACITY, SNOPHER_LOG)
//! 4. CLI flags
//!
//! # Example
//!
//! ```no_run
//! use snopher_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("capacity = {}", config.string_capacity());
//! ```

pub mod loader;
pub mod settings;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("No native library configured (use --lib, SNOPHER_LIBRARY or [library] path)")]
    NoLibrary,

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

pub use loader::{Config, ConfigLoader, PROJECT_FILE};
pub use settings::{
    BufferSettings, LibrarySettings, LoggingSettings, Settings, DEFAULT_LOG_LEVEL,
    DEFAULT_STRING_CAPACITY,
};
