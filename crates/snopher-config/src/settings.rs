//! Settings file schema (snopher.toml and ~/.snopher/config.toml)
//!
//! Both files share one schema; every section and field is optional.
//!
//! ```toml
//! [library]
//! path = "target/debug/libsnopher_native.so"
//!
//! [buffers]
//! string_capacity = 1000
//!
//! [logging]
//! level = "info"
//! ```

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Capacity of host-allocated string output buffers when nothing overrides it
pub const DEFAULT_STRING_CAPACITY: usize = 1000;

/// Log filter used when neither the files, the environment nor flags set one
pub const DEFAULT_LOG_LEVEL: &str = "warn";

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// One settings file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Native library location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<LibrarySettings>,

    /// Host buffer sizing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffers: Option<BufferSettings>,

    /// Log filter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LibrarySettings {
    /// Path to the shared library; relative paths resolve against the
    /// directory holding the settings file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BufferSettings {
    /// Bytes reserved for string outputs, terminator included
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_capacity: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// Level name or a full `tracing` filter directive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl Settings {
    /// Load settings from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let mut settings = Self::parse(&content).map_err(|e| match e {
            ConfigError::TomlParseError { error, .. } => ConfigError::TomlParseError {
                file: path.to_path_buf(),
                error,
            },
            other => other,
        })?;

        if let Some(base) = path.parent() {
            settings.anchor_paths(base);
        }
        Ok(settings)
    }

    /// Parse settings from TOML text
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let settings: Self = toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
            file: PathBuf::new(),
            error: e,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate field values
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(capacity) = self.string_capacity() {
            validate_capacity("buffers.string_capacity", capacity)?;
        }
        if let Some(level) = self.log_level() {
            validate_log_level("logging.level", level)?;
        }
        Ok(())
    }

    pub fn library_path(&self) -> Option<&Path> {
        self.library.as_ref().and_then(|l| l.path.as_deref())
    }

    pub fn string_capacity(&self) -> Option<usize> {
        self.buffers.as_ref().and_then(|b| b.string_capacity)
    }

    pub fn log_level(&self) -> Option<&str> {
        self.logging.as_ref().and_then(|l| l.level.as_deref())
    }

    pub fn set_library_path(&mut self, path: PathBuf) {
        self.library.get_or_insert_with(Default::default).path = Some(path);
    }

    pub fn set_string_capacity(&mut self, capacity: usize) {
        self.buffers
            .get_or_insert_with(Default::default)
            .string_capacity = Some(capacity);
    }

    pub fn set_log_level(&mut self, level: String) {
        self.logging.get_or_insert_with(Default::default).level = Some(level);
    }

    /// Merge another settings layer into this one
    /// Other layer takes precedence field by field
    pub fn merge(&mut self, other: &Settings) {
        if let Some(path) = other.library_path() {
            self.set_library_path(path.to_path_buf());
        }
        if let Some(capacity) = other.string_capacity() {
            self.set_string_capacity(capacity);
        }
        if let Some(level) = other.log_level() {
            self.set_log_level(level.to_string());
        }
    }

    fn anchor_paths(&mut self, base: &Path) {
        if let Some(library) = self.library.as_mut() {
            if let Some(path) = library.path.as_mut() {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
    }
}

pub(crate) fn validate_capacity(field: &str, capacity: usize) -> ConfigResult<()> {
    if capacity == 0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: "capacity must hold at least the terminator".to_string(),
        });
    }
    Ok(())
}

/// Accepts a bare level name, or a directive list such as `snopher_ffi=debug,warn`
pub(crate) fn validate_log_level(field: &str, level: &str) -> ConfigResult<()> {
    let valid = !level.trim().is_empty()
        && level.split(',').all(|directive| {
            let level = directive.rsplit('=').next().unwrap_or(directive).trim();
            LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str())
        });
    if !valid {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!(
                "invalid log level '{}' (expected one of: {})",
                level,
                LOG_LEVELS.join(", ")
            ),
        });
    }
    Ok(())
}
