//! Configuration Loader
//!
//! Loads settings layers and merges them with proper precedence.

use crate::settings::{validate_capacity, validate_log_level, Settings};
use crate::settings::{DEFAULT_LOG_LEVEL, DEFAULT_STRING_CAPACITY};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Project settings file name
pub const PROJECT_FILE: &str = "snopher.toml";

const ENV_LIBRARY: &str = "SNOPHER_LIBRARY";
const ENV_STRING_CAPACITY: &str = "SNOPHER_STRING_CAPACITY";
const ENV_LOG: &str = "SNOPHER_LOG";

/// Configuration loader
///
/// Precedence, lowest first:
/// 1. Global config (~/.snopher/config.toml)
/// 2. Project config (snopher.toml)
/// 3. Environment variables (SNOPHER_*)
/// 4. CLI flags (applied by the caller through the `override_*` methods)
pub struct ConfigLoader {
    /// Global config path; `None` means look it up under the home directory
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    /// Effective settings after merging every layer
    pub settings: Settings,

    /// Directory where snopher.toml was found
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use a specific global config file instead of ~/.snopher/config.toml
    pub fn with_global_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find snopher.toml.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project) = find_project_settings(start_dir)?;
        self.assemble(project, project_root)
    }

    /// Load configuration from a specific settings file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project = Settings::load_from_file(config_path)?;
        let project_root = config_path.parent().map(|p| p.to_path_buf());
        self.assemble(project, project_root)
    }

    fn assemble(
        &mut self,
        project: Settings,
        project_root: Option<PathBuf>,
    ) -> ConfigResult<Config> {
        let mut settings = self.load_global_settings()?;
        settings.merge(&project);
        apply_env_overrides(&mut settings)?;
        Ok(Config {
            settings,
            project_root,
        })
    }

    /// Global settings are optional; a missing home directory or file yields defaults
    fn load_global_settings(&mut self) -> ConfigResult<Settings> {
        if self.global_config_path.is_none() {
            match Self::global_config_dir() {
                Ok(dir) => self.global_config_path = Some(dir.join("config.toml")),
                Err(ConfigError::HomeNotFound) => return Ok(Settings::default()),
                Err(e) => return Err(e),
            }
        }

        match self.global_config_path.as_deref() {
            Some(path) if path.exists() => Settings::load_from_file(path),
            _ => Ok(Settings::default()),
        }
    }

    /// Get the global configuration directory (~/.snopher)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".snopher"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns (project_root, settings); defaults with no root when nothing is found
fn find_project_settings(start_dir: &Path) -> ConfigResult<(Option<PathBuf>, Settings)> {
    let mut current = start_dir.to_path_buf();

    loop {
        let config_path = current.join(PROJECT_FILE);
        if config_path.is_file() {
            let settings = Settings::load_from_file(&config_path)?;
            return Ok((Some(current), settings));
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return Ok((None, Settings::default())),
        }
    }
}

/// Environment variables: SNOPHER_LIBRARY, SNOPHER_STRING_CAPACITY, SNOPHER_LOG
fn apply_env_overrides(settings: &mut Settings) -> ConfigResult<()> {
    if let Some(path) = env::var_os(ENV_LIBRARY).filter(|v| !v.is_empty()) {
        settings.set_library_path(PathBuf::from(path));
    }

    if let Ok(raw) = env::var(ENV_STRING_CAPACITY) {
        let capacity = raw
            .trim()
            .parse::<usize>()
            .map_err(|e| ConfigError::InvalidValue {
                field: ENV_STRING_CAPACITY.to_string(),
                reason: format!("'{}' is not a size: {}", raw, e),
            })?;
        validate_capacity(ENV_STRING_CAPACITY, capacity)?;
        settings.set_string_capacity(capacity);
    }

    if let Ok(level) = env::var(ENV_LOG) {
        validate_log_level(ENV_LOG, &level)?;
        settings.set_log_level(level);
    }

    Ok(())
}

impl Config {
    /// Configured library path, if any layer set one
    pub fn library_path(&self) -> Option<&Path> {
        self.settings.library_path()
    }

    /// Library path, or `NoLibrary` when no layer set one
    pub fn require_library(&self) -> ConfigResult<&Path> {
        self.library_path().ok_or(ConfigError::NoLibrary)
    }

    pub fn string_capacity(&self) -> usize {
        self.settings
            .string_capacity()
            .unwrap_or(DEFAULT_STRING_CAPACITY)
    }

    pub fn log_level(&self) -> &str {
        self.settings.log_level().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if a snopher.toml was found
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }

    pub fn override_library(&mut self, path: PathBuf) {
        self.settings.set_library_path(path);
    }

    pub fn override_string_capacity(&mut self, capacity: usize) -> ConfigResult<()> {
        validate_capacity("--string-capacity", capacity)?;
        self.settings.set_string_capacity(capacity);
        Ok(())
    }

    pub fn override_log_level(&mut self, level: impl Into<String>) -> ConfigResult<()> {
        let level = level.into();
        validate_log_level("--log", &level)?;
        self.settings.set_log_level(level);
        Ok(())
    }
}
