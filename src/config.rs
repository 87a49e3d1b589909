//! Configuration module for the unit repository.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `UNITSTORE_` and use double
//! underscores to separate nested levels:
//! - `UNITSTORE_REPOSITORY__BACKEND=disk` sets `repository.backend`
//! - `UNITSTORE_REPOSITORY__PERSIST_VERSION=3` sets `repository.persist_version`
//! - `UNITSTORE_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".unitstore";
const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "UNITSTORE_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .unitstore is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Repository backend settings
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which storage engine backs the repository.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Disk,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RepositoryConfig {
    /// Storage engine
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// Persistence version passed to `startup`. Stores written with another
    /// version are discarded by the disk backend.
    #[serde(default = "default_persist_version")]
    pub persist_version: u32,

    /// Directory for the disk backend, relative to the workspace root
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,

    /// Log every unit open/close
    #[serde(default = "default_false")]
    pub trace_units: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Level for everything without a module override
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `unitstore::storage = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 { 1 }
fn default_backend() -> BackendKind { BackendKind::Disk }
fn default_persist_version() -> u32 { 1 }
fn default_storage_path() -> PathBuf { PathBuf::from(".unitstore/repository") }
fn default_false() -> bool { false }
fn default_log_level() -> String { "warn".to_string() }

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            repository: RepositoryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            persist_version: default_persist_version(),
            storage_path: default_storage_path(),
            trace_units: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    /// `EnvFilter` directive string, e.g. `warn,unitstore::storage=debug`.
    pub fn filter_directive(&self) -> String {
        let mut modules: Vec<_> = self.modules.iter().collect();
        modules.sort();

        let mut directive = self.default.clone();
        for (module, level) in modules {
            directive.push_str(&format!(",{module}={level}"));
        }
        directive
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::layered(&config_path).map(|mut settings| {
            if settings.workspace_root.is_none() {
                settings.workspace_root = Self::workspace_root();
            }
            settings
        })
    }

    /// Load configuration from a specific file (plus environment overrides)
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::layered(path.as_ref())
    }

    fn layered(config_path: &Path) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels, single underscore
            // stays part of the field name
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find the workspace config by looking for .unitstore
    /// Searches from current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Get the workspace root directory (where .unitstore is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Directory of the disk backend, resolved against the workspace root
    pub fn storage_root(&self) -> PathBuf {
        let path = &self.repository.storage_path;
        match &self.workspace_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.clone(),
        }
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file under `dir/.unitstore`
    pub fn init_config_file(
        dir: impl AsRef<Path>,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = dir.as_ref().join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.repository.backend, BackendKind::Disk);
        assert_eq!(settings.repository.persist_version, 1);
        assert_eq!(
            settings.repository.storage_path,
            PathBuf::from(".unitstore/repository")
        );
        assert_eq!(settings.logging.default, "warn");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[repository]
backend = "memory"
persist_version = 7
storage_path = "/var/cache/units"

[logging]
default = "info"

[logging.modules]
"unitstore::storage" = "debug"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.repository.backend, BackendKind::Memory);
        assert_eq!(settings.repository.persist_version, 7);
        assert_eq!(settings.storage_root(), PathBuf::from("/var/cache/units"));
        assert_eq!(
            settings.logging.filter_directive(),
            "info,unitstore::storage=debug"
        );
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        fs::write(&config_path, "[repository]\npersist_version = 5\n").unwrap();

        let settings = Settings::load_from(&config_path).unwrap();

        assert_eq!(settings.repository.persist_version, 5);
        // Default values should still be present
        assert_eq!(settings.version, 1);
        assert_eq!(settings.repository.backend, BackendKind::Disk);
    }

    #[test]
    fn test_save_and_init() {
        let temp_dir = TempDir::new().unwrap();

        let path = Settings::init_config_file(temp_dir.path(), false).unwrap();
        assert!(path.ends_with(".unitstore/settings.toml"));
        assert!(Settings::init_config_file(temp_dir.path(), false).is_err());
        assert!(Settings::init_config_file(temp_dir.path(), true).is_ok());

        let mut settings = Settings::default();
        settings.repository.backend = BackendKind::Memory;
        settings.save(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.repository.backend, BackendKind::Memory);
    }

    #[test]
    fn test_env_override() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[repository]\ntrace_units = false\n").unwrap();

        unsafe {
            std::env::set_var("UNITSTORE_REPOSITORY__TRACE_UNITS", "true");
        }

        let settings = Settings::load_from(&config_path).unwrap();

        unsafe {
            std::env::remove_var("UNITSTORE_REPOSITORY__TRACE_UNITS");
        }

        // Environment variable should override config file
        assert!(settings.repository.trace_units);
    }

    #[test]
    fn test_relative_storage_path_uses_workspace_root() {
        let mut settings = Settings::default();
        settings.workspace_root = Some(PathBuf::from("/work/project"));

        assert_eq!(
            settings.storage_root(),
            PathBuf::from("/work/project/.unitstore/repository")
        );
    }
}
