use std::{
    fs,
    path::{Path, PathBuf},
};

use dirs::{config_dir, data_dir};
use serde::{Deserialize, Serialize};
use vaultbox_core::{record::DEFAULT_IDENTIFIER_FIELD, ConfigError, StoreConfig};

const APP_DIR: &str = "vaultbox";
const DEFAULT_KEYRING_SERVICE: &str = "vaultbox";

/// User-level settings loaded from `<config_dir>/vaultbox/config.toml`.
/// Every field is optional; unset fields fall back to platform defaults.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Settings {
    /// Override for the directory holding blob store files.
    pub data_dir: Option<PathBuf>,
    /// Service name under which keystore keys are filed in the OS keyring.
    pub keyring_service: Option<String>,
    /// Identifier field for stores created through [`Settings::store_config`].
    pub default_identifier_field: Option<String>,
}

impl Settings {
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_data_dir(),
        }
    }

    pub fn keyring_service(&self) -> &str {
        self.keyring_service
            .as_deref()
            .unwrap_or(DEFAULT_KEYRING_SERVICE)
    }

    pub fn identifier_field(&self) -> &str {
        self.default_identifier_field
            .as_deref()
            .unwrap_or(DEFAULT_IDENTIFIER_FIELD)
    }

    /// Store config for `name` carrying the configured identifier field.
    pub fn store_config(&self, name: impl Into<String>) -> StoreConfig {
        StoreConfig::new(name).with_identifier_field(self.identifier_field())
    }
}

/// Platform data directory for store files.
pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
    let base = data_dir().ok_or(ConfigError::NoDataDir)?;
    Ok(base.join(APP_DIR))
}

/// Load settings from the default path; if missing, return defaults.
pub fn load() -> Result<Settings, ConfigError> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load settings from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = fs::read_to_string(path).map_err(settings_err)?;
    if contents.trim().is_empty() {
        return Ok(Settings::default());
    }
    toml::from_str(&contents).map_err(settings_err)
}

/// Resolve the default settings path (platform aware).
pub fn default_path() -> Result<PathBuf, ConfigError> {
    let base = config_dir()
        .ok_or_else(|| ConfigError::Settings("no config dir available".into()))?;
    Ok(base.join(APP_DIR).join("config.toml"))
}

/// Write `settings` to the default path unless a file already exists there.
pub fn write_default_if_missing(settings: &Settings) -> Result<PathBuf, ConfigError> {
    write_to_path_if_missing(settings, &default_path()?)
}

/// Write `settings` to `path`, creating parent directories. An existing file
/// is left untouched so user edits are never clobbered.
pub fn write_to_path_if_missing(settings: &Settings, path: &Path) -> Result<PathBuf, ConfigError> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(settings_err)?;
    }
    let body = toml::to_string_pretty(settings).map_err(settings_err)?;
    fs::write(path, body).map_err(settings_err)?;
    Ok(path.to_path_buf())
}

fn settings_err(err: impl std::fmt::Display) -> ConfigError {
    ConfigError::Settings(err.to_string())
}
