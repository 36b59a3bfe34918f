//! Settings manager
//!
//! Resolves the platform config directory and loads or creates the
//! configuration file in it.

use crate::config::Config;
use crate::error::{SettingsError, SettingsResult};
use std::path::{Path, PathBuf};

/// Directory name under the platform config directory
pub const APP_DIR_NAME: &str = "dispensekit";

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Owns the active configuration and where it came from
#[derive(Debug, Clone)]
pub struct SettingsManager {
    config: Config,
    path: PathBuf,
}

impl SettingsManager {
    /// Platform config directory for DispenseKit
    pub fn config_dir() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(SettingsError::NoConfigDir(std::env::consts::OS))
    }

    /// Default configuration file path
    pub fn config_file_path() -> SettingsResult<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Create the directory that will hold `path`
    pub fn ensure_config_dir(path: &Path) -> SettingsResult<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| SettingsError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    /// Load `path` (or the default location); fall back to defaults when the file is missing
    pub fn load_or_default(path: Option<&Path>) -> SettingsResult<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_file_path()?,
        };

        let config = if path.exists() {
            Config::load_from_file(&path)?
        } else {
            tracing::info!(
                "No configuration at {}, using defaults",
                path.display()
            );
            Config::default()
        };
        Ok(Self { config, path })
    }

    /// Write the default configuration to `path` unless a file already exists
    pub fn init(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            return Err(SettingsError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        let manager = Self {
            config: Config::default(),
            path: path.to_path_buf(),
        };
        manager.save()?;
        Ok(manager)
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mutable configuration
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// File the configuration is read from and saved to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save the configuration, creating its directory if needed
    pub fn save(&self) -> SettingsResult<()> {
        Self::ensure_config_dir(&self.path)?;
        self.config.save_to_file(&self.path)
    }
}
