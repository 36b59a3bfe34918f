//! DispenseKit Settings Crate
//!
//! Handles application configuration: the config file sections, their
//! validation, and where the file lives.

pub mod config;
pub mod error;
pub mod manager;

pub use config::{
    Config, ConnectionSettings, MotionSettings, PressureSettings, RasterSettings, TimingSettings,
};
pub use error::{SettingsError, SettingsResult};
pub use manager::{SettingsManager, APP_DIR_NAME, CONFIG_FILE_NAME};
