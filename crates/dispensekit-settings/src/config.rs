//! Configuration for DispenseKit
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML file formats, chosen by file extension.
//!
//! Configuration is organized into logical sections:
//! - Connection settings (serial port, baud rate, acknowledgment mode)
//! - Initial channel pressures
//! - Raster pattern geometry
//! - Valve timing
//! - Motion controller setup

use crate::error::{SettingsError, SettingsResult};
use dispensekit_core::Psi;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Serial link to the pneumatic controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port name
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
    /// Pause after opening the port while the board resets
    pub startup_delay_ms: u64,
    /// Wait for an `ACK` line after every command
    pub wait_for_ack: bool,
    /// Acknowledgment timeout in milliseconds
    pub ack_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        #[cfg(target_os = "windows")]
        let port = "COM10";
        #[cfg(not(target_os = "windows"))]
        let port = "/dev/ttyACM0";

        Self {
            port: port.to_string(),
            baud_rate: 9600,
            timeout_ms: 100,
            startup_delay_ms: 2000,
            wait_for_ack: false,
            ack_timeout_ms: 500,
        }
    }
}

/// Initial desired pressures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureSettings {
    /// Channel 1 setpoint (PSI)
    pub channel_1_psi: i64,
    /// Channel 2 setpoint (PSI)
    pub channel_2_psi: i64,
}

impl Default for PressureSettings {
    fn default() -> Self {
        Self {
            channel_1_psi: 15,
            channel_2_psi: 15,
        }
    }
}

/// Serpentine raster geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterSettings {
    /// Rows (layers)
    pub rows: u32,
    /// Travel/step units per row
    pub units_per_row: u32,
    /// Axis travelled back and forth
    pub travel_axis: String,
    /// Axis stepped between travels
    pub step_axis: String,
    /// Axis lifted after each row
    pub lift_axis: String,
    /// Travel distance (mm)
    pub travel: f64,
    /// Step distance (mm)
    pub step: f64,
    /// Travel and step speed (mm/s)
    pub speed: f64,
    /// Lift per row (mm)
    pub lift: f64,
    /// Lift speed (mm/s)
    pub lift_speed: f64,
}

impl Default for RasterSettings {
    fn default() -> Self {
        Self {
            rows: 100,
            units_per_row: 5,
            travel_axis: "X".to_string(),
            step_axis: "Y".to_string(),
            lift_axis: "C".to_string(),
            travel: 60.0,
            step: 5.0,
            speed: 50.0,
            lift: 0.4,
            lift_speed: 10.0,
        }
    }
}

/// Valve timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Wait after sending setpoints (ms)
    pub settle_ms: u64,
    /// Wait after each valve opens (ms)
    pub valve_stagger_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            settle_ms: 5000,
            valve_stagger_ms: 100,
        }
    }
}

/// Motion controller setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    /// Axes enabled before printing
    pub axes: Vec<String>,
    /// Simulated move duration multiplier
    pub time_scale: f64,
    /// Task that hosts console programs
    pub program_task: u32,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            axes: vec!["X".to_string(), "Y".to_string(), "C".to_string()],
            time_scale: 1.0,
            program_task: 1,
        }
    }
}

/// Complete application configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Serial link settings
    pub connection: ConnectionSettings,
    /// Initial pressures
    pub pressure: PressureSettings,
    /// Raster geometry
    pub raster: RasterSettings,
    /// Valve timing
    pub timing: TimingSettings,
    /// Motion controller
    pub motion: MotionSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

fn format_for(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(SettingsError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_for(path)?;
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match format_for(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, content).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        let connection = &self.connection;
        if connection.port.trim().is_empty() {
            return Err(SettingsError::invalid("connection.port", "must not be empty"));
        }
        if connection.baud_rate == 0 {
            return Err(SettingsError::invalid("connection.baud_rate", "must be > 0"));
        }
        if connection.timeout_ms == 0 {
            return Err(SettingsError::invalid("connection.timeout_ms", "must be > 0"));
        }
        if connection.wait_for_ack && connection.ack_timeout_ms == 0 {
            return Err(SettingsError::invalid(
                "connection.ack_timeout_ms",
                "must be > 0 when waiting for acknowledgments",
            ));
        }

        for (key, psi) in [
            ("pressure.channel_1_psi", self.pressure.channel_1_psi),
            ("pressure.channel_2_psi", self.pressure.channel_2_psi),
        ] {
            if Psi::new(psi).is_err() {
                return Err(SettingsError::PressureOutOfRange {
                    key: key.to_string(),
                    psi,
                });
            }
        }

        let raster = &self.raster;
        if raster.units_per_row == 0 {
            return Err(SettingsError::invalid("raster.units_per_row", "must be > 0"));
        }
        for (key, axis) in [
            ("raster.travel_axis", &raster.travel_axis),
            ("raster.step_axis", &raster.step_axis),
            ("raster.lift_axis", &raster.lift_axis),
        ] {
            if axis.trim().is_empty() {
                return Err(SettingsError::invalid(key, "axis name must not be empty"));
            }
        }
        for (key, speed) in [
            ("raster.speed", raster.speed),
            ("raster.lift_speed", raster.lift_speed),
        ] {
            if !(speed.is_finite() && speed > 0.0) {
                return Err(SettingsError::invalid(key, "must be > 0"));
            }
        }
        for (key, distance) in [
            ("raster.travel", raster.travel),
            ("raster.step", raster.step),
            ("raster.lift", raster.lift),
        ] {
            if !distance.is_finite() {
                return Err(SettingsError::invalid(key, "must be a finite distance"));
            }
        }

        let motion = &self.motion;
        if motion.axes.is_empty() || motion.axes.iter().any(|a| a.trim().is_empty()) {
            return Err(SettingsError::invalid("motion.axes", "axis names must not be empty"));
        }
        if !(motion.time_scale.is_finite() && motion.time_scale >= 0.0) {
            return Err(SettingsError::invalid("motion.time_scale", "must be >= 0"));
        }
        if motion.program_task == 0 {
            return Err(SettingsError::invalid("motion.program_task", "tasks start at 1"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_rig() {
        let config = Config::default();
        assert_eq!(config.connection.baud_rate, 9600);
        assert_eq!(config.connection.startup_delay_ms, 2000);
        assert!(!config.connection.wait_for_ack);
        assert_eq!(config.pressure.channel_1_psi, 15);
        assert_eq!(config.raster.rows, 100);
        assert_eq!(config.timing.settle_ms, 5000);
        assert_eq!(config.timing.valve_stagger_ms, 100);
        assert_eq!(config.motion.axes, vec!["X", "Y", "C"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_pressure() {
        let mut config = Config::default();
        config.pressure.channel_2_psi = 101;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::PressureOutOfRange { psi: 101, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_motion() {
        let mut config = Config::default();
        config.raster.speed = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.connection.baud_rate = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.motion.axes.push(" ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str("[pressure]\nchannel_1_psi = 40\n").unwrap();
        assert_eq!(config.pressure.channel_1_psi, 40);
        assert_eq!(config.pressure.channel_2_psi, 15);
        assert_eq!(config.raster, RasterSettings::default());
    }

    #[test]
    fn test_unknown_extension() {
        assert!(matches!(
            format_for(Path::new("config.yaml")),
            Err(SettingsError::UnsupportedFormat(_))
        ));
    }
}
