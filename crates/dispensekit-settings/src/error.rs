//! Settings errors
//!
//! File errors carry the path they happened on; validation errors name the
//! dotted key of the offending field (e.g. `pressure.channel_1_psi`).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading, saving or validating the configuration
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The file could not be read
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        /// File being read
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// The file could not be written
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        /// File being written
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// `init` found an existing file
    #[error("{} already exists", path.display())]
    AlreadyExists {
        /// Existing file
        path: PathBuf,
    },

    /// The directory holding the file could not be created
    #[error("Cannot create config directory {}: {source}", path.display())]
    CreateDir {
        /// Directory being created
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// The platform reports no per-user config directory
    #[error("No config directory available on {0}")]
    NoConfigDir(&'static str),

    /// File extension is neither `.toml` nor `.json`
    #[error("Unsupported config format '{0}' (use .toml or .json)")]
    UnsupportedFormat(String),

    /// A field failed validation
    #[error("Invalid setting '{key}': {reason}")]
    Invalid {
        /// Dotted field name
        key: String,
        /// What is wrong with it
        reason: String,
    },

    /// An initial pressure lies outside 0-100 PSI
    #[error("Invalid setting '{key}': {psi} PSI is outside 0 to 100 PSI")]
    PressureOutOfRange {
        /// Dotted field name
        key: String,
        /// Rejected value
        psi: i64,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML error: {0}")]
    TomlWrite(#[from] toml::ser::Error),
}

impl SettingsError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        SettingsError::Invalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Dotted key of the field that failed validation, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            SettingsError::Invalid { key, .. } | SettingsError::PressureOutOfRange { key, .. } => {
                Some(key)
            }
            _ => None,
        }
    }
}

/// Result type alias for settings operations
pub type SettingsResult<T> = Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_field() {
        let err = SettingsError::invalid("connection.baud_rate", "must be > 0");
        assert_eq!(
            err.to_string(),
            "Invalid setting 'connection.baud_rate': must be > 0"
        );
        assert_eq!(err.key(), Some("connection.baud_rate"));

        let err = SettingsError::PressureOutOfRange {
            key: "pressure.channel_1_psi".to_string(),
            psi: 140,
        };
        assert_eq!(
            err.to_string(),
            "Invalid setting 'pressure.channel_1_psi': 140 PSI is outside 0 to 100 PSI"
        );
    }

    #[test]
    fn test_file_errors_carry_path() {
        let err = SettingsError::AlreadyExists {
            path: PathBuf::from("/tmp/config.toml"),
        };
        assert_eq!(err.to_string(), "/tmp/config.toml already exists");
        assert_eq!(err.key(), None);

        let err = SettingsError::Read {
            path: PathBuf::from("rig.toml"),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().starts_with("Failed to read rig.toml"));
    }
}
