//! Error handling for DispenseKit
//!
//! Provides error types for every layer of the toolkit:
//! - Controller errors (motion controller session, axes, tasks)
//! - Pneumatic errors (channel identity, pressure range, wire protocol)
//! - Connection errors (serial port communication)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Controller error type
///
/// Represents errors raised by a motion controller, including session state
/// violations, axis faults, and task/program failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    /// Controller is not connected
    #[error("Controller not connected")]
    NotConnected,

    /// Controller is connected but has not been started
    #[error("Controller not started")]
    NotStarted,

    /// Axis name is not known to the controller
    #[error("Unknown axis: {axis}")]
    UnknownAxis {
        /// The axis name that was not recognised.
        axis: String,
    },

    /// Motion was requested on a disabled axis
    #[error("Axis {axis} is not enabled")]
    AxisNotEnabled {
        /// The disabled axis.
        axis: String,
    },

    /// Axis fault reported during motion
    #[error("Axis fault on {axis}: {reason}")]
    AxisFault {
        /// The faulted axis.
        axis: String,
        /// Description of the fault.
        reason: String,
    },

    /// Motion on the axis was aborted
    #[error("Motion aborted on axis {axis}")]
    MotionAborted {
        /// The axis whose motion was aborted.
        axis: String,
    },

    /// Move parameters rejected before motion started
    #[error("Invalid move on {axis}: {reason}")]
    InvalidMove {
        /// The axis the move targeted.
        axis: String,
        /// Why the move was rejected.
        reason: String,
    },

    /// Global variable index out of range
    #[error("Global integer index {index} out of range (0..{count})")]
    GlobalIndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of global integers available.
        count: usize,
    },

    /// Task index not available on the controller
    #[error("Task {task} not available")]
    UnknownTask {
        /// The requested task index.
        task: u32,
    },

    /// Program failed to compile or load
    #[error("Failed to compile program {path}: {reason}")]
    ProgramCompile {
        /// Path of the program file.
        path: String,
        /// The compile/load failure.
        reason: String,
    },

    /// Generic controller error
    #[error("Controller error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

impl ControllerError {
    /// Short name of the fault kind, used when reporting to an operator
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotConnected | Self::NotStarted => "ControllerOperationException",
            Self::UnknownAxis { .. } | Self::InvalidMove { .. } => "ControllerArgumentException",
            Self::AxisNotEnabled { .. } | Self::AxisFault { .. } => "ControllerAxisFaultException",
            Self::MotionAborted { .. } => "ControllerAxisAbortException",
            Self::GlobalIndexOutOfRange { .. } | Self::UnknownTask { .. } => {
                "ControllerArgumentException"
            }
            Self::ProgramCompile { .. } => "CompileException",
            Self::Other { .. } => "ControllerException",
        }
    }
}

/// Pneumatic error type
///
/// Represents errors related to the pneumatic channels and their
/// line-based serial protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PneumaticError {
    /// Pressure outside the 0-100 PSI window
    #[error("Pressure out of range: {psi} PSI. Must be 0 to 100 PSI.")]
    PressureOutOfRange {
        /// The rejected pressure.
        psi: i64,
    },

    /// Channel number not defined by the encoding
    #[error("Unknown pneumatic channel: {channel}")]
    UnknownChannel {
        /// The rejected channel number.
        channel: i64,
    },

    /// Line could not be decoded as a pneumatic command
    #[error("Malformed pneumatic command '{line}': {reason}")]
    MalformedCommand {
        /// The offending line, without its terminator.
        line: String,
        /// Why decoding failed.
        reason: String,
    },

    /// Device did not acknowledge a command in time
    #[error("No acknowledgment from device after {timeout_ms}ms")]
    AckTimeout {
        /// The acknowledgment timeout in milliseconds.
        timeout_ms: u64,
    },
}

/// Connection error type
///
/// Represents errors related to the serial link to the pneumatic controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Port not found
    #[error("Port not found: {port}")]
    PortNotFound {
        /// The name of the port that was not found.
        port: String,
    },

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Operation attempted on a closed link
    #[error("Serial link is not open")]
    NotConnected,

    /// Serial port error
    #[error("Serial port error: {reason}")]
    SerialError {
        /// The reason for the serial port error.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Main error type for DispenseKit
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Pneumatic error
    #[error(transparent)]
    Pneumatic(#[from] PneumaticError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a controller error
    pub fn is_controller_error(&self) -> bool {
        matches!(self, Error::Controller(_))
    }

    /// Check if this is a connection or I/O error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Io(_))
    }

    /// Check if this is an acknowledgment timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Pneumatic(PneumaticError::AckTimeout { .. }))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pressure_error_display() {
        let err = PneumaticError::PressureOutOfRange { psi: 120 };
        assert_eq!(
            err.to_string(),
            "Pressure out of range: 120 PSI. Must be 0 to 100 PSI."
        );
    }

    #[test]
    fn test_controller_error_kind() {
        assert_eq!(
            ControllerError::MotionAborted { axis: "X".into() }.kind(),
            "ControllerAxisAbortException"
        );
        assert_eq!(ControllerError::NotStarted.kind(), "ControllerOperationException");
    }

    #[test]
    fn test_error_classification() {
        let err: Error = ControllerError::NotConnected.into();
        assert!(err.is_controller_error());
        assert!(!err.is_connection_error());

        let err: Error = ConnectionError::NotConnected.into();
        assert!(err.is_connection_error());

        let err: Error = PneumaticError::AckTimeout { timeout_ms: 500 }.into();
        assert!(err.is_timeout());
    }
}
