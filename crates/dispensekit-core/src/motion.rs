//! Motion controller abstraction
//!
//! The vendor motion-controller SDK sits behind [`MotionController`]. All
//! calls are synchronous; `move_linear` blocks until the move has physically
//! completed, so callers that must stay responsive run motion on a
//! dedicated thread.

use crate::error::Result;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Controller-managed degree of freedom, addressed by name (e.g. `X`, `Y`, `C`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Axis(String);

impl Axis {
    /// Create an axis from its controller name
    pub fn new(name: impl Into<String>) -> Self {
        Axis(name.into().trim().to_string())
    }

    /// Controller name of the axis
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Axis {
    fn from(name: &str) -> Self {
        Axis::new(name)
    }
}

/// One blocking linear move: incremental distance on one axis at a speed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearMove {
    /// Axis to move
    pub axis: Axis,
    /// Signed incremental distance (mm)
    pub distance: f64,
    /// Speed (mm/s)
    pub speed: f64,
}

impl LinearMove {
    /// Create a move
    pub fn new(axis: impl Into<Axis>, distance: f64, speed: f64) -> Self {
        Self {
            axis: axis.into(),
            distance,
            speed,
        }
    }
}

impl fmt::Display for LinearMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:+} @ {}", self.axis, self.distance, self.speed)
    }
}

bitflags! {
    /// Drive status bits reported per axis
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DriveStatus: u32 {
        /// Drive output enabled
        const ENABLED = 1 << 0;
        /// Clockwise end-of-travel limit input active
        const CW_END_OF_TRAVEL = 1 << 1;
        /// Counter-clockwise end-of-travel limit input active
        const CCW_END_OF_TRAVEL = 1 << 2;
        /// Home limit input active
        const HOME_LIMIT = 1 << 3;
    }
}

bitflags! {
    /// Axis status bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AxisStatusFlags: u32 {
        /// Axis homed since the last controller reset
        const HOMED = 1 << 0;
        /// Profile currently executing on the axis
        const PROFILING = 1 << 1;
        /// Motion complete and settled
        const MOTION_DONE = 1 << 2;
        /// 1D calibration table active
        const CALIBRATION_ENABLED_1D = 1 << 8;
        /// 2D calibration table active
        const CALIBRATION_ENABLED_2D = 1 << 9;
    }
}

bitflags! {
    /// Axis fault bits, also used as the per-axis fault protection mask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AxisFault: u32 {
        /// Position error exceeded its threshold
        const POSITION_ERROR = 1 << 0;
        /// Over-current detected
        const OVER_CURRENT = 1 << 1;
        /// Clockwise end-of-travel limit hit
        const CW_END_OF_TRAVEL = 1 << 2;
        /// Counter-clockwise end-of-travel limit hit
        const CCW_END_OF_TRAVEL = 1 << 3;
        /// Motor temperature limit exceeded
        const MOTOR_TEMPERATURE = 1 << 9;
    }
}

/// Snapshot of one axis
#[derive(Debug, Clone, PartialEq)]
pub struct AxisStatus {
    /// Axis the snapshot belongs to
    pub axis: Axis,
    /// Position in program space, before transformation to the drive
    pub program_position: f64,
    /// Drive status bits
    pub drive_status: DriveStatus,
    /// Axis status bits
    pub axis_status: AxisStatusFlags,
}

impl AxisStatus {
    /// Drive output enabled
    pub fn is_enabled(&self) -> bool {
        self.drive_status.contains(DriveStatus::ENABLED)
    }

    /// Homed since last reset
    pub fn is_homed(&self) -> bool {
        self.axis_status.contains(AxisStatusFlags::HOMED)
    }

    /// Either calibration table active
    pub fn is_calibrated(&self) -> bool {
        self.axis_status.intersects(
            AxisStatusFlags::CALIBRATION_ENABLED_1D | AxisStatusFlags::CALIBRATION_ENABLED_2D,
        )
    }
}

/// Commonly inspected axis parameters
#[derive(Debug, Clone, PartialEq)]
pub struct AxisParameters {
    /// Faults the controller protects against on this axis
    pub fault_mask: AxisFault,
    /// Speed used when a move does not specify one (mm/s)
    pub default_axis_speed: f64,
    /// Default ramp rate (mm/s²)
    pub default_axis_ramp_rate: f64,
}

impl Default for AxisParameters {
    fn default() -> Self {
        Self {
            fault_mask: AxisFault::all(),
            default_axis_speed: 10.0,
            default_axis_ramp_rate: 1000.0,
        }
    }
}

/// State of a controller task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Task does not exist on this controller
    Unavailable,
    /// Task disabled
    Inactive,
    /// No program loaded or running
    Idle,
    /// Program loaded but not started
    ProgramReady,
    /// Program running
    ProgramRunning,
    /// Program held by feedhold
    ProgramFeedhold,
    /// Program paused
    ProgramPaused,
    /// Program ran to completion
    ProgramComplete,
    /// Command queue running
    QueueRunning,
    /// Command queue paused
    QueuePaused,
    /// Task stopped on an error
    Error,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Unavailable => "Unavailable",
            TaskState::Inactive => "Inactive",
            TaskState::Idle => "Idle",
            TaskState::ProgramReady => "ProgramReady",
            TaskState::ProgramRunning => "ProgramRunning",
            TaskState::ProgramFeedhold => "ProgramFeedhold",
            TaskState::ProgramPaused => "ProgramPaused",
            TaskState::ProgramComplete => "ProgramComplete",
            TaskState::QueueRunning => "QueueRunning",
            TaskState::QueuePaused => "QueuePaused",
            TaskState::Error => "Error",
        };
        f.write_str(name)
    }
}

/// A moment-in-time view of a controller task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatus {
    /// Task state
    pub state: TaskState,
    /// Error message when `state` is [`TaskState::Error`]
    pub error_message: Option<String>,
}

impl TaskStatus {
    /// Status without an error message
    pub fn new(state: TaskState) -> Self {
        Self {
            state,
            error_message: None,
        }
    }
}

/// Motion controller session
///
/// Implementations use interior mutability so that one controller can be
/// shared between the console and a print thread behind an `Arc`.
pub trait MotionController: Send + Sync {
    /// Display name of the controller
    fn name(&self) -> &str;

    /// Open a session. Does not change the controller's running state.
    fn connect(&self) -> Result<()>;

    /// Close the session. The controller may keep running.
    fn disconnect(&self) -> Result<()>;

    /// Whether a session is open
    fn is_connected(&self) -> bool;

    /// Start the controller; no-op when already running
    fn start(&self) -> Result<()>;

    /// Stop the controller; no-op when already stopped
    fn stop(&self) -> Result<()>;

    /// Whether the controller is running
    fn is_running(&self) -> bool;

    /// Enable axes
    fn enable(&self, axes: &[Axis]) -> Result<()>;

    /// Disable axes
    fn disable(&self, axes: &[Axis]) -> Result<()>;

    /// Home axes
    fn home(&self, axes: &[Axis]) -> Result<()>;

    /// Abort motion on an axis
    fn abort(&self, axis: &Axis) -> Result<()>;

    /// Execute a linear move, blocking until it completes
    fn move_linear(&self, motion: &LinearMove) -> Result<()>;

    /// Query axis status bitfields and position
    fn axis_status(&self, axis: &Axis) -> Result<AxisStatus>;

    /// Read commonly used axis parameters
    fn axis_parameters(&self, axis: &Axis) -> Result<AxisParameters>;

    /// Read a controller-resident global integer (`$iglobal[index]`)
    fn global_integer(&self, index: usize) -> Result<i64>;

    /// Write a controller-resident global integer
    fn set_global_integer(&self, index: usize, value: i64) -> Result<()>;

    /// Compile and start a program on a task. Returns without waiting for completion.
    fn run_program(&self, task: u32, path: &Path) -> Result<()>;

    /// Stop the program on a task, waiting for it to stop
    fn stop_program(&self, task: u32) -> Result<()>;

    /// Current status of a task
    fn task_status(&self, task: u32) -> Result<TaskStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_trims_name() {
        assert_eq!(Axis::new(" X ").name(), "X");
        assert_eq!(Axis::from("C").to_string(), "C");
    }

    #[test]
    fn test_axis_status_bits() {
        let status = AxisStatus {
            axis: Axis::new("Y"),
            program_position: 5.0,
            drive_status: DriveStatus::ENABLED,
            axis_status: AxisStatusFlags::HOMED | AxisStatusFlags::CALIBRATION_ENABLED_2D,
        };
        assert!(status.is_enabled());
        assert!(status.is_homed());
        assert!(status.is_calibrated());

        let idle = AxisStatus {
            drive_status: DriveStatus::empty(),
            axis_status: AxisStatusFlags::empty(),
            ..status
        };
        assert!(!idle.is_enabled());
        assert!(!idle.is_calibrated());
    }

    #[test]
    fn test_linear_move_display() {
        let mv = LinearMove::new("X", -60.0, 50.0);
        assert_eq!(mv.to_string(), "X -60 @ 50");
    }
}
