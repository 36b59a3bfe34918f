//! # DispenseKit Motion
//!
//! An in-process [`SimulatedController`] implementing
//! [`dispensekit_core::MotionController`], and the line-oriented motion
//! console that dispatches operator commands to any controller.

pub mod console;
pub mod simulated;

pub use console::{parse_command, ConsoleCommand, ConsoleFlow, ConsoleSession, ParseCommandError, HELP_TEXT};
pub use simulated::{SimulatedController, GLOBAL_INTEGER_COUNT, TASK_COUNT};
