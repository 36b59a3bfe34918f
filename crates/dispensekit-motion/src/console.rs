//! Motion console
//!
//! A prompt-driven command line over a [`MotionController`]. Each input
//! line is one whitespace-separated command; the first token is matched
//! case-insensitively. Controller faults are reported and the loop keeps
//! going.

use dispensekit_core::{
    Axis, AxisFault, Error, LinearMove, MotionController, SharedMotionController, TaskState,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Printed for `help`, empty input and unknown commands
pub const HELP_TEXT: &str = "Available commands:
\tConnect
\tDisconnect
\tStart
\tStop
\tEnable [Axis Name]
\tDisable [Axis Name]
\tHome [Axis Name]
\tAbort [Axis Name]
\tAxisStatus [Axis Name]
\tMoveLinear [Axis Name] [Distance] [Speed]
\tRunProgram [AeroScript Program Path]
\tProgramStatus
\tStopProgram
\tGetGlobalInteger [Index]
\tSetGlobalInteger [Index] [New Value]
\tShowAxisParameters [Axis Name]
\tQuit";

const PROMPT_HINT: &str = "Enter a command (or 'quit' to exit or 'help' for a list of commands)";

/// A parsed console command
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    /// Print the command list
    Help,
    /// Open a controller session
    Connect,
    /// Close the controller session
    Disconnect,
    /// Start the controller
    Start,
    /// Stop the controller
    Stop,
    /// Enable an axis
    Enable(Axis),
    /// Disable an axis
    Disable(Axis),
    /// Home an axis
    Home(Axis),
    /// Abort motion on an axis
    Abort(Axis),
    /// Print position, enabled, homed and calibration state
    AxisStatus(Axis),
    /// Blocking incremental move
    MoveLinear(LinearMove),
    /// Compile and run a program on the console's task
    RunProgram(PathBuf),
    /// Describe the program task state
    ProgramStatus,
    /// Stop the program task
    StopProgram,
    /// Read `$iglobal[index]`
    GetGlobalInteger(usize),
    /// Write `$iglobal[index]`
    SetGlobalInteger {
        /// Global index
        index: usize,
        /// New value
        value: i64,
    },
    /// Print fault protection and motion defaults for an axis
    ShowAxisParameters(Axis),
    /// Leave the console
    Quit,
}

/// Why a line did not parse into a command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseCommandError {
    /// First token is not a command
    #[error("Unknown Command")]
    Unknown {
        /// The unrecognised token
        token: String,
    },

    /// Known command with missing or unparsable arguments
    #[error("Invalid command: you must specify {what}")]
    Invalid {
        /// What the operator must supply
        what: &'static str,
    },
}

fn invalid(what: &'static str) -> ParseCommandError {
    ParseCommandError::Invalid { what }
}

fn single_axis(args: &[&str], what: &'static str) -> Result<Axis, ParseCommandError> {
    match args {
        [axis] => Ok(Axis::new(*axis)),
        _ => Err(invalid(what)),
    }
}

/// Parse one input line
pub fn parse_command(line: &str) -> Result<ConsoleCommand, ParseCommandError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((first, args)) = tokens.split_first() else {
        return Ok(ConsoleCommand::Help);
    };

    let command = match first.to_lowercase().as_str() {
        "help" => ConsoleCommand::Help,
        "connect" => ConsoleCommand::Connect,
        "disconnect" => ConsoleCommand::Disconnect,
        "start" => ConsoleCommand::Start,
        "stop" => ConsoleCommand::Stop,
        "enable" => ConsoleCommand::Enable(single_axis(args, "an axis to enable")?),
        "disable" => ConsoleCommand::Disable(single_axis(args, "an axis to disable")?),
        "home" => ConsoleCommand::Home(single_axis(args, "an axis to home")?),
        "abort" => ConsoleCommand::Abort(single_axis(args, "an axis to abort motion on")?),
        "axisstatus" => {
            ConsoleCommand::AxisStatus(single_axis(args, "an axis to get status from")?)
        }
        "movelinear" => {
            const WHAT: &str = "an axis, distance, and speed for the linear move";
            match args {
                [axis, distance, speed] => {
                    let distance: f64 = distance.parse().map_err(|_| invalid(WHAT))?;
                    let speed: f64 = speed.parse().map_err(|_| invalid(WHAT))?;
                    ConsoleCommand::MoveLinear(LinearMove::new(*axis, distance, speed))
                }
                _ => return Err(invalid(WHAT)),
            }
        }
        "runprogram" => match args {
            [path] => ConsoleCommand::RunProgram(PathBuf::from(path)),
            _ => return Err(invalid("the path to an AeroScript program to run")),
        },
        "programstatus" => ConsoleCommand::ProgramStatus,
        "stopprogram" => ConsoleCommand::StopProgram,
        "getglobalinteger" => {
            const WHAT: &str = "an index to get";
            match args {
                [index] => ConsoleCommand::GetGlobalInteger(
                    index.parse().map_err(|_| invalid(WHAT))?,
                ),
                _ => return Err(invalid(WHAT)),
            }
        }
        "setglobalinteger" => {
            const WHAT: &str = "an index and a new integer value to set";
            match args {
                [index, value] => ConsoleCommand::SetGlobalInteger {
                    index: index.parse().map_err(|_| invalid(WHAT))?,
                    value: value.parse().map_err(|_| invalid(WHAT))?,
                },
                _ => return Err(invalid(WHAT)),
            }
        }
        "showaxisparameters" => ConsoleCommand::ShowAxisParameters(single_axis(
            args,
            "an axis to show parameters for",
        )?),
        "quit" => ConsoleCommand::Quit,
        _ => {
            return Err(ParseCommandError::Unknown {
                token: first.to_string(),
            })
        }
    };
    Ok(command)
}

/// Whether the console loop should keep reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleFlow {
    /// Read the next line
    Continue,
    /// Leave the loop
    Quit,
}

/// Operator-facing name of an error's kind
fn error_kind(err: &Error) -> &'static str {
    match err {
        Error::Controller(e) => e.kind(),
        Error::Pneumatic(_) => "PneumaticError",
        Error::Connection(_) => "ConnectionError",
        Error::Io(_) => "IoError",
        Error::Other(_) => "Error",
    }
}

/// One console session writing to `out`
pub struct ConsoleSession<W: Write> {
    controller: SharedMotionController,
    program_task: u32,
    out: W,
}

impl<W: Write> ConsoleSession<W> {
    /// Create a session running programs on task 1
    pub fn new(controller: SharedMotionController, out: W) -> Self {
        Self {
            controller,
            program_task: 1,
            out,
        }
    }

    /// Run programs on a different task
    pub fn with_program_task(mut self, task: u32) -> Self {
        self.program_task = task;
        self
    }

    /// Consume the session, returning its writer
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Prompt, read and execute lines until `quit` or end of input
    pub fn run<R: BufRead>(&mut self, mut input: R) -> io::Result<()> {
        let mut line = String::new();
        loop {
            writeln!(self.out, "{}", PROMPT_HINT)?;
            write!(self.out, "> ")?;
            self.out.flush()?;

            line.clear();
            if input.read_line(&mut line)? == 0 {
                return Ok(());
            }
            if self.execute_line(&line)? == ConsoleFlow::Quit {
                return Ok(());
            }
        }
    }

    /// Execute a single line
    pub fn execute_line(&mut self, line: &str) -> io::Result<ConsoleFlow> {
        let command = match parse_command(line) {
            Ok(command) => command,
            Err(e @ ParseCommandError::Unknown { .. }) => {
                tracing::debug!("Unknown console command: {}", line.trim());
                writeln!(self.out, "{}", e)?;
                writeln!(self.out, "{}", HELP_TEXT)?;
                return Ok(ConsoleFlow::Continue);
            }
            Err(e) => {
                writeln!(self.out, "{}", e)?;
                return Ok(ConsoleFlow::Continue);
            }
        };

        if command == ConsoleCommand::Quit {
            return Ok(ConsoleFlow::Quit);
        }
        if let Err(e) = self.execute(&command) {
            match e {
                CommandFailure::Io(e) => return Err(e),
                CommandFailure::Controller(e) => {
                    tracing::warn!("Console command {:?} failed: {}", command, e);
                    let message = match &e {
                        Error::Controller(inner) => inner.to_string(),
                        other => other.to_string(),
                    };
                    writeln!(self.out, "Unexpected {}: {}", error_kind(&e), message)?;
                }
            }
        }
        Ok(ConsoleFlow::Continue)
    }

    fn require_connection(&mut self, before: &str) -> io::Result<bool> {
        if self.controller.is_connected() {
            Ok(true)
        } else {
            writeln!(self.out, "You must connect to the controller before {}", before)?;
            Ok(false)
        }
    }

    fn execute(&mut self, command: &ConsoleCommand) -> Result<(), CommandFailure> {
        let controller = self.controller.clone();
        match command {
            ConsoleCommand::Help => writeln!(self.out, "{}", HELP_TEXT)?,
            ConsoleCommand::Connect => {
                if controller.is_connected() {
                    writeln!(self.out, "Already connected")?;
                } else {
                    controller.connect()?;
                    writeln!(self.out, "Connected to {}", controller.name())?;
                }
            }
            ConsoleCommand::Disconnect => {
                if !controller.is_connected() {
                    writeln!(self.out, "Already disconnected")?;
                } else {
                    controller.disconnect()?;
                    writeln!(self.out, "Disconnected from {}", controller.name())?;
                }
            }
            ConsoleCommand::Start => {
                if self.require_connection("you can start it")? {
                    controller.start()?;
                    writeln!(self.out, "Controller started")?;
                }
            }
            ConsoleCommand::Stop => {
                if self.require_connection("you can stop it")? {
                    controller.stop()?;
                    writeln!(self.out, "Controller stopped")?;
                }
            }
            ConsoleCommand::Enable(axis) => {
                if self.require_connection("enabling an axis")? {
                    controller.enable(std::slice::from_ref(axis))?;
                    writeln!(self.out, "Axis {} enabled", axis)?;
                }
            }
            ConsoleCommand::Disable(axis) => {
                if self.require_connection("disabling an axis")? {
                    controller.disable(std::slice::from_ref(axis))?;
                    writeln!(self.out, "Axis {} disabled", axis)?;
                }
            }
            ConsoleCommand::Home(axis) => {
                if self.require_connection("homing an axis")? {
                    controller.home(std::slice::from_ref(axis))?;
                    writeln!(self.out, "Axis {} homed", axis)?;
                }
            }
            ConsoleCommand::Abort(axis) => {
                if self.require_connection("aborting")? {
                    controller.abort(axis)?;
                    writeln!(self.out, "Motion aborted on axis {}", axis)?;
                }
            }
            ConsoleCommand::AxisStatus(axis) => {
                if self.require_connection("getting an axis's status")? {
                    let status = controller.axis_status(axis)?;
                    writeln!(self.out, "Axis {} Status", axis)?;
                    writeln!(self.out, "------------")?;
                    writeln!(self.out, "Position: {}", status.program_position)?;
                    writeln!(self.out, "Enabled: {}", status.is_enabled())?;
                    writeln!(self.out, "Homed: {}", status.is_homed())?;
                    writeln!(self.out, "Calibration State: {}", status.is_calibrated())?;
                }
            }
            ConsoleCommand::MoveLinear(motion) => {
                if self.require_connection("moving an axis")? {
                    writeln!(self.out, "Moving axis {}", motion.axis)?;
                    self.out.flush()?;
                    controller.move_linear(motion)?;
                    writeln!(self.out, "Move complete")?;
                }
            }
            ConsoleCommand::RunProgram(path) => {
                if self.require_connection("running an AeroScript program")? {
                    writeln!(self.out, "Starting AeroScript program")?;
                    controller.run_program(self.program_task, path)?;
                }
            }
            ConsoleCommand::ProgramStatus => {
                if self.require_connection("getting an AeroScript program's status")? {
                    let status = controller.task_status(self.program_task)?;
                    match status.state {
                        TaskState::Error => writeln!(
                            self.out,
                            "An AeroScript error occurred: {}",
                            status.error_message.as_deref().unwrap_or("unknown error")
                        )?,
                        TaskState::Idle => {
                            writeln!(self.out, "No AeroScript program is loaded or running")?
                        }
                        TaskState::ProgramReady => {
                            writeln!(self.out, "The AeroScript program has not started yet")?
                        }
                        TaskState::ProgramRunning => {
                            writeln!(self.out, "The AeroScript program is running")?
                        }
                        TaskState::ProgramPaused | TaskState::ProgramFeedhold => {
                            writeln!(self.out, "The AeroScript program is paused")?
                        }
                        TaskState::ProgramComplete => {
                            writeln!(self.out, "The AeroScript program has completed")?
                        }
                        other => writeln!(self.out, "Task {} is {}", self.program_task, other)?,
                    }
                }
            }
            ConsoleCommand::StopProgram => {
                if self.require_connection("stopping a program")? {
                    controller.stop_program(self.program_task)?;
                    writeln!(self.out, "Program stopped")?;
                }
            }
            ConsoleCommand::GetGlobalInteger(index) => {
                if self.require_connection("querying a global integer")? {
                    let value = controller.global_integer(*index)?;
                    writeln!(self.out, "$iglobal[{}] is {}", index, value)?;
                }
            }
            ConsoleCommand::SetGlobalInteger { index, value } => {
                if self.require_connection("setting a global integer")? {
                    controller.set_global_integer(*index, *value)?;
                    writeln!(self.out, "$iglobal[{}] is now set to: {}", index, value)?;
                }
            }
            ConsoleCommand::ShowAxisParameters(axis) => {
                if self.require_connection("showing axis parameters")? {
                    let params = controller.axis_parameters(axis)?;
                    let protection = if params.fault_mask.contains(AxisFault::MOTOR_TEMPERATURE) {
                        "Enabled"
                    } else {
                        "Disabled"
                    };
                    writeln!(self.out, "Motor Temperature Fault protection: {}", protection)?;
                    writeln!(self.out, "Default Axis Speed: {}", params.default_axis_speed)?;
                    writeln!(
                        self.out,
                        "Default Axis Ramp Rate: {}",
                        params.default_axis_ramp_rate
                    )?;
                }
            }
            ConsoleCommand::Quit => {}
        }
        Ok(())
    }
}

enum CommandFailure {
    Io(io::Error),
    Controller(Error),
}

impl From<io::Error> for CommandFailure {
    fn from(e: io::Error) -> Self {
        CommandFailure::Io(e)
    }
}

impl From<Error> for CommandFailure {
    fn from(e: Error) -> Self {
        CommandFailure::Controller(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_line_is_help() {
        assert_eq!(parse_command("   ").unwrap(), ConsoleCommand::Help);
    }

    #[test]
    fn test_tokens_are_case_insensitive() {
        assert_eq!(
            parse_command("MoveLinear Y -5 50").unwrap(),
            ConsoleCommand::MoveLinear(LinearMove::new("Y", -5.0, 50.0))
        );
        assert_eq!(
            parse_command("ENABLE C").unwrap(),
            ConsoleCommand::Enable(Axis::new("C"))
        );
    }

    #[test]
    fn test_missing_arguments_name_what_is_missing() {
        assert_eq!(
            parse_command("enable").unwrap_err().to_string(),
            "Invalid command: you must specify an axis to enable"
        );
        assert_eq!(
            parse_command("movelinear X ten 50").unwrap_err().to_string(),
            "Invalid command: you must specify an axis, distance, and speed for the linear move"
        );
        assert_eq!(
            parse_command("setglobalinteger 4").unwrap_err().to_string(),
            "Invalid command: you must specify an index and a new integer value to set"
        );
        assert!(parse_command("getglobalinteger -1").is_err());
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse_command("fly X").unwrap_err(),
            ParseCommandError::Unknown {
                token: "fly".to_string()
            }
        );
    }

    #[test]
    fn test_signed_global_values() {
        assert_eq!(
            parse_command("setglobalinteger 3 -12").unwrap(),
            ConsoleCommand::SetGlobalInteger {
                index: 3,
                value: -12
            }
        );
    }
}
