//! Line-based front-end for the control surface
//!
//! Stands in for the button window when no display is available:
//! `toggle <n>` clicks a valve button, `pressure <n> <psi>` fills and
//! submits a pressure field, `quit` closes the window.

use crate::surface::{ControlSurface, SurfaceError};
use dispensekit_core::Channel;
use std::io::{self, BufRead, Write};

const HELP: &str = "Commands:
\ttoggle [1|2]          open or close a valve
\tpressure [1|2] [psi]  set the desired pressure (0-100)
\tstatus                show valves and pressures
\thelp
\tquit                  vent, close valves and exit";

type StatusFn = Box<dyn Fn() -> String + Send>;

/// Terminal control surface writing to `out`
pub struct TerminalSurface<W: Write> {
    surface: ControlSurface,
    out: W,
    job_status: Option<StatusFn>,
}

impl<W: Write> TerminalSurface<W> {
    /// Create a terminal front-end
    pub fn new(surface: ControlSurface, out: W) -> Self {
        Self {
            surface,
            out,
            job_status: None,
        }
    }

    /// Append a line from `status` to every `status` report
    pub fn with_job_status(mut self, status: impl Fn() -> String + Send + 'static) -> Self {
        self.job_status = Some(Box::new(status));
        self
    }

    /// Consume the front-end, returning its writer
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Read commands until `quit` or end of input, then run the close hook
    pub fn run<R: BufRead>(&mut self, input: R) -> io::Result<()> {
        writeln!(self.out, "Pressure Control System")?;
        self.print_status()?;
        write!(self.out, "> ")?;
        self.out.flush()?;

        for line in input.lines() {
            let line = line?;
            if !self.execute_line(&line)? {
                break;
            }
            write!(self.out, "> ")?;
            self.out.flush()?;
        }

        writeln!(self.out)?;
        match self.surface.close() {
            Ok(()) => writeln!(self.out, "Cleaned up and closed valves.")?,
            Err(e) => writeln!(self.out, "Cleanup incomplete: {}", e)?,
        }
        Ok(())
    }

    /// Execute one line; returns false when the operator quits
    pub fn execute_line(&mut self, line: &str) -> io::Result<bool> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [] => {}
            ["quit" | "exit" | "q"] => return Ok(false),
            ["help" | "?"] => writeln!(self.out, "{}", HELP)?,
            ["status"] => self.print_status()?,
            ["toggle" | "valve", channel] => match channel.parse::<Channel>() {
                Ok(channel) => match self.surface.toggle_valve(channel) {
                    Ok(toggle) => writeln!(
                        self.out,
                        "Valve {} {} [{}]",
                        channel,
                        if toggle.now_open { "open" } else { "closed" },
                        toggle.label
                    )?,
                    Err(e) => self.report(&e)?,
                },
                Err(e) => writeln!(self.out, "{}", e)?,
            },
            ["pressure", channel, psi] => match channel.parse::<Channel>() {
                Ok(channel) => match self.surface.submit_pressure(channel, psi) {
                    Ok(psi) => writeln!(
                        self.out,
                        "Updated desired pressure for channel {} to: {} PSI",
                        channel, psi
                    )?,
                    Err(e) => self.report(&e)?,
                },
                Err(e) => writeln!(self.out, "{}", e)?,
            },
            _ => {
                writeln!(self.out, "Unknown command: {}", line.trim())?;
                writeln!(self.out, "{}", HELP)?;
            }
        }
        Ok(true)
    }

    fn report(&mut self, err: &SurfaceError) -> io::Result<()> {
        writeln!(self.out, "{}", err)
    }

    fn print_status(&mut self) -> io::Result<()> {
        for channel in Channel::ALL {
            writeln!(
                self.out,
                "Channel {}: {} PSI, valve {}",
                channel,
                self.surface.desired(channel),
                if self.surface.valve_open(channel) {
                    "open"
                } else {
                    "closed"
                }
            )?;
        }
        if let Some(status) = &self.job_status {
            writeln!(self.out, "{}", status())?;
        }
        Ok(())
    }
}
