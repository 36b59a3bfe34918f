//! # DispenseKit
//!
//! Pneumatic dispensing and motion sequencing for direct-ink-writing rigs:
//! - Two pressure channels driven over a line-based serial protocol
//! - A serpentine raster sequencer that keeps both pressures refreshed
//! - A print orchestrator (pressurize, dispense, close) on its own thread
//! - A pressure control surface (terminal, or GTK4 with the `gtk` feature)
//! - An interactive motion-controller console
//!
//! ## Architecture
//!
//! 1. **dispensekit-core** - Channels, pressures, motion trait, errors
//! 2. **dispensekit-communication** - Serial links and the pneumatic protocol
//! 3. **dispensekit-motion** - Simulated controller and the console
//! 4. **dispensekit-print** - Raster pattern, sequencer, orchestrator
//! 5. **dispensekit-settings** - Config file handling
//! 6. **dispensekit-ui** - Control surface front-ends
//! 7. **dispensekit** - This binary crate

pub mod app;

pub use dispensekit_communication::{
    list_ports, AckPolicy, PneumaticConfig, PneumaticDriver, RecordingCommunicator,
    SerialCommunicator,
};
pub use dispensekit_core::{Channel, ChannelBank, Error, MotionController, Psi, Result};
pub use dispensekit_motion::{ConsoleSession, SimulatedController};
pub use dispensekit_print::{JobReport, JobState, PrintHandle, PrintJob, PrintOrchestrator};
pub use dispensekit_settings::{Config, SettingsManager};
pub use dispensekit_ui::{ControlSurface, TerminalSurface};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Initialize tracing/logging
///
/// Honours `RUST_LOG`; otherwise logs at `info`, or `debug` when `verbose`.
/// Output goes to stderr so console and control-surface text stays on stdout.
pub fn init_logging(verbose: bool, format: LogFormat) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true)
                    .with_thread_names(true),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_thread_names(true),
            )
            .try_init()?,
    }

    Ok(())
}
