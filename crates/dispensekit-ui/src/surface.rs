//! Pressure control surface
//!
//! Front-end independent model behind the valve toggle buttons and the
//! pressure entry fields. Toggles go straight to the driver; pressure
//! submissions only change the desired state, which the print job sends on
//! its next refresh.

use dispensekit_communication::PneumaticDriver;
use dispensekit_core::{Channel, Error, Psi};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced to the operator
#[derive(Error, Debug)]
pub enum SurfaceError {
    /// Entry text is not an integer
    #[error("Invalid input for pressure {channel}: '{input}'")]
    InvalidInput {
        /// Channel whose field was submitted
        channel: Channel,
        /// The text as entered
        input: String,
    },

    /// Entry parsed but lies outside 0-100 PSI
    #[error("Pressure out of range for channel {channel}: {psi} PSI. Must be 0 to 100 PSI.")]
    OutOfRange {
        /// Channel whose field was submitted
        channel: Channel,
        /// The rejected value
        psi: i64,
    },

    /// Valve command could not be sent
    #[error(transparent)]
    Pneumatic(#[from] Error),
}

/// Result of a toggle click
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValveToggle {
    /// Toggled channel
    pub channel: Channel,
    /// Commanded state after the click
    pub now_open: bool,
    /// New button label
    pub label: String,
}

/// Label for a channel's toggle button given its commanded state
pub fn valve_label(channel: Channel, open: bool) -> String {
    if open {
        format!("Close Valve {}", channel)
    } else {
        format!("Open Valve {}", channel)
    }
}

/// Runs before the link is shut down, e.g. to stop a print job
pub type CloseHook = Arc<dyn Fn() + Send + Sync>;

/// Control surface over a shared pneumatic driver
#[derive(Clone)]
pub struct ControlSurface {
    driver: Arc<PneumaticDriver>,
    on_close: Option<CloseHook>,
}

impl std::fmt::Debug for ControlSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlSurface")
            .field("driver", &self.driver)
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

impl ControlSurface {
    /// Create a surface
    pub fn new(driver: Arc<PneumaticDriver>) -> Self {
        Self {
            driver,
            on_close: None,
        }
    }

    /// Run `hook` at close, before the link is shut down
    pub fn with_close_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(hook));
        self
    }

    /// Flip a valve: close it if it is commanded open, open it otherwise
    pub fn toggle_valve(&self, channel: Channel) -> Result<ValveToggle, SurfaceError> {
        let now_open = self.driver.toggle_valve(channel)?;
        tracing::info!(
            "Valve {} {}",
            channel,
            if now_open { "opened" } else { "closed" }
        );
        Ok(ValveToggle {
            channel,
            now_open,
            label: valve_label(channel, now_open),
        })
    }

    /// Current toggle label for a channel
    pub fn valve_label(&self, channel: Channel) -> String {
        valve_label(channel, self.driver.channels().valve_open(channel))
    }

    /// Parse and store a desired pressure; nothing is written to the link
    pub fn submit_pressure(&self, channel: Channel, input: &str) -> Result<Psi, SurfaceError> {
        let raw: i64 = input.trim().parse().map_err(|_| {
            tracing::warn!("Invalid input for pressure {}: '{}'", channel, input);
            SurfaceError::InvalidInput {
                channel,
                input: input.to_string(),
            }
        })?;
        let psi = Psi::new(raw).map_err(|_| {
            tracing::warn!("Rejected pressure {} PSI for channel {}", raw, channel);
            SurfaceError::OutOfRange { channel, psi: raw }
        })?;

        self.driver.channels().set_desired(channel, psi);
        tracing::info!("Updated desired pressure for channel {} to {} PSI", channel, psi);
        Ok(psi)
    }

    /// Desired pressure of a channel
    pub fn desired(&self, channel: Channel) -> Psi {
        self.driver.channels().desired(channel)
    }

    /// Commanded valve state of a channel
    pub fn valve_open(&self, channel: Channel) -> bool {
        self.driver.channels().valve_open(channel)
    }

    /// Window-close hook: vent, close valves, release the link
    pub fn close(&self) -> Result<(), SurfaceError> {
        if let Some(hook) = &self.on_close {
            hook();
        }
        self.driver.shutdown()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispensekit_communication::RecordingCommunicator;
    use dispensekit_core::ChannelBank;

    fn surface() -> (ControlSurface, dispensekit_communication::SentLog) {
        let comm = RecordingCommunicator::connected();
        let log = comm.sent_log();
        let driver = PneumaticDriver::new(Box::new(comm), Arc::new(ChannelBank::default()));
        (ControlSurface::new(Arc::new(driver)), log)
    }

    #[test]
    fn test_toggle_flips_label_and_state() {
        let (surface, log) = surface();
        assert_eq!(surface.valve_label(Channel::One), "Open Valve 1");

        let toggle = surface.toggle_valve(Channel::One).unwrap();
        assert!(toggle.now_open);
        assert_eq!(toggle.label, "Close Valve 1");

        let toggle = surface.toggle_valve(Channel::One).unwrap();
        assert!(!toggle.now_open);
        assert_eq!(toggle.label, "Open Valve 1");
        assert_eq!(log.lines(), vec!["1,-1", "1,-2"]);
    }

    #[test]
    fn test_label_tracks_valves_opened_elsewhere() {
        let (surface, _) = surface();
        surface.driver.open_valve(Channel::Two).unwrap();
        assert_eq!(surface.valve_label(Channel::Two), "Close Valve 2");

        let toggle = surface.toggle_valve(Channel::Two).unwrap();
        assert!(!toggle.now_open);
        assert_eq!(surface.valve_label(Channel::Two), "Open Valve 2");
    }

    #[test]
    fn test_submit_pressure_updates_desired_only() {
        let (surface, log) = surface();
        assert_eq!(surface.submit_pressure(Channel::Two, " 45 ").unwrap().value(), 45);
        assert_eq!(surface.desired(Channel::Two).value(), 45);
        assert!(log.is_empty());
    }

    #[test]
    fn test_submit_pressure_rejects_bad_input() {
        let (surface, _) = surface();
        assert!(matches!(
            surface.submit_pressure(Channel::One, "abc"),
            Err(SurfaceError::InvalidInput { .. })
        ));
        assert!(matches!(
            surface.submit_pressure(Channel::One, "120"),
            Err(SurfaceError::OutOfRange { psi: 120, .. })
        ));
        assert!(surface.submit_pressure(Channel::One, "12.5").is_err());
        assert_eq!(surface.desired(Channel::One).value(), 15);
    }

    #[test]
    fn test_close_runs_cleanup() {
        let (surface, log) = surface();
        surface.close().unwrap();
        assert_eq!(log.lines(), vec!["1,0", "2,0", "1,-2", "2,-2"]);
        assert!(surface.toggle_valve(Channel::One).is_err());
    }

    #[test]
    fn test_close_hook_runs_before_shutdown() {
        let (surface, log) = surface();
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let observed = seen.clone();
        let hook_log = log.clone();
        let surface = surface.with_close_hook(move || {
            *observed.lock() = Some(hook_log.len());
        });

        surface.close().unwrap();
        assert_eq!(*seen.lock(), Some(0));
        assert_eq!(log.len(), 4);
    }
}
