//! Pneumatic channel driver
//!
//! [`PneumaticDriver`] owns the link to the pneumatic controller and the
//! shared [`ChannelBank`]. Each command is encoded, written and flushed
//! under the link lock, and the bank is updated before that lock is
//! released, so the recorded state always matches the last bytes on the
//! wire. In ACK mode the reply is awaited under the same lock.

use super::protocol::{DeviceReply, LineBuffer, PneumaticCommand};
use crate::communication::{Communicator, ConnectionParams};
use dispensekit_core::{Channel, ChannelBank, ConnectionError, Error, PneumaticError, Psi, Result};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const ACK_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Upper bound on reads per [`PneumaticDriver::drain_messages`] call
pub const MAX_DRAIN_READS: usize = 16;

/// Whether commands wait for a device acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckPolicy {
    /// Fire and forget
    #[default]
    None,
    /// Read lines after each write until `ACK` arrives or the timeout elapses
    WaitForAck {
        /// How long to wait per command
        timeout: Duration,
    },
}

/// How to bring up the pneumatic link
#[derive(Debug, Clone, PartialEq)]
pub struct PneumaticConfig {
    /// Link parameters
    pub params: ConnectionParams,
    /// Pause after opening while the microcontroller resets
    pub startup_delay: Duration,
    /// Acknowledgment handling
    pub ack: AckPolicy,
}

impl Default for PneumaticConfig {
    fn default() -> Self {
        Self {
            params: ConnectionParams::default(),
            startup_delay: Duration::from_millis(2000),
            ack: AckPolicy::None,
        }
    }
}

/// Result of a pressure request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetpointOutcome {
    /// Command written and desired state updated
    Sent,
    /// Request outside 0-100 PSI; nothing written, state unchanged
    Rejected,
}

struct Link {
    comm: Box<dyn Communicator>,
    lines: LineBuffer,
    released: bool,
}

/// Driver for the two-channel pneumatic controller
pub struct PneumaticDriver {
    link: Mutex<Link>,
    channels: Arc<ChannelBank>,
    ack: AckPolicy,
}

impl PneumaticDriver {
    /// Wrap an already-open communicator
    pub fn new(comm: Box<dyn Communicator>, channels: Arc<ChannelBank>) -> Self {
        Self {
            link: Mutex::new(Link {
                comm,
                lines: LineBuffer::new(),
                released: false,
            }),
            channels,
            ack: AckPolicy::None,
        }
    }

    /// Set the acknowledgment policy
    pub fn with_ack_policy(mut self, ack: AckPolicy) -> Self {
        self.ack = ack;
        self
    }

    /// Open `comm` with the configured parameters and wait out the board reset
    pub fn open(
        config: &PneumaticConfig,
        mut comm: Box<dyn Communicator>,
        channels: Arc<ChannelBank>,
    ) -> Result<Self> {
        comm.connect(&config.params)?;
        tracing::info!(
            "Pneumatic controller on {} at {} baud",
            config.params.port,
            config.params.baud_rate
        );
        if !config.startup_delay.is_zero() {
            tracing::debug!("Waiting {:?} for controller reset", config.startup_delay);
            thread::sleep(config.startup_delay);
        }

        let driver = Self::new(comm, channels).with_ack_policy(config.ack);
        driver.drain_messages()?;
        Ok(driver)
    }

    /// Shared channel state
    pub fn channels(&self) -> &Arc<ChannelBank> {
        &self.channels
    }

    /// Whether the link is open and not yet released
    pub fn is_connected(&self) -> bool {
        let link = self.link.lock();
        !link.released && link.comm.is_connected()
    }

    /// Write `"{channel},-1\n"` and record the valve as open
    pub fn open_valve(&self, channel: Channel) -> Result<()> {
        self.command_valve(channel, true)
    }

    /// Write `"{channel},-2\n"` and record the valve as closed
    pub fn close_valve(&self, channel: Channel) -> Result<()> {
        self.command_valve(channel, false)
    }

    /// Send the opposite of the recorded valve state; returns the new state
    pub fn toggle_valve(&self, channel: Channel) -> Result<bool> {
        let mut link = self.lock_link()?;
        let open = !self.channels.valve_open(channel);
        self.write(&mut link, valve_command(channel, open))?;
        self.channels.set_valve_open(channel, open);
        Ok(open)
    }

    fn command_valve(&self, channel: Channel, open: bool) -> Result<()> {
        let mut link = self.lock_link()?;
        self.write(&mut link, valve_command(channel, open))?;
        self.channels.set_valve_open(channel, open);
        Ok(())
    }

    /// Validate and send a pressure setpoint
    ///
    /// Out-of-range requests are logged and return
    /// [`SetpointOutcome::Rejected`] without touching the link or the bank.
    pub fn set_pressure(&self, channel: Channel, psi: i64) -> Result<SetpointOutcome> {
        let psi = match Psi::new(psi) {
            Ok(psi) => psi,
            Err(e) => {
                tracing::warn!("Channel {}: {}", channel, e);
                return Ok(SetpointOutcome::Rejected);
            }
        };
        let mut link = self.lock_link()?;
        self.write(&mut link, PneumaticCommand::SetPressure { channel, psi })?;
        self.channels.set_desired(channel, psi);
        Ok(SetpointOutcome::Sent)
    }

    /// Re-send both channels' desired pressures without changing them
    pub fn refresh_pressures(&self) -> Result<()> {
        let mut link = self.lock_link()?;
        let (p1, p2) = self.channels.desired_pair();
        self.write(
            &mut link,
            PneumaticCommand::SetPressure {
                channel: Channel::One,
                psi: p1,
            },
        )?;
        self.write(
            &mut link,
            PneumaticCommand::SetPressure {
                channel: Channel::Two,
                psi: p2,
            },
        )
    }

    /// Read and log whatever the controller has printed
    ///
    /// Stops at the first empty read or after [`MAX_DRAIN_READS`] reads, so
    /// a board that never goes quiet cannot stall the caller.
    pub fn drain_messages(&self) -> Result<Vec<String>> {
        let mut link = self.link.lock();
        if link.released {
            return Ok(Vec::new());
        }

        let mut messages = Vec::new();
        for _ in 0..MAX_DRAIN_READS {
            let bytes = link.comm.receive()?;
            if bytes.is_empty() {
                return Ok(messages);
            }
            for line in link.lines.push(&bytes) {
                tracing::debug!("pneumatic: {}", line);
                messages.push(line);
            }
        }
        tracing::debug!(
            "Controller still talking after {} reads, continuing",
            MAX_DRAIN_READS
        );
        Ok(messages)
    }

    /// Vent both channels, close both valves and release the link
    ///
    /// Every step is attempted even if an earlier one fails; the first
    /// failure is returned. Calling again after release does nothing.
    pub fn shutdown(&self) -> Result<()> {
        if self.link.lock().released {
            return Ok(());
        }
        tracing::info!("Shutting down pneumatic controller");

        let steps: [(&str, Result<()>); 4] = [
            ("zero channel 1", self.set_pressure(Channel::One, 0).map(|_| ())),
            ("zero channel 2", self.set_pressure(Channel::Two, 0).map(|_| ())),
            ("close valve 1", self.close_valve(Channel::One)),
            ("close valve 2", self.close_valve(Channel::Two)),
        ];

        let mut first_error = None;
        for (step, result) in steps {
            if let Err(e) = result {
                tracing::warn!("Cleanup step '{}' failed: {}", step, e);
                first_error.get_or_insert(e);
            }
        }

        let mut link = self.link.lock();
        if let Err(e) = link.comm.disconnect() {
            tracing::warn!("Failed to release serial port: {}", e);
            first_error.get_or_insert(e);
        }
        link.released = true;

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn lock_link(&self) -> Result<MutexGuard<'_, Link>> {
        let link = self.link.lock();
        if link.released {
            return Err(ConnectionError::NotConnected.into());
        }
        Ok(link)
    }

    fn write(&self, link: &mut Link, command: PneumaticCommand) -> Result<()> {
        let line = command.encode();
        tracing::debug!("-> {}", line.trim_end());
        link.comm.send(line.as_bytes())?;
        link.comm.flush()?;

        if let AckPolicy::WaitForAck { timeout } = self.ack {
            Self::await_ack(link, timeout)?;
        }
        Ok(())
    }

    fn await_ack(link: &mut Link, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let bytes = link.comm.receive()?;
            for line in link.lines.push(&bytes) {
                match DeviceReply::parse(&line) {
                    DeviceReply::Ack => return Ok(()),
                    DeviceReply::Message(msg) => tracing::debug!("pneumatic: {}", msg),
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::from(PneumaticError::AckTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                }));
            }
            if bytes.is_empty() {
                thread::sleep(ACK_POLL_INTERVAL);
            }
        }
    }
}

fn valve_command(channel: Channel, open: bool) -> PneumaticCommand {
    if open {
        PneumaticCommand::OpenValve(channel)
    } else {
        PneumaticCommand::CloseValve(channel)
    }
}

impl std::fmt::Debug for PneumaticDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PneumaticDriver")
            .field("channels", &self.channels)
            .field("ack", &self.ack)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::RecordingCommunicator;

    fn driver() -> (PneumaticDriver, crate::communication::SentLog) {
        let comm = RecordingCommunicator::connected();
        let log = comm.sent_log();
        (
            PneumaticDriver::new(Box::new(comm), Arc::new(ChannelBank::default())),
            log,
        )
    }

    #[test]
    fn test_valve_commands() {
        let (driver, log) = driver();
        driver.open_valve(Channel::One).unwrap();
        assert!(driver.channels().valve_open(Channel::One));
        driver.close_valve(Channel::One).unwrap();
        assert!(!driver.channels().valve_open(Channel::One));
        assert_eq!(log.lines(), vec!["1,-1", "1,-2"]);
    }

    #[test]
    fn test_rejected_pressure_writes_nothing() {
        let (driver, log) = driver();
        assert_eq!(
            driver.set_pressure(Channel::Two, 150).unwrap(),
            SetpointOutcome::Rejected
        );
        assert!(log.is_empty());
        assert_eq!(driver.channels().desired(Channel::Two).value(), 15);
    }

    #[test]
    fn test_refresh_sends_both_channels() {
        let (driver, log) = driver();
        driver.set_pressure(Channel::One, 22).unwrap();
        log.clear();
        driver.refresh_pressures().unwrap();
        assert_eq!(log.lines(), vec!["1,22", "2,15"]);
    }

    #[test]
    fn test_ack_timeout() {
        let comm = RecordingCommunicator::connected();
        let driver = PneumaticDriver::new(Box::new(comm), Arc::new(ChannelBank::default()))
            .with_ack_policy(AckPolicy::WaitForAck {
                timeout: Duration::from_millis(20),
            });
        let err = driver.open_valve(Channel::Two).unwrap_err();
        assert!(err.is_timeout());
        assert!(!driver.channels().valve_open(Channel::Two));
    }

    #[test]
    fn test_ack_received() {
        let comm = RecordingCommunicator::connected().with_auto_ack();
        comm.push_reply("boot\n");
        let driver = PneumaticDriver::new(Box::new(comm), Arc::new(ChannelBank::default()))
            .with_ack_policy(AckPolicy::WaitForAck {
                timeout: Duration::from_millis(200),
            });
        driver.open_valve(Channel::Two).unwrap();
        assert!(driver.channels().valve_open(Channel::Two));
    }

    #[test]
    fn test_toggle_follows_recorded_state() {
        let (driver, log) = driver();
        assert!(driver.toggle_valve(Channel::Two).unwrap());
        assert!(driver.channels().valve_open(Channel::Two));
        assert!(!driver.toggle_valve(Channel::Two).unwrap());
        assert!(!driver.channels().valve_open(Channel::Two));
        assert_eq!(log.lines(), vec!["2,-1", "2,-2"]);
    }

    // Prints a reading on every poll, never an empty read
    struct ChattyBoard {
        connected: bool,
        reads: usize,
    }

    impl Communicator for ChattyBoard {
        fn connect(&mut self, _params: &ConnectionParams) -> Result<()> {
            self.connected = true;
            Ok(())
        }

        fn disconnect(&mut self) -> Result<()> {
            self.connected = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn send(&mut self, data: &[u8]) -> Result<usize> {
            Ok(data.len())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn receive(&mut self) -> Result<Vec<u8>> {
            self.reads += 1;
            Ok(format!("P1={} P2=15\n", self.reads).into_bytes())
        }

        fn connection_params(&self) -> Option<&ConnectionParams> {
            None
        }
    }

    #[test]
    fn test_open_returns_while_board_keeps_talking() {
        let config = PneumaticConfig {
            params: ConnectionParams::recording(),
            startup_delay: Duration::ZERO,
            ack: AckPolicy::None,
        };
        let board = ChattyBoard {
            connected: false,
            reads: 0,
        };
        let driver =
            PneumaticDriver::open(&config, Box::new(board), Arc::new(ChannelBank::default()))
                .unwrap();

        let messages = driver.drain_messages().unwrap();
        assert_eq!(messages.len(), MAX_DRAIN_READS);
        assert_eq!(messages[0], format!("P1={} P2=15", MAX_DRAIN_READS + 1));
        driver.open_valve(Channel::One).unwrap();
        assert!(driver.channels().valve_open(Channel::One));
    }

    #[test]
    fn test_drain_messages_splits_lines() {
        let comm = RecordingCommunicator::connected();
        comm.push_reply("Pneumatic ");
        comm.push_reply("ready\nchannels: 2\n");
        let driver = PneumaticDriver::new(Box::new(comm), Arc::new(ChannelBank::default()));
        assert_eq!(
            driver.drain_messages().unwrap(),
            vec!["Pneumatic ready".to_string(), "channels: 2".to_string()]
        );
    }
}
