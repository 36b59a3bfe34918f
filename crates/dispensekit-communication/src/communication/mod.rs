//! Byte-level links to the pneumatic controller
//!
//! A [`Communicator`] is a half-duplex byte pipe with explicit flushing.
//! [`SerialCommunicator`] talks to real hardware; [`RecordingCommunicator`]
//! keeps everything in memory for dry runs and tests.

pub mod recording;
pub mod serial;

use dispensekit_core::{ConnectionError, Result};
use serde::{Deserialize, Serialize};

pub use recording::{RecordingCommunicator, SentLog};
pub use serial::{list_ports, RealSerialPort, SerialPortInfo};

/// Baud rate spoken by the pneumatic controller firmware
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Which kind of link a set of parameters describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionDriver {
    /// Serial/USB connection
    Serial,
    /// In-memory link that records every write
    Recording,
}

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Parameters used to open a link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Link kind
    pub driver: ConnectionDriver,
    /// Port name (e.g. "/dev/ttyACM0", "COM10")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Hardware flow control
    pub flow_control: bool,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
}

impl ConnectionParams {
    /// 8N1 serial parameters at the firmware baud rate
    pub fn serial(port: impl Into<String>) -> Self {
        Self {
            driver: ConnectionDriver::Serial,
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: false,
            timeout_ms: 100,
        }
    }

    /// Parameters for an in-memory recording link
    pub fn recording() -> Self {
        Self {
            driver: ConnectionDriver::Recording,
            port: "recording".to_string(),
            ..Self::serial("recording")
        }
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the read timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Check parameter sanity before opening a port
    pub fn validate(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            return Err(ConnectionError::InvalidParameters {
                reason: "port name is empty".to_string(),
            }
            .into());
        }
        if self.baud_rate == 0 {
            return Err(ConnectionError::InvalidParameters {
                reason: "baud rate must be > 0".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl Default for ConnectionParams {
    fn default() -> Self {
        #[cfg(target_os = "windows")]
        let port = "COM10";
        #[cfg(not(target_os = "windows"))]
        let port = "/dev/ttyACM0";
        Self::serial(port)
    }
}

/// Byte pipe to the pneumatic controller
pub trait Communicator: Send {
    /// Open the link
    fn connect(&mut self, params: &ConnectionParams) -> Result<()>;

    /// Release the link. Further writes fail with `NotConnected`.
    fn disconnect(&mut self) -> Result<()>;

    /// Whether the link is open
    fn is_connected(&self) -> bool;

    /// Write bytes, returning the number written
    fn send(&mut self, data: &[u8]) -> Result<usize>;

    /// Block until buffered output has been handed to the OS/device
    fn flush(&mut self) -> Result<()>;

    /// Read whatever is pending; an empty vector means nothing arrived before the timeout
    fn receive(&mut self) -> Result<Vec<u8>>;

    /// Parameters the link was opened with
    fn connection_params(&self) -> Option<&ConnectionParams>;
}

/// Serial-port-backed communicator
#[derive(Default)]
pub struct SerialCommunicator {
    port: Option<RealSerialPort>,
    params: Option<ConnectionParams>,
}

impl SerialCommunicator {
    /// Create a communicator with no port open
    pub fn new() -> Self {
        Self::default()
    }

    fn port_mut(&mut self) -> Result<&mut RealSerialPort> {
        self.port
            .as_mut()
            .ok_or_else(|| ConnectionError::NotConnected.into())
    }
}

impl Communicator for SerialCommunicator {
    fn connect(&mut self, params: &ConnectionParams) -> Result<()> {
        if self.port.is_some() {
            tracing::debug!("Serial port {} already open", params.port);
            return Ok(());
        }
        params.validate()?;
        let port = RealSerialPort::open(params)?;
        tracing::info!("Opened serial port {} at {} baud", params.port, params.baud_rate);
        self.port = Some(port);
        self.params = Some(params.clone());
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(port) = self.port.take() {
            tracing::info!("Closing serial port {}", port.name());
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn send(&mut self, data: &[u8]) -> Result<usize> {
        let port = self.port_mut()?;
        port.write_all(data)?;
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.port_mut()?.flush()?;
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        let port = self.port_mut()?;
        let mut buf = [0u8; 256];
        match port.read(&mut buf) {
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn connection_params(&self) -> Option<&ConnectionParams> {
        self.params.as_ref()
    }
}

/// Communicator that accepts nothing; every write fails with `NotConnected`
#[derive(Debug, Default)]
pub struct NoOpCommunicator;

impl NoOpCommunicator {
    /// Create a no-op communicator
    pub fn new() -> Self {
        Self
    }
}

impl Communicator for NoOpCommunicator {
    fn connect(&mut self, _params: &ConnectionParams) -> Result<()> {
        Err(ConnectionError::InvalidParameters {
            reason: "no communicator configured".to_string(),
        }
        .into())
    }

    fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn send(&mut self, _data: &[u8]) -> Result<usize> {
        Err(ConnectionError::NotConnected.into())
    }

    fn flush(&mut self) -> Result<()> {
        Err(ConnectionError::NotConnected.into())
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        Err(ConnectionError::NotConnected.into())
    }

    fn connection_params(&self) -> Option<&ConnectionParams> {
        None
    }
}
