//! Serial port access for the pneumatic controller
//!
//! Wraps the `serialport` crate: port enumeration filtered to USB
//! microcontroller boards, and a blocking port handle opened from
//! [`ConnectionParams`].

use super::{ConnectionDriver, ConnectionParams, SerialParity};
use dispensekit_core::{ConnectionError, Error, Result};
use std::io::{self, Read, Write};
use std::time::Duration;

/// A port a pneumatic controller board may be attached to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Name to pass as `connection.port`
    pub port_name: String,
    /// Human-readable description
    pub description: String,
    /// USB vendor/product ids when the port is a USB device
    pub usb_ids: Option<(u16, u16)>,
    /// Board serial number, when reported
    pub serial_number: Option<String>,
}

impl From<&serialport::SerialPortInfo> for SerialPortInfo {
    fn from(port: &serialport::SerialPortInfo) -> Self {
        let (usb_ids, serial_number) = match &port.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                (Some((usb.vid, usb.pid)), usb.serial_number.clone())
            }
            _ => (None, None),
        };
        Self {
            port_name: port.port_name.clone(),
            description: port_description(port),
            usb_ids,
            serial_number,
        }
    }
}

impl std::fmt::Display for SerialPortInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\t{}", self.port_name, self.description)?;
        if let Some((vid, pid)) = self.usb_ids {
            write!(f, " [{:04x}:{:04x}]", vid, pid)?;
        }
        Ok(())
    }
}

/// Ports that look like USB microcontroller links:
/// COM* on Windows, /dev/ttyUSB* and /dev/ttyACM* on Linux,
/// /dev/cu.usbserial-* and /dev/cu.usbmodem* on macOS
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        Error::from(ConnectionError::SerialError {
            reason: format!("failed to enumerate ports: {}", e),
        })
    })?;

    let found: Vec<SerialPortInfo> = ports
        .iter()
        .filter(|port| is_controller_port(&port.port_name))
        .map(SerialPortInfo::from)
        .collect();
    tracing::debug!("{} of {} ports look like controller boards", found.len(), ports.len());
    Ok(found)
}

fn is_controller_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

fn port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb) => format!(
            "USB {} {}",
            usb.manufacturer.as_deref().unwrap_or("Device"),
            usb.product.as_deref().unwrap_or("Serial Port")
        ),
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

/// Open serial port handle
pub struct RealSerialPort {
    name: String,
    port: Box<dyn serialport::SerialPort>,
}

impl RealSerialPort {
    /// Open a serial port with the given parameters
    pub fn open(params: &ConnectionParams) -> Result<Self> {
        if params.driver != ConnectionDriver::Serial {
            return Err(ConnectionError::InvalidParameters {
                reason: "RealSerialPort requires the serial driver".to_string(),
            }
            .into());
        }

        let data_bits = match params.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => {
                return Err(ConnectionError::InvalidParameters {
                    reason: format!("invalid data bits: {}", other),
                }
                .into())
            }
        };
        let stop_bits = match params.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => {
                return Err(ConnectionError::InvalidParameters {
                    reason: format!("invalid stop bits: {}", other),
                }
                .into())
            }
        };

        let port = serialport::new(&params.port, params.baud_rate)
            .timeout(Duration::from_millis(params.timeout_ms))
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(to_serialport_parity(params.parity))
            .flow_control(if params.flow_control {
                serialport::FlowControl::Hardware
            } else {
                serialport::FlowControl::None
            })
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", params.port, e);
                match e.kind() {
                    serialport::ErrorKind::NoDevice => ConnectionError::PortNotFound {
                        port: params.port.clone(),
                    },
                    _ => ConnectionError::FailedToOpen {
                        port: params.port.clone(),
                        reason: e.to_string(),
                    },
                }
            })?;

        Ok(Self {
            name: params.port.clone(),
            port,
        })
    }

    /// Port name the handle was opened on
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write every byte of `data`
    pub fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)
    }

    /// Flush pending output
    pub fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }

    /// Read available bytes, honouring the port timeout
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_port_filter() {
        assert!(is_controller_port("COM10"));
        assert!(is_controller_port("/dev/ttyACM0"));
        assert!(is_controller_port("/dev/ttyUSB1"));
        assert!(is_controller_port("/dev/cu.usbmodem14101"));
        assert!(!is_controller_port("COM"));
        assert!(!is_controller_port("COMX"));
        assert!(!is_controller_port("/dev/ttyS0"));
        assert!(!is_controller_port("/dev/tty.Bluetooth-Incoming-Port"));
    }

    #[test]
    fn test_port_info_display() {
        let info = SerialPortInfo {
            port_name: "/dev/ttyACM0".to_string(),
            description: "USB Arduino Uno".to_string(),
            usb_ids: Some((0x2341, 0x0043)),
            serial_number: None,
        };
        assert_eq!(info.to_string(), "/dev/ttyACM0\tUSB Arduino Uno [2341:0043]");
    }

    #[test]
    fn test_open_rejects_recording_driver() {
        let err = RealSerialPort::open(&ConnectionParams::recording()).err();
        assert!(matches!(
            err,
            Some(Error::Connection(ConnectionError::InvalidParameters { .. }))
        ));
    }

    #[test]
    fn test_open_rejects_bad_framing() {
        let mut params = ConnectionParams::serial("/dev/ttyACM99");
        params.data_bits = 9;
        assert!(RealSerialPort::open(&params).is_err());
    }
}
