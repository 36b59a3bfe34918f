//! Pneumatic wire protocol
//!
//! Every command is one ASCII line `"<channel>,<value>\n"`. A value in
//! `0..=100` is a pressure setpoint in PSI; `-1` opens the channel's valve
//! and `-2` closes it. There is no checksum and no framing beyond the
//! newline.

use dispensekit_core::{Channel, PneumaticError, Psi};
use std::fmt;

/// Wire value that opens a valve
pub const OPEN_VALVE_SENTINEL: i64 = -1;
/// Wire value that closes a valve
pub const CLOSE_VALVE_SENTINEL: i64 = -2;
/// Reply line sent by firmware that acknowledges commands
pub const ACK_REPLY: &str = "ACK";

/// One pneumatic command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PneumaticCommand {
    /// Set a channel's pressure regulator
    SetPressure {
        /// Target channel
        channel: Channel,
        /// Setpoint
        psi: Psi,
    },
    /// Open a channel's valve
    OpenValve(Channel),
    /// Close a channel's valve
    CloseValve(Channel),
}

impl PneumaticCommand {
    /// Channel the command addresses
    pub fn channel(&self) -> Channel {
        match *self {
            PneumaticCommand::SetPressure { channel, .. } => channel,
            PneumaticCommand::OpenValve(channel) | PneumaticCommand::CloseValve(channel) => {
                channel
            }
        }
    }

    /// Value field as written on the wire
    pub fn wire_value(&self) -> i64 {
        match self {
            PneumaticCommand::SetPressure { psi, .. } => i64::from(*psi),
            PneumaticCommand::OpenValve(_) => OPEN_VALVE_SENTINEL,
            PneumaticCommand::CloseValve(_) => CLOSE_VALVE_SENTINEL,
        }
    }

    /// Newline-terminated wire form
    pub fn encode(&self) -> String {
        format!("{}\n", self)
    }

    /// Decode a single line, with or without its terminator
    pub fn parse(line: &str) -> Result<Self, PneumaticError> {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        let malformed = |reason: &str| PneumaticError::MalformedCommand {
            line: trimmed.to_string(),
            reason: reason.to_string(),
        };

        let (channel, value) = trimmed
            .split_once(',')
            .ok_or_else(|| malformed("missing ',' separator"))?;
        let channel: i64 = channel
            .trim()
            .parse()
            .map_err(|_| malformed("channel is not an integer"))?;
        let value: i64 = value
            .trim()
            .parse()
            .map_err(|_| malformed("value is not an integer"))?;

        let channel = Channel::from_number(channel)?;
        match value {
            OPEN_VALVE_SENTINEL => Ok(PneumaticCommand::OpenValve(channel)),
            CLOSE_VALVE_SENTINEL => Ok(PneumaticCommand::CloseValve(channel)),
            v if v < 0 => Err(malformed("unknown valve sentinel")),
            v => Ok(PneumaticCommand::SetPressure {
                channel,
                psi: Psi::new(v)?,
            }),
        }
    }
}

impl fmt::Display for PneumaticCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.channel(), self.wire_value())
    }
}

/// A line received from the pneumatic controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceReply {
    /// Command acknowledgment
    Ack,
    /// Anything else (boot banners, debug prints)
    Message(String),
}

impl DeviceReply {
    /// Classify a received line
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line == ACK_REPLY {
            DeviceReply::Ack
        } else {
            DeviceReply::Message(line.to_string())
        }
    }
}

/// Reassembles lines from arbitrarily chunked serial reads
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes and return every line they complete
    ///
    /// Lines are decoded once complete, so a character split across reads
    /// survives. Empty lines are dropped. Invalid UTF-8 is replaced.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Bytes received after the last newline
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uses_sentinels() {
        assert_eq!(PneumaticCommand::OpenValve(Channel::One).encode(), "1,-1\n");
        assert_eq!(PneumaticCommand::CloseValve(Channel::Two).encode(), "2,-2\n");
        let set = PneumaticCommand::SetPressure {
            channel: Channel::Two,
            psi: Psi::new(37).unwrap(),
        };
        assert_eq!(set.encode(), "2,37\n");
    }

    #[test]
    fn test_parse_accepts_wire_lines() {
        assert_eq!(
            PneumaticCommand::parse("1,-1\n").unwrap(),
            PneumaticCommand::OpenValve(Channel::One)
        );
        assert_eq!(
            PneumaticCommand::parse("2,0\r\n").unwrap(),
            PneumaticCommand::SetPressure {
                channel: Channel::Two,
                psi: Psi::ZERO
            }
        );
    }

    #[test]
    fn test_parse_rejects_invalid_lines() {
        assert!(matches!(
            PneumaticCommand::parse("3,10"),
            Err(PneumaticError::UnknownChannel { channel: 3 })
        ));
        assert!(matches!(
            PneumaticCommand::parse("1,101"),
            Err(PneumaticError::PressureOutOfRange { psi: 101 })
        ));
        assert!(matches!(
            PneumaticCommand::parse("1,-3"),
            Err(PneumaticError::MalformedCommand { .. })
        ));
        assert!(PneumaticCommand::parse("1;10").is_err());
        assert!(PneumaticCommand::parse("one,10").is_err());
        assert!(PneumaticCommand::parse("").is_err());
    }

    #[test]
    fn test_device_reply() {
        assert_eq!(DeviceReply::parse("ACK\r"), DeviceReply::Ack);
        assert_eq!(
            DeviceReply::parse("ack"),
            DeviceReply::Message("ack".to_string())
        );
        assert_eq!(
            DeviceReply::parse("Ack\n"),
            DeviceReply::Message("Ack".to_string())
        );
        assert_eq!(
            DeviceReply::parse("Pressure 1 set\n"),
            DeviceReply::Message("Pressure 1 set".to_string())
        );
    }

    #[test]
    fn test_line_buffer_reassembles_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"AC").is_empty());
        assert_eq!(buf.pending(), b"AC");
        assert_eq!(buf.push(b"K\r\n\nboot"), vec!["ACK".to_string()]);
        assert_eq!(buf.push(b"ed\n"), vec!["booted".to_string()]);
        assert!(buf.pending().is_empty());
    }

    #[test]
    fn test_line_buffer_keeps_split_characters() {
        let reading = "P1 = 15 \u{b1} 0.2 psi\n".as_bytes();
        let split = reading.iter().position(|&b| b == 0xC2).unwrap() + 1;

        let mut buf = LineBuffer::new();
        assert!(buf.push(&reading[..split]).is_empty());
        assert_eq!(
            buf.push(&reading[split..]),
            vec!["P1 = 15 \u{b1} 0.2 psi".to_string()]
        );
    }
}
