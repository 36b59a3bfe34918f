//! Pneumatic channel model
//!
//! A rig carries two pressure-control loops, addressed as channel 1 and
//! channel 2. Each channel has a desired pressure and a commanded valve
//! state. Both live in a [`ChannelBank`] so that every reader and writer
//! (UI thread, print thread) goes through the same lock.

use crate::error::PneumaticError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A pneumatic channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Channel {
    /// Channel 1
    One,
    /// Channel 2
    Two,
}

impl Channel {
    /// Every channel, in wire order
    pub const ALL: [Channel; 2] = [Channel::One, Channel::Two];

    /// Wire number of the channel (1 or 2)
    pub fn number(self) -> u8 {
        match self {
            Channel::One => 1,
            Channel::Two => 2,
        }
    }

    /// Resolve a wire number to a channel
    pub fn from_number(number: i64) -> Result<Self, PneumaticError> {
        match number {
            1 => Ok(Channel::One),
            2 => Ok(Channel::Two),
            other => Err(PneumaticError::UnknownChannel { channel: other }),
        }
    }

    fn index(self) -> usize {
        match self {
            Channel::One => 0,
            Channel::Two => 1,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl FromStr for Channel {
    type Err = PneumaticError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let number: i64 = s
            .trim()
            .parse()
            .map_err(|_| PneumaticError::MalformedCommand {
                line: s.to_string(),
                reason: "channel is not an integer".to_string(),
            })?;
        Channel::from_number(number)
    }
}

impl TryFrom<i64> for Channel {
    type Error = PneumaticError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Channel::from_number(value)
    }
}

impl From<Channel> for i64 {
    fn from(channel: Channel) -> Self {
        i64::from(channel.number())
    }
}

/// A validated pressure setpoint in PSI, always within `[0, 100]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Psi(u8);

impl Psi {
    /// Lowest accepted pressure
    pub const MIN: i64 = 0;
    /// Highest accepted pressure
    pub const MAX: i64 = 100;
    /// Zero pressure, used when venting at shutdown
    pub const ZERO: Psi = Psi(0);

    /// Validate a raw pressure request
    pub fn new(psi: i64) -> Result<Self, PneumaticError> {
        if (Self::MIN..=Self::MAX).contains(&psi) {
            Ok(Psi(psi as u8))
        } else {
            Err(PneumaticError::PressureOutOfRange { psi })
        }
    }

    /// Pressure in PSI
    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Psi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Psi {
    type Error = PneumaticError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Psi::new(value)
    }
}

impl From<Psi> for i64 {
    fn from(psi: Psi) -> Self {
        i64::from(psi.0)
    }
}

/// Desired pressure and commanded valve state of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelState {
    /// Setpoint re-sent on every pressure refresh
    pub desired: Psi,
    /// Last valve command sent (true = opened). Not read back from the device.
    pub valve_open: bool,
}

/// Thread-safe owner of both channels' state
#[derive(Debug)]
pub struct ChannelBank {
    channels: Mutex<[ChannelState; 2]>,
}

impl ChannelBank {
    /// Create a bank with per-channel initial setpoints and closed valves
    pub fn new(channel_1: Psi, channel_2: Psi) -> Self {
        Self {
            channels: Mutex::new([
                ChannelState {
                    desired: channel_1,
                    valve_open: false,
                },
                ChannelState {
                    desired: channel_2,
                    valve_open: false,
                },
            ]),
        }
    }

    /// Desired pressure of a channel
    pub fn desired(&self, channel: Channel) -> Psi {
        self.channels.lock()[channel.index()].desired
    }

    /// Replace the desired pressure of a channel
    pub fn set_desired(&self, channel: Channel, psi: Psi) {
        self.channels.lock()[channel.index()].desired = psi;
    }

    /// Both desired pressures read under one lock
    pub fn desired_pair(&self) -> (Psi, Psi) {
        let guard = self.channels.lock();
        (guard[0].desired, guard[1].desired)
    }

    /// Commanded valve state of a channel
    pub fn valve_open(&self, channel: Channel) -> bool {
        self.channels.lock()[channel.index()].valve_open
    }

    /// Record a valve command
    pub fn set_valve_open(&self, channel: Channel, open: bool) {
        self.channels.lock()[channel.index()].valve_open = open;
    }

    /// Consistent copy of one channel
    pub fn state(&self, channel: Channel) -> ChannelState {
        self.channels.lock()[channel.index()]
    }
}

impl Default for ChannelBank {
    /// Both channels at 15 PSI with closed valves
    fn default() -> Self {
        Self::new(Psi(15), Psi(15))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_channel_numbers() {
        assert_eq!(Channel::One.number(), 1);
        assert_eq!(Channel::Two.number(), 2);
        assert_eq!(Channel::from_number(2).unwrap(), Channel::Two);
        assert_eq!(
            Channel::from_number(3),
            Err(PneumaticError::UnknownChannel { channel: 3 })
        );
        assert!("0".parse::<Channel>().is_err());
        assert_eq!(" 1 ".parse::<Channel>().unwrap(), Channel::One);
    }

    #[test]
    fn test_psi_bounds() {
        assert_eq!(Psi::new(0).unwrap(), Psi::ZERO);
        assert_eq!(Psi::new(100).unwrap().value(), 100);
        assert!(Psi::new(-1).is_err());
        assert!(Psi::new(101).is_err());
    }

    #[test]
    fn test_bank_tracks_each_channel_independently() {
        let bank = ChannelBank::default();
        bank.set_desired(Channel::Two, Psi::new(42).unwrap());
        bank.set_valve_open(Channel::One, true);

        assert_eq!(bank.desired(Channel::One).value(), 15);
        assert_eq!(bank.desired(Channel::Two).value(), 42);
        assert!(bank.valve_open(Channel::One));
        assert!(!bank.valve_open(Channel::Two));
        assert_eq!(bank.desired_pair(), (Psi::new(15).unwrap(), Psi::new(42).unwrap()));
    }

    proptest! {
        #[test]
        fn psi_accepts_exactly_the_inclusive_window(raw in -1000i64..1000) {
            let accepted = Psi::new(raw).is_ok();
            prop_assert_eq!(accepted, (0..=100).contains(&raw));
        }
    }
}
