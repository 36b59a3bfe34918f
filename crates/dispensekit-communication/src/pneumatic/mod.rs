//! Pneumatic controller protocol and driver

pub mod driver;
pub mod protocol;

pub use driver::{AckPolicy, PneumaticConfig, PneumaticDriver, SetpointOutcome, MAX_DRAIN_READS};
pub use protocol::{
    DeviceReply, LineBuffer, PneumaticCommand, ACK_REPLY, CLOSE_VALVE_SENTINEL,
    OPEN_VALVE_SENTINEL,
};
