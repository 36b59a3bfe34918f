//! # DispenseKit Communication
//!
//! Serial links and the pneumatic controller protocol for DispenseKit.
//! Supports real serial/USB ports and an in-memory recording link used
//! for simulation and tests.

pub mod communication;
pub mod pneumatic;

pub use communication::{
    list_ports, Communicator, ConnectionDriver, ConnectionParams, NoOpCommunicator,
    RecordingCommunicator, SentLog, SerialCommunicator, SerialParity, SerialPortInfo,
    DEFAULT_BAUD_RATE,
};

pub use pneumatic::{
    AckPolicy, DeviceReply, LineBuffer, PneumaticCommand, PneumaticConfig, PneumaticDriver,
    SetpointOutcome, MAX_DRAIN_READS,
};
