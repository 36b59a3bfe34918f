//! # DispenseKit Core
//!
//! Core types, traits, and error taxonomy shared by every DispenseKit crate:
//! pneumatic channels and their validated pressures, the motion controller
//! abstraction, and shared-state aliases.

pub mod channel;
pub mod error;
pub mod motion;
pub mod types;

pub use channel::{Channel, ChannelBank, ChannelState, Psi};

pub use error::{ConnectionError, ControllerError, Error, PneumaticError, Result};

pub use motion::{
    Axis, AxisFault, AxisParameters, AxisStatus, AxisStatusFlags, DriveStatus, LinearMove,
    MotionController, TaskState, TaskStatus,
};

pub use types::{
    thread_safe, thread_safe_rw, thread_safe_vec, ProgressCallback, SharedMotionController,
    ThreadSafe, ThreadSafeRw, ThreadSafeVec,
};
