//! # DispenseKit UI
//!
//! The pressure control surface: a front-end independent model, a
//! terminal front-end, and a GTK4 window behind the `gtk` feature.

pub mod surface;
pub mod terminal;

#[cfg(feature = "gtk")]
pub mod gtk_app;

pub use surface::{valve_label, CloseHook, ControlSurface, SurfaceError, ValveToggle};
pub use terminal::TerminalSurface;
