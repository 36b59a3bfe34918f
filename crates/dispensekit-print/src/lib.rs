//! # DispenseKit Print
//!
//! The serpentine raster pattern, the sequencer that drives it with
//! pressure refreshes between segments, and the orchestrator that wraps
//! it in a pressurize / dispense / close job.

pub mod error;
pub mod orchestrator;
pub mod raster;

pub use error::PrintError;
pub use orchestrator::{
    JobRemote, JobReport, JobState, PrintHandle, PrintJob, PrintOrchestrator, PrintTiming,
};
pub use raster::{MotionSequencer, RasterPattern, RasterStep, SequenceSummary};
