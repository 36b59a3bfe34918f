//! Print job orchestration
//!
//! A job walks `Idle -> Pressurizing -> Dispensing -> Closing -> Done`.
//! Cancellation closes the valves and ends in `Cancelled`; any pneumatic or
//! motion failure ends in `Failed` and is returned to the caller. Venting
//! and releasing the serial link is left to the driver's shutdown, which
//! the application always runs on exit.

use crate::error::PrintError;
use crate::raster::{MotionSequencer, RasterPattern, SequenceSummary};
use chrono::{DateTime, Utc};
use dispensekit_communication::PneumaticDriver;
use dispensekit_core::{thread_safe_rw, Channel, SharedMotionController, ThreadSafeRw};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use uuid::Uuid;

const WAIT_SLICE: Duration = Duration::from_millis(20);

/// Lifecycle state of a print job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Created, not started
    Idle,
    /// Setpoints sent, waiting for regulators to settle
    Pressurizing,
    /// Valves open, raster running
    Dispensing,
    /// Closing valves
    Closing,
    /// Finished normally
    Done,
    /// Stopped by request
    Cancelled,
    /// Stopped by an error
    Failed,
}

impl JobState {
    /// Whether the job can no longer change state
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Cancelled | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Idle => "idle",
            JobState::Pressurizing => "pressurizing",
            JobState::Dispensing => "dispensing",
            JobState::Closing => "closing",
            JobState::Done => "done",
            JobState::Cancelled => "cancelled",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Delays around valve actuation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintTiming {
    /// Wait after sending setpoints before opening valves
    pub settle: Duration,
    /// Wait after each valve opens
    pub valve_stagger: Duration,
}

impl Default for PrintTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(5),
            valve_stagger: Duration::from_millis(100),
        }
    }
}

impl PrintTiming {
    /// No delays, for simulation and tests
    pub fn immediate() -> Self {
        Self {
            settle: Duration::ZERO,
            valve_stagger: Duration::ZERO,
        }
    }
}

/// What to print
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrintJob {
    /// Raster geometry
    pub pattern: RasterPattern,
    /// Valve timing
    pub timing: PrintTiming,
}

/// Outcome of a job that ran to a terminal state without error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    /// Job identifier
    pub id: Uuid,
    /// `Done` or `Cancelled`
    pub state: JobState,
    /// Rows finished including their lift
    pub rows_completed: u32,
    /// Dispensing segments executed
    pub segments: u64,
    /// Lifts executed
    pub lifts: u64,
    /// When the job left `Idle`
    pub started_at: DateTime<Utc>,
    /// When the job reached its terminal state
    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    /// Wall-clock duration of the job
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Runs one print job against a controller and a pneumatic driver
pub struct PrintOrchestrator {
    id: Uuid,
    controller: SharedMotionController,
    driver: Arc<PneumaticDriver>,
    job: PrintJob,
    state: ThreadSafeRw<JobState>,
    cancel: Arc<AtomicBool>,
}

impl PrintOrchestrator {
    /// Create an orchestrator in `Idle`
    pub fn new(controller: SharedMotionController, driver: Arc<PneumaticDriver>, job: PrintJob) -> Self {
        Self {
            id: Uuid::new_v4(),
            controller,
            driver,
            job,
            state: thread_safe_rw(JobState::Idle),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Job identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current state
    pub fn state(&self) -> JobState {
        *self.state.read()
    }

    /// Ask the job to stop before its next move or delay slice
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    fn transition(&self, to: JobState) {
        let mut state = self.state.write();
        tracing::info!("Print job {}: {} -> {}", self.id, *state, to);
        *state = to;
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Sleep in slices; returns true if cancelled meanwhile
    fn wait(&self, duration: Duration) -> bool {
        let started = Instant::now();
        while started.elapsed() < duration {
            if self.cancelled() {
                return true;
            }
            thread::sleep(WAIT_SLICE.min(duration - started.elapsed().min(duration)));
        }
        self.cancelled()
    }

    fn close_valves(&self) -> Result<(), PrintError> {
        self.transition(JobState::Closing);
        for channel in Channel::ALL {
            self.driver
                .close_valve(channel)
                .map_err(PrintError::pneumatic("closing valves"))?;
        }
        Ok(())
    }

    fn pressurize(&self) -> Result<(), PrintError> {
        self.transition(JobState::Pressurizing);
        self.driver
            .refresh_pressures()
            .map_err(PrintError::pneumatic("setting pressure"))
    }

    fn open_valves(&self) -> Result<bool, PrintError> {
        for channel in Channel::ALL {
            self.driver
                .open_valve(channel)
                .map_err(PrintError::pneumatic("opening valves"))?;
            if self.wait(self.job.timing.valve_stagger) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn execute(&self) -> Result<(SequenceSummary, JobState), PrintError> {
        self.pressurize()?;
        if self.wait(self.job.timing.settle) {
            self.close_valves()?;
            return Ok((SequenceSummary::default(), JobState::Cancelled));
        }

        self.transition(JobState::Dispensing);
        if self.open_valves()? {
            self.close_valves()?;
            return Ok((SequenceSummary::default(), JobState::Cancelled));
        }

        let summary = MotionSequencer::new(self.controller.as_ref(), &self.driver)
            .with_cancel_flag(&self.cancel)
            .run(&self.job.pattern)?;

        self.close_valves()?;
        let end = if summary.cancelled {
            JobState::Cancelled
        } else {
            JobState::Done
        };
        Ok((summary, end))
    }

    /// Run the job on the calling thread
    pub fn run(&self) -> Result<JobReport, PrintError> {
        let started_at = Utc::now();
        tracing::info!(
            "Starting print job {}: {} rows on {}",
            self.id,
            self.job.pattern.rows,
            self.controller.name()
        );

        match self.execute() {
            Ok((summary, end)) => {
                self.transition(end);
                let report = JobReport {
                    id: self.id,
                    state: end,
                    rows_completed: summary.rows_completed,
                    segments: summary.segments,
                    lifts: summary.lifts,
                    started_at,
                    finished_at: Utc::now(),
                };
                tracing::info!(
                    "Print job {} {} after {} rows",
                    self.id,
                    end,
                    report.rows_completed
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!("Print job {} failed: {}", self.id, e);
                self.transition(JobState::Failed);
                Err(e)
            }
        }
    }

    /// Run the job on a background thread
    pub fn spawn(self) -> Result<PrintHandle, PrintError> {
        let id = self.id;
        let state = self.state.clone();
        let cancel = self.cancel.clone();
        let thread = thread::Builder::new()
            .name(format!("print-{}", id))
            .spawn(move || self.run())?;

        Ok(PrintHandle {
            id,
            remote: JobRemote { state, cancel },
            thread,
        })
    }
}

/// Cloneable view of a running job: read its state, cancel it
#[derive(Clone)]
pub struct JobRemote {
    state: ThreadSafeRw<JobState>,
    cancel: Arc<AtomicBool>,
}

impl JobRemote {
    /// Live job state
    pub fn state(&self) -> JobState {
        *self.state.read()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Poll until the job reaches a terminal state or `timeout` elapses
    pub fn wait_terminal(&self, timeout: Duration) -> JobState {
        let started = Instant::now();
        loop {
            let state = self.state();
            if state.is_terminal() || started.elapsed() >= timeout {
                return state;
            }
            thread::sleep(WAIT_SLICE);
        }
    }

    /// Cancel and wait for the job to stop moving
    pub fn stop(&self, timeout: Duration) -> JobState {
        self.cancel();
        self.wait_terminal(timeout)
    }
}

/// Handle to a job running on its own thread
pub struct PrintHandle {
    id: Uuid,
    remote: JobRemote,
    thread: JoinHandle<Result<JobReport, PrintError>>,
}

impl PrintHandle {
    /// Job identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Live job state
    pub fn state(&self) -> JobState {
        self.remote.state()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.remote.cancel();
    }

    /// A cloneable remote for other threads
    pub fn remote(&self) -> JobRemote {
        self.remote.clone()
    }

    /// Whether the thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the job to end
    pub fn join(self) -> Result<JobReport, PrintError> {
        self.thread.join().map_err(|_| PrintError::Panicked)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Done.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Dispensing.is_terminal());
    }

    #[test]
    fn test_default_timing() {
        let timing = PrintTiming::default();
        assert_eq!(timing.settle, Duration::from_secs(5));
        assert_eq!(timing.valve_stagger, Duration::from_millis(100));
    }
}
