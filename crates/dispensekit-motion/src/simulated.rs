//! In-process motion controller
//!
//! Behaves like a controller session closely enough to drive the console
//! and the raster sequencer without hardware: axes must be enabled before
//! they move, runtime calls need a started controller, moves block for
//! `|distance| / speed` seconds scaled by `time_scale`, and faults can be
//! injected per axis.

use dispensekit_core::{
    Axis, AxisFault, AxisParameters, AxisStatus, AxisStatusFlags, ControllerError, DriveStatus,
    LinearMove, MotionController, Result, TaskState, TaskStatus,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

/// Number of `$iglobal` integers
pub const GLOBAL_INTEGER_COUNT: usize = 256;

/// Highest task index that can host a program (tasks are 1-based)
pub const TASK_COUNT: u32 = 3;

const MOVE_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
struct AxisState {
    position: f64,
    enabled: bool,
    homed: bool,
    moving: bool,
    abort_requested: bool,
    pending_fault: Option<(AxisFault, String)>,
    parameters: AxisParameters,
}

impl Default for AxisState {
    fn default() -> Self {
        Self {
            position: 0.0,
            enabled: false,
            homed: false,
            moving: false,
            abort_requested: false,
            pending_fault: None,
            parameters: AxisParameters::default(),
        }
    }
}

#[derive(Debug)]
struct SimState {
    connected: bool,
    running: bool,
    axes: BTreeMap<Axis, AxisState>,
    globals: Vec<i64>,
    tasks: BTreeMap<u32, TaskStatus>,
    moves: Vec<LinearMove>,
}

impl SimState {
    fn runtime(&mut self) -> Result<&mut Self> {
        if !self.connected {
            return Err(ControllerError::NotConnected.into());
        }
        if !self.running {
            return Err(ControllerError::NotStarted.into());
        }
        Ok(self)
    }

    fn axis_mut(&mut self, axis: &Axis) -> Result<&mut AxisState> {
        self.axes.get_mut(axis).ok_or_else(|| {
            ControllerError::UnknownAxis {
                axis: axis.to_string(),
            }
            .into()
        })
    }

    fn task_mut(&mut self, task: u32) -> Result<&mut TaskStatus> {
        self.tasks
            .get_mut(&task)
            .ok_or_else(|| ControllerError::UnknownTask { task }.into())
    }

    fn global_index(index: usize) -> Result<usize> {
        if index < GLOBAL_INTEGER_COUNT {
            Ok(index)
        } else {
            Err(ControllerError::GlobalIndexOutOfRange {
                index,
                count: GLOBAL_INTEGER_COUNT,
            }
            .into())
        }
    }
}

/// Simulated motion controller
#[derive(Debug)]
pub struct SimulatedController {
    name: String,
    time_scale: f64,
    state: Mutex<SimState>,
}

impl SimulatedController {
    /// Create a controller with the given axes, disconnected and stopped
    pub fn new<I, A>(axes: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Axis>,
    {
        let axes = axes
            .into_iter()
            .map(|a| (a.into(), AxisState::default()))
            .collect();
        let tasks = (1..=TASK_COUNT)
            .map(|t| (t, TaskStatus::new(TaskState::Idle)))
            .collect();

        Self {
            name: "Simulated controller".to_string(),
            time_scale: 1.0,
            state: Mutex::new(SimState {
                connected: false,
                running: false,
                axes,
                globals: vec![0; GLOBAL_INTEGER_COUNT],
                tasks,
                moves: Vec::new(),
            }),
        }
    }

    /// Scale physical move durations; `0.0` makes every move instantaneous
    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale.max(0.0);
        self
    }

    /// Connect, start and enable every axis
    pub fn ready(self) -> Result<Self> {
        self.connect()?;
        self.start()?;
        let axes = self.axes();
        self.enable(&axes)?;
        Ok(self)
    }

    /// Configured axes
    pub fn axes(&self) -> Vec<Axis> {
        self.state.lock().axes.keys().cloned().collect()
    }

    /// Every move that completed, in order
    pub fn moves(&self) -> Vec<LinearMove> {
        self.state.lock().moves.clone()
    }

    /// Current program position of an axis
    pub fn position(&self, axis: &Axis) -> Option<f64> {
        self.state.lock().axes.get(axis).map(|a| a.position)
    }

    /// Make the next move on `axis` fail with `fault`; the drive is disabled when it trips
    pub fn inject_fault(&self, axis: &Axis, fault: AxisFault, reason: impl Into<String>) -> Result<()> {
        let mut state = self.state.lock();
        state.axis_mut(axis)?.pending_fault = Some((fault, reason.into()));
        Ok(())
    }

    /// Put a task into the error state with a message
    pub fn inject_task_error(&self, task: u32, message: impl Into<String>) -> Result<()> {
        let mut state = self.state.lock();
        *state.task_mut(task)? = TaskStatus {
            state: TaskState::Error,
            error_message: Some(message.into()),
        };
        Ok(())
    }

    fn move_duration(&self, axis: &Axis, distance: f64, speed: f64) -> Result<Duration> {
        let seconds = (distance.abs() / speed) * self.time_scale;
        Duration::try_from_secs_f64(seconds).map_err(|_| {
            ControllerError::InvalidMove {
                axis: axis.to_string(),
                reason: format!("distance {} at speed {} cannot be timed", distance, speed),
            }
            .into()
        })
    }

    /// Sleep through a move in slices so an abort can interrupt it
    fn wait_for_move(&self, axis: &Axis, duration: Duration) -> Result<()> {
        let started = Instant::now();
        while started.elapsed() < duration {
            thread::sleep(MOVE_SLICE.min(duration - started.elapsed().min(duration)));
            let mut state = self.state.lock();
            let axis_state = state.axis_mut(axis)?;
            if axis_state.abort_requested {
                axis_state.abort_requested = false;
                axis_state.moving = false;
                return Err(ControllerError::MotionAborted {
                    axis: axis.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

impl Default for SimulatedController {
    /// Axes X, Y and C at real time
    fn default() -> Self {
        Self::new(["X", "Y", "C"])
    }
}

impl MotionController for SimulatedController {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self) -> Result<()> {
        self.state.lock().connected = true;
        tracing::debug!("{} connected", self.name);
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.state.lock().connected = false;
        tracing::debug!("{} disconnected", self.name);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(ControllerError::NotConnected.into());
        }
        state.running = true;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(ControllerError::NotConnected.into());
        }
        state.running = false;
        for axis in state.axes.values_mut() {
            axis.enabled = false;
        }
        for task in state.tasks.values_mut() {
            *task = TaskStatus::new(TaskState::Idle);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state.lock().running
    }

    fn enable(&self, axes: &[Axis]) -> Result<()> {
        let mut guard = self.state.lock();
        let state = guard.runtime()?;
        for axis in axes {
            state.axis_mut(axis)?.enabled = true;
        }
        Ok(())
    }

    fn disable(&self, axes: &[Axis]) -> Result<()> {
        let mut guard = self.state.lock();
        let state = guard.runtime()?;
        for axis in axes {
            state.axis_mut(axis)?.enabled = false;
        }
        Ok(())
    }

    fn home(&self, axes: &[Axis]) -> Result<()> {
        let mut longest = Duration::ZERO;
        {
            let mut guard = self.state.lock();
            let state = guard.runtime()?;
            for axis in axes {
                let axis_state = state.axis_mut(axis)?;
                if !axis_state.enabled {
                    return Err(ControllerError::AxisNotEnabled {
                        axis: axis.to_string(),
                    }
                    .into());
                }
            }
            for axis in axes {
                let axis_state = state.axis_mut(axis)?;
                let duration = self.move_duration(
                    axis,
                    axis_state.position,
                    axis_state.parameters.default_axis_speed,
                )?;
                longest = longest.max(duration);
            }
            for axis in axes {
                let axis_state = state.axis_mut(axis)?;
                axis_state.position = 0.0;
                axis_state.homed = true;
            }
        }
        thread::sleep(longest);
        Ok(())
    }

    fn abort(&self, axis: &Axis) -> Result<()> {
        let mut guard = self.state.lock();
        let state = guard.runtime()?;
        let axis_state = state.axis_mut(axis)?;
        if axis_state.moving {
            axis_state.abort_requested = true;
        }
        Ok(())
    }

    fn move_linear(&self, motion: &LinearMove) -> Result<()> {
        let axis = &motion.axis;
        if !motion.distance.is_finite() || !motion.speed.is_finite() || motion.speed <= 0.0 {
            return Err(ControllerError::InvalidMove {
                axis: axis.to_string(),
                reason: format!(
                    "distance {} / speed {} not allowed",
                    motion.distance, motion.speed
                ),
            }
            .into());
        }

        {
            let mut guard = self.state.lock();
            let state = guard.runtime()?;
            let axis_state = state.axis_mut(axis)?;
            if !axis_state.enabled {
                return Err(ControllerError::AxisNotEnabled {
                    axis: axis.to_string(),
                }
                .into());
            }
            if let Some((fault, reason)) = axis_state.pending_fault.take() {
                axis_state.enabled = false;
                tracing::warn!("Axis {} faulted ({:?}): {}", axis, fault, reason);
                return Err(ControllerError::AxisFault {
                    axis: axis.to_string(),
                    reason,
                }
                .into());
            }
            axis_state.moving = true;
        }

        tracing::trace!("move {}", motion);
        let waited = self
            .move_duration(axis, motion.distance, motion.speed)
            .and_then(|duration| self.wait_for_move(axis, duration));

        let mut state = self.state.lock();
        let axis_state = state.axis_mut(axis)?;
        axis_state.moving = false;
        if waited.is_ok() {
            axis_state.position += motion.distance;
            state.moves.push(motion.clone());
        }
        waited
    }

    fn axis_status(&self, axis: &Axis) -> Result<AxisStatus> {
        let mut guard = self.state.lock();
        let state = guard.runtime()?;
        let axis_state = state.axis_mut(axis)?;

        let mut drive_status = DriveStatus::empty();
        drive_status.set(DriveStatus::ENABLED, axis_state.enabled);
        let mut axis_status = AxisStatusFlags::empty();
        axis_status.set(AxisStatusFlags::HOMED, axis_state.homed);
        axis_status.set(AxisStatusFlags::PROFILING, axis_state.moving);
        axis_status.set(AxisStatusFlags::MOTION_DONE, !axis_state.moving);

        Ok(AxisStatus {
            axis: axis.clone(),
            program_position: axis_state.position,
            drive_status,
            axis_status,
        })
    }

    fn axis_parameters(&self, axis: &Axis) -> Result<AxisParameters> {
        let mut guard = self.state.lock();
        let state = guard.runtime()?;
        Ok(state.axis_mut(axis)?.parameters.clone())
    }

    fn global_integer(&self, index: usize) -> Result<i64> {
        let mut guard = self.state.lock();
        let state = guard.runtime()?;
        Ok(state.globals[SimState::global_index(index)?])
    }

    fn set_global_integer(&self, index: usize, value: i64) -> Result<()> {
        let mut guard = self.state.lock();
        let state = guard.runtime()?;
        state.globals[SimState::global_index(index)?] = value;
        Ok(())
    }

    fn run_program(&self, task: u32, path: &Path) -> Result<()> {
        let source = std::fs::read_to_string(path).map_err(|e| ControllerError::ProgramCompile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        if source.trim().is_empty() {
            return Err(ControllerError::ProgramCompile {
                path: path.display().to_string(),
                reason: "program is empty".to_string(),
            }
            .into());
        }

        let mut guard = self.state.lock();
        let state = guard.runtime()?;
        *state.task_mut(task)? = TaskStatus::new(TaskState::ProgramRunning);
        tracing::info!("Task {} running {}", task, path.display());
        Ok(())
    }

    fn stop_program(&self, task: u32) -> Result<()> {
        let mut guard = self.state.lock();
        let state = guard.runtime()?;
        *state.task_mut(task)? = TaskStatus::new(TaskState::Idle);
        Ok(())
    }

    fn task_status(&self, task: u32) -> Result<TaskStatus> {
        let mut guard = self.state.lock();
        let state = guard.runtime()?;
        Ok(state.task_mut(task)?.clone())
    }
}
