//! Serpentine raster pattern
//!
//! Each row is `units_per_row` repetitions of travel forward, step, travel
//! back, step. Even rows step in the positive direction, odd rows in the
//! negative direction, so the nozzle zig-zags back over the same band.
//! After every row the lift axis advances by one layer.

use crate::error::PrintError;
use dispensekit_communication::PneumaticDriver;
use dispensekit_core::{Axis, LinearMove, MotionController, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Geometry and speeds of a raster pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterPattern {
    /// Number of rows (layers)
    pub rows: u32,
    /// Travel/step/travel/step units per row
    pub units_per_row: u32,
    /// Axis travelled back and forth
    pub travel_axis: Axis,
    /// Axis stepped between travels
    pub step_axis: Axis,
    /// Axis lifted between rows
    pub lift_axis: Axis,
    /// Travel distance (mm)
    pub travel: f64,
    /// Step distance (mm)
    pub step: f64,
    /// Travel and step speed (mm/s)
    pub speed: f64,
    /// Lift per row (mm)
    pub lift: f64,
    /// Lift speed (mm/s)
    pub lift_speed: f64,
}

impl Default for RasterPattern {
    fn default() -> Self {
        Self {
            rows: 100,
            units_per_row: 5,
            travel_axis: Axis::new("X"),
            step_axis: Axis::new("Y"),
            lift_axis: Axis::new("C"),
            travel: 60.0,
            step: 5.0,
            speed: 50.0,
            lift: 0.4,
            lift_speed: 10.0,
        }
    }
}

/// One move of the pattern
#[derive(Debug, Clone, PartialEq)]
pub enum RasterStep {
    /// Dispensing segment, followed by a pressure refresh
    Segment {
        /// Zero-based row
        row: u32,
        /// The move
        motion: LinearMove,
    },
    /// Lift at the end of a row
    Lift {
        /// Zero-based row just finished
        row: u32,
        /// The move
        motion: LinearMove,
    },
}

impl RasterStep {
    /// The move to execute
    pub fn motion(&self) -> &LinearMove {
        match self {
            RasterStep::Segment { motion, .. } | RasterStep::Lift { motion, .. } => motion,
        }
    }
}

impl RasterPattern {
    /// Set the row count
    pub fn with_rows(mut self, rows: u32) -> Self {
        self.rows = rows;
        self
    }

    /// Dispensing segments in one row
    pub fn segments_per_row(&self) -> u32 {
        self.units_per_row * 4
    }

    /// Moves in the whole pattern, lifts included
    pub fn total_moves(&self) -> u64 {
        u64::from(self.rows) * (u64::from(self.segments_per_row()) + 1)
    }

    /// Signed step distance for a row
    pub fn step_for_row(&self, row: u32) -> f64 {
        if row % 2 == 0 {
            self.step
        } else {
            -self.step
        }
    }

    /// Segments of one row, in execution order
    pub fn row_segments(&self, row: u32) -> Vec<LinearMove> {
        let step = self.step_for_row(row);
        (0..self.units_per_row)
            .flat_map(|_| {
                [
                    LinearMove::new(self.travel_axis.clone(), self.travel, self.speed),
                    LinearMove::new(self.step_axis.clone(), step, self.speed),
                    LinearMove::new(self.travel_axis.clone(), -self.travel, self.speed),
                    LinearMove::new(self.step_axis.clone(), step, self.speed),
                ]
            })
            .collect()
    }

    /// The between-row lift
    pub fn lift_move(&self) -> LinearMove {
        LinearMove::new(self.lift_axis.clone(), self.lift, self.lift_speed)
    }

    /// Every step of the pattern in order
    pub fn steps(&self) -> impl Iterator<Item = RasterStep> + '_ {
        (0..self.rows).flat_map(move |row| {
            self.row_segments(row)
                .into_iter()
                .map(move |motion| RasterStep::Segment { row, motion })
                .chain(std::iter::once(RasterStep::Lift {
                    row,
                    motion: self.lift_move(),
                }))
        })
    }
}

/// What a sequencer run executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SequenceSummary {
    /// Rows finished including their lift
    pub rows_completed: u32,
    /// Dispensing segments executed
    pub segments: u64,
    /// Lifts executed
    pub lifts: u64,
    /// Stopped by the cancel flag
    pub cancelled: bool,
}

/// Drives a [`RasterPattern`] on a controller, refreshing pressure between segments
pub struct MotionSequencer<'a> {
    controller: &'a dyn MotionController,
    driver: &'a PneumaticDriver,
    cancel: Option<&'a AtomicBool>,
    progress: Option<ProgressCallback>,
}

impl<'a> MotionSequencer<'a> {
    /// Create a sequencer
    pub fn new(controller: &'a dyn MotionController, driver: &'a PneumaticDriver) -> Self {
        Self {
            controller,
            driver,
            cancel: None,
            progress: None,
        }
    }

    /// Stop before the next move once `flag` is set
    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Report `(moves done, total moves)` after every move
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Execute the pattern, blocking until every move has finished
    pub fn run(&self, pattern: &RasterPattern) -> Result<SequenceSummary, PrintError> {
        let total = pattern.total_moves();
        let mut summary = SequenceSummary::default();
        let mut done = 0u64;

        for step in pattern.steps() {
            if self.cancelled() {
                tracing::info!(
                    "Raster cancelled after {} rows ({} moves)",
                    summary.rows_completed,
                    done
                );
                summary.cancelled = true;
                return Ok(summary);
            }

            match &step {
                RasterStep::Segment { row, motion } => {
                    self.controller
                        .move_linear(motion)
                        .map_err(|source| PrintError::Motion { row: *row, source })?;
                    self.driver
                        .refresh_pressures()
                        .map_err(PrintError::pneumatic("refreshing pressure"))?;
                    summary.segments += 1;
                }
                RasterStep::Lift { row, motion } => {
                    self.controller
                        .move_linear(motion)
                        .map_err(|source| PrintError::Motion { row: *row, source })?;
                    summary.lifts += 1;
                    summary.rows_completed = row + 1;
                    tracing::debug!("Row {} of {} complete", row + 1, pattern.rows);
                }
            }

            done += 1;
            if let Some(progress) = &self.progress {
                progress(done, total);
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry() {
        let pattern = RasterPattern::default();
        assert_eq!(pattern.rows, 100);
        assert_eq!(pattern.segments_per_row(), 20);
        assert_eq!(pattern.total_moves(), 2100);
        assert_eq!(pattern.lift_move(), LinearMove::new("C", 0.4, 10.0));
    }

    #[test]
    fn test_row_parity_sets_step_sign() {
        let pattern = RasterPattern::default();
        let even = pattern.row_segments(0);
        let odd = pattern.row_segments(1);

        assert_eq!(
            &even[..4],
            &[
                LinearMove::new("X", 60.0, 50.0),
                LinearMove::new("Y", 5.0, 50.0),
                LinearMove::new("X", -60.0, 50.0),
                LinearMove::new("Y", 5.0, 50.0),
            ]
        );
        assert!(odd
            .iter()
            .filter(|m| m.axis.name() == "Y")
            .all(|m| m.distance == -5.0));
    }

    #[test]
    fn test_steps_end_each_row_with_a_lift() {
        let pattern = RasterPattern::default().with_rows(2);
        let steps: Vec<RasterStep> = pattern.steps().collect();
        assert_eq!(steps.len(), 42);
        assert!(matches!(steps[20], RasterStep::Lift { row: 0, .. }));
        assert!(matches!(steps[41], RasterStep::Lift { row: 1, .. }));
        assert!(matches!(steps[21], RasterStep::Segment { row: 1, .. }));
    }
}
