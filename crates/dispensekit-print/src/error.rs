//! Print job errors

use dispensekit_core::Error;
use thiserror::Error;

/// Why a print job stopped early
#[derive(Error, Debug)]
pub enum PrintError {
    /// Controller rejected or faulted during a move
    #[error("Motion failed on row {row}: {source}")]
    Motion {
        /// Zero-based row being printed
        row: u32,
        /// Underlying controller error
        #[source]
        source: Error,
    },

    /// Pneumatic command could not be written
    #[error("Pneumatic command failed while {stage}: {source}")]
    Pneumatic {
        /// What the job was doing
        stage: &'static str,
        /// Underlying link error
        #[source]
        source: Error,
    },

    /// Job thread could not be started
    #[error("Failed to start print thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// Job thread panicked
    #[error("Print thread panicked")]
    Panicked,
}

impl PrintError {
    pub(crate) fn pneumatic(stage: &'static str) -> impl FnOnce(Error) -> PrintError {
        move |source| PrintError::Pneumatic { stage, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispensekit_core::ControllerError;

    #[test]
    fn test_motion_error_display() {
        let err = PrintError::Motion {
            row: 3,
            source: ControllerError::MotionAborted { axis: "X".into() }.into(),
        };
        assert_eq!(err.to_string(), "Motion failed on row 3: Motion aborted on axis X");
        assert!(std::error::Error::source(&err).is_some());
    }
}
