#![warn(missing_docs)]

use std::fmt;

use crate::source::errors::SourceError;

/// All the possible clustering-run errors.
#[derive(Debug)]
pub enum ClusterError {
    /// Sent when the registry is full and the capacity strategy is
    /// `stop`. Assignments up to the failing frame are preserved.
    Capacity {
        /// Frame that could not be admitted.
        frame: u64,
        /// The configured ceiling.
        maxcl: usize,
    },
    /// Sent when the frame source fails mid-run.
    Source(SourceError),
    /// Sent when the scan pre-pass found fewer than two frames.
    EmptyScan,
    /// Sent when the worker pool cannot be created.
    Workers(String),
}

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Capacity { frame, maxcl } => {
                write!(
                    f,
                    "CapacityError: Frame {} needs a new cluster but maxcl {} is reached (strategy stop)",
                    frame, maxcl
                )
            }
            Self::Source(err) => write!(f, "{}", err),
            Self::EmptyScan => {
                write!(f, "EmptyScanError: Fewer than two frames; cannot scan distances")
            }
            Self::Workers(msg) => {
                write!(f, "WorkerError: Failed to start worker pool: {}", msg)
            }
        }
    }
}

impl From<SourceError> for ClusterError {
    fn from(err: SourceError) -> ClusterError {
        ClusterError::Source(err)
    }
}
