//! Error types for the engine.

use crate::frame::FrameId;
use thiserror::Error;

/// Engine error type
///
/// Logical failures of an operation are not errors; they travel through the
/// chain as [`Step::FAILURE`](crate::Step::FAILURE). These variants cover
/// misuse of the engine and resource exhaustion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Slot access, suspend or end before any `begin`
    #[error("no active frame: call begin() first")]
    NoActiveFrame,

    /// A frame index no longer refers to a live frame
    #[error("frame {0} no longer exists")]
    StaleFrame(FrameId),

    /// Frame arena is full
    #[error("frame limit of {limit} reached")]
    FrameLimit {
        /// Configured maximum number of live frames
        limit: usize,
    },

    /// A different child was requested while the current one is unfinished
    #[error("child '{current}' is still running, refusing to start '{requested}'")]
    ChildBusy {
        /// Name of the unfinished child
        current: String,
        /// Name that was requested in its place
        requested: String,
    },

    /// A child was requested under a frame that already succeeded or failed
    #[error("'{parent}' has already finished, refusing to start '{requested}'")]
    ParentFinished {
        /// Name of the finished frame
        parent: String,
        /// Name of the requested child
        requested: String,
    },
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
