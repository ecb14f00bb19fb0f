//! Frame loop error types.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::backend::BackendError;
use crate::slot::SlotPhase;

/// Frame loop stage an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Initialize,
    Wait,
    Acquire,
    Record,
    Submit,
    Present,
    Reconstruct,
    Drain,
    Destroy,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Initialize => "initialize",
            Stage::Wait => "wait",
            Stage::Acquire => "acquire",
            Stage::Record => "record",
            Stage::Submit => "submit",
            Stage::Present => "present",
            Stage::Reconstruct => "reconstruct",
            Stage::Drain => "drain",
            Stage::Destroy => "destroy",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the frame loop should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Reconstruct the surface and keep going.
    Recoverable,
    /// A bounded wait expired. Fatal unless the caller retries.
    Timeout,
    /// Stop the frame loop.
    Fatal,
    /// Initialization could not allocate its resources.
    ResourceExhaustion,
}

/// Errors raised by the frame scheduler.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("{stage}: surface out of date")]
    OutOfDate { stage: Stage },

    #[error("{stage}: timed out after {timeout:?}")]
    Timeout { stage: Stage, timeout: Duration },

    #[error("{stage} failed: {source}")]
    Fatal {
        stage: Stage,
        #[source]
        source: BackendError,
    },

    #[error("allocating frame slot {slot} failed: {source}")]
    Allocation {
        slot: usize,
        #[source]
        source: BackendError,
    },

    /// Teardown was attempted while a slot's submission had not retired.
    #[error("frame slot {slot} still has unretired GPU work")]
    OutstandingWork { slot: usize },

    /// A stage was called out of sequence for the slot's current phase.
    #[error("{stage} out of order on frame slot {slot}: slot is {phase}")]
    OutOfOrder {
        stage: Stage,
        slot: usize,
        phase: SlotPhase,
    },

    /// A frame operation was issued after the slot pool was released.
    #[error("frame scheduler has been destroyed")]
    Destroyed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FrameError {
    /// Classifies a backend error raised at `stage`.
    ///
    /// Out-of-date is only recoverable where the display reports it (acquire
    /// and present); anywhere else it is treated as fatal. `bound` is the
    /// timeout the stage waited with; a timeout from an unbounded call is a
    /// plain backend failure.
    pub fn from_backend(stage: Stage, error: BackendError, bound: Option<Duration>) -> Self {
        match (error, bound) {
            (BackendError::OutOfDate, _) if matches!(stage, Stage::Acquire | Stage::Present) => {
                FrameError::OutOfDate { stage }
            }
            (BackendError::Timeout, Some(timeout)) => FrameError::Timeout { stage, timeout },
            (source, _) => FrameError::Fatal { stage, source },
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            FrameError::OutOfDate { .. } => ErrorClass::Recoverable,
            FrameError::Timeout { .. } => ErrorClass::Timeout,
            FrameError::Allocation { .. } => ErrorClass::ResourceExhaustion,
            FrameError::Fatal { .. }
            | FrameError::OutstandingWork { .. }
            | FrameError::OutOfOrder { .. }
            | FrameError::Destroyed
            | FrameError::InvalidConfig(_) => ErrorClass::Fatal,
        }
    }

    #[inline]
    pub fn is_recoverable(&self) -> bool {
        self.class() == ErrorClass::Recoverable
    }

    /// Stage the error was raised in, for diagnostics.
    pub fn stage(&self) -> Stage {
        match self {
            FrameError::OutOfDate { stage }
            | FrameError::Timeout { stage, .. }
            | FrameError::Fatal { stage, .. }
            | FrameError::OutOfOrder { stage, .. } => *stage,
            FrameError::Allocation { .. } | FrameError::InvalidConfig(_) => Stage::Initialize,
            FrameError::OutstandingWork { .. } | FrameError::Destroyed => Stage::Destroy,
        }
    }
}
