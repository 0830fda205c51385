//! Error types for the engine.
//!
//! Everything here is a reported condition: nothing on the render path
//! panics, and no error crosses the audio callback boundary.

use core::fmt;

use tw_core::TrackId;

/// Why an event was rejected at scheduling time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleError {
    /// Event time lies before the queue's consumption point
    Stale,
    /// Non-finite time/value or out-of-range note/velocity
    Malformed,
    /// Queue is at capacity; inserting would allocate
    Full,
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::Stale => write!(f, "event time already consumed"),
            ScheduleError::Malformed => write!(f, "malformed event"),
            ScheduleError::Full => write!(f, "event queue full"),
        }
    }
}

/// Why `prepare` or queue initialization was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrepareError {
    /// Sample rate must be finite and > 0
    InvalidSampleRate,
    /// Maximum block size must be > 0
    InvalidBlockSize,
}

impl fmt::Display for PrepareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrepareError::InvalidSampleRate => write!(f, "invalid sample rate"),
            PrepareError::InvalidBlockSize => write!(f, "invalid block size"),
        }
    }
}

/// Engine-level configuration errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineError {
    /// Sample rate must be finite and > 0
    InvalidSampleRate,
    /// A track with this id is already registered
    DuplicateTrack(TrackId),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidSampleRate => write!(f, "invalid sample rate"),
            EngineError::DuplicateTrack(id) => write!(f, "duplicate track id: {}", id),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ScheduleError {}
#[cfg(feature = "std")]
impl std::error::Error for PrepareError {}
#[cfg(feature = "std")]
impl std::error::Error for EngineError {}
