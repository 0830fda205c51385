//! Event-scheduling and instrument-execution engine for tonewheel.
//!
//! Turns a sparse stream of musical events into sample-accurate audio:
//! the [`EventQueue`] orders pending events, the [`Engine`] drives the
//! per-block render loop, and [`Instrument`] units synthesize into a
//! shared output buffer under real-time constraints (no allocation, no
//! blocking after `prepare`).

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod engine;
mod envelope;
mod error;
mod event_queue;
mod frame;
mod frequency;
mod instrument;
pub mod instruments;
mod params;
mod preset;
mod registry;
mod smoother;
mod voice_pool;

pub use engine::Engine;
pub use envelope::{Adsr, EnvStage, SILENCE_THRESHOLD};
pub use error::{EngineError, PrepareError, ScheduleError};
pub use event_queue::{EventQueue, EventSink, DEFAULT_CAPACITY, NO_EVENT};
pub use frame::Frame;
pub use frequency::{note_to_hz, pitch_ratio};
pub use instrument::{
    validate_prepare, BlockEvents, Instrument, InstrumentInfo, MAX_BLOCK_EVENTS,
};
pub use params::ParamBank;
pub use registry::{InstrumentCtor, InstrumentRegistry};
pub use smoother::Smoother;
pub use voice_pool::{NoteStart, StealPolicy, VoicePool, VoiceSlot, VoiceStage};
