//! Core types for the tonewheel synthesis engine.
//!
//! This crate defines the data model shared by the engine and its hosts:
//! musical events, transport state, audio buffers, parameter descriptors,
//! sample data, and the song model loaded by host adapters.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod buffer;
mod event;
mod param;
mod sample;
mod song;
mod time;

pub use buffer::{AudioBuffer, BLOCK_SIZE};
pub use event::{track_id, Event, EventPayload, TrackId};
pub use param::ParamSpec;
pub use sample::{Sample, SampleKey};
pub use song::{Song, TrackSpec};
pub use time::{
    beats_to_seconds, block_duration, sample_offset, seconds_per_beat, TimeSignature, Transport,
    TransportState,
};
