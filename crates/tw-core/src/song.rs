//! Song model consumed by host adapters.
//!
//! A song is the serialized composition: a set of tracks, each naming the
//! instrument that plays it, plus a sparse event timeline. The engine never
//! sees this type; hosts turn it into registered instrument units and
//! scheduled events.

use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::event::{Event, TrackId};
use crate::time::TimeSignature;

/// One track of a song: which instrument plays it and how it starts out.
#[derive(Clone, Debug)]
pub struct TrackSpec {
    /// Stable id, also the event routing target
    pub id: TrackId,
    /// Registry name of the instrument to construct
    pub instrument: ArrayString<24>,
    /// Initial parameter values by name, applied after `prepare`
    pub params: Vec<(ArrayString<24>, f32)>,
}

impl TrackSpec {
    /// Create a track playing the named instrument.
    pub fn new(id: TrackId, instrument: &str) -> Self {
        let mut name = ArrayString::new();
        let _ = name.try_push_str(instrument);
        Self {
            id,
            instrument: name,
            params: Vec::new(),
        }
    }

    /// Builder-style initial parameter value.
    pub fn with_param(mut self, name: &str, value: f32) -> Self {
        let mut key = ArrayString::new();
        let _ = key.try_push_str(name);
        self.params.push((key, value));
        self
    }
}

/// A complete composition.
#[derive(Clone, Debug)]
pub struct Song {
    /// Song title
    pub title: ArrayString<32>,
    /// Tempo in BPM
    pub tempo_bpm: f64,
    /// Time signature
    pub time_signature: TimeSignature,
    /// Tracks, in registration order
    pub tracks: Vec<TrackSpec>,
    /// Sparse event timeline (any order; the queue sorts)
    pub events: Vec<Event>,
}

impl Default for Song {
    fn default() -> Self {
        Self {
            title: ArrayString::new(),
            tempo_bpm: 120.0,
            time_signature: TimeSignature::default(),
            tracks: Vec::new(),
            events: Vec::new(),
        }
    }
}

impl Song {
    /// Create a new empty song.
    pub fn new(title: &str) -> Self {
        let mut song = Self::default();
        let _ = song.title.try_push_str(title);
        song
    }

    /// Add a track.
    pub fn add_track(&mut self, track: TrackSpec) {
        self.tracks.push(track);
    }

    /// Append an event to the timeline.
    pub fn push_event(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Find a track by id.
    pub fn track(&self, id: &TrackId) -> Option<&TrackSpec> {
        self.tracks.iter().find(|t| &t.id == id)
    }

    /// Time of the last event, or 0.0 for an empty song.
    pub fn total_time(&self) -> f64 {
        self.events.iter().fold(0.0, |acc, e| acc.max(e.time))
    }
}
