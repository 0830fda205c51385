//! Transport state and time conversions.
//!
//! The engine's universal time coordinate is absolute seconds from
//! transport zero. Beats are derived through the current tempo, so
//! producers that think in beats convert at scheduling time.

/// Playback state of the transport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportState {
    /// Not playing; position holds its last value
    #[default]
    Stopped,
    /// Advancing once per processed block
    Playing,
    /// Frozen mid-song, resumable
    Paused,
}

/// A musical time signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self { numerator: 4, denominator: 4 }
    }
}

impl TimeSignature {
    /// Create a time signature; both fields must be nonzero.
    pub fn new(numerator: u8, denominator: u8) -> Option<Self> {
        if numerator == 0 || denominator == 0 {
            return None;
        }
        Some(Self { numerator, denominator })
    }

    /// Quarter-note beats per bar.
    pub fn beats_per_bar(&self) -> f64 {
        self.numerator as f64 * 4.0 / self.denominator as f64
    }
}

/// Transport position, tempo, and playback state.
///
/// Single-owner: the engine controller mutates this between blocks only,
/// never concurrently with rendering.
#[derive(Clone, Copy, Debug)]
pub struct Transport {
    pub state: TransportState,
    pub position_seconds: f64,
    pub tempo_bpm: f64,
    pub time_signature: TimeSignature,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            state: TransportState::Stopped,
            position_seconds: 0.0,
            tempo_bpm: 120.0,
            time_signature: TimeSignature::default(),
        }
    }
}

impl Transport {
    /// Create a stopped transport at position zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current position expressed in quarter-note beats.
    pub fn position_beats(&self) -> f64 {
        self.position_seconds / seconds_per_beat(self.tempo_bpm)
    }

    /// Duration of one bar at the current tempo and time signature.
    pub fn seconds_per_bar(&self) -> f64 {
        self.time_signature.beats_per_bar() * seconds_per_beat(self.tempo_bpm)
    }
}

/// Duration of one quarter-note beat at the given tempo.
pub fn seconds_per_beat(tempo_bpm: f64) -> f64 {
    60.0 / tempo_bpm
}

/// Convert a beat count to seconds at the given tempo.
pub fn beats_to_seconds(beats: f64, tempo_bpm: f64) -> f64 {
    beats * seconds_per_beat(tempo_bpm)
}

/// Duration of an audio block in seconds.
pub fn block_duration(frames: usize, sample_rate: f64) -> f64 {
    frames as f64 / sample_rate
}

/// Sample offset of an event time within a block starting at `block_start`.
///
/// Rounds to the nearest sample and clamps into `0..frames`, so events that
/// land fractionally before the block edge still dispatch inside it.
pub fn sample_offset(time: f64, block_start: f64, sample_rate: f64, frames: usize) -> usize {
    let exact = (time - block_start) * sample_rate;
    let rounded = libm::round(exact);
    if rounded <= 0.0 {
        return 0;
    }
    (rounded as usize).min(frames.saturating_sub(1))
}
