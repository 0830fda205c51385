//! Note-to-frequency conversion for the synth voices.
//!
//! Uses a 12-entry equal-temperament ratio table plus whole-octave scaling
//! so the same note always maps to the same bit pattern, keeping replays
//! deterministic across runs.

/// MIDI note number of concert A.
const A4_NOTE: i16 = 69;

/// Frequency of concert A in Hz.
const A4_HZ: f32 = 440.0;

/// Ratios for 0-11 semitones above the octave base: 2^(n/12).
const SEMITONE_RATIO: [f32; 12] = [
    1.0,
    1.059_463_1,
    1.122_462_0,
    1.189_207_1,
    1.259_921_0,
    1.334_839_9,
    1.414_213_6,
    1.498_307_1,
    1.587_401_1,
    1.681_792_8,
    1.781_797_4,
    1.887_748_6,
];

/// Convert a MIDI note number to a frequency in Hz (12-TET, A4 = 440 Hz).
pub fn note_to_hz(note: u8) -> f32 {
    let offset = note as i16 - A4_NOTE;
    let semitone = offset.rem_euclid(12) as usize;
    let octave = offset.div_euclid(12) as i32;
    A4_HZ * SEMITONE_RATIO[semitone] * libm::exp2f(octave as f32)
}

/// Playback-rate ratio that pitches `root` material up/down to `note`.
pub fn pitch_ratio(note: u8, root: u8) -> f64 {
    let semitones = note as i16 - root as i16;
    libm::exp2(semitones as f64 / 12.0)
}
