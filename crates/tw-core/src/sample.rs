//! Sample data for the sampler instrument.

use alloc::vec::Vec;
use arrayvec::ArrayString;

slotmap::new_key_type! {
    /// Key referencing a sample in an instrument's sample bank.
    pub struct SampleKey;
}

/// A mono f32 sample with an optional forward loop.
#[derive(Clone, Debug)]
pub struct Sample {
    /// Sample name
    pub name: ArrayString<26>,
    /// Audio data at the engine sample rate
    pub data: Vec<f32>,
    /// Loop start position (in frames)
    pub loop_start: usize,
    /// Loop end position (in frames, exclusive)
    pub loop_end: usize,
    /// Whether the loop region repeats
    pub looping: bool,
    /// MIDI note the data plays back at unity pitch
    pub root_note: u8,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            name: ArrayString::new(),
            data: Vec::new(),
            loop_start: 0,
            loop_end: 0,
            looping: false,
            root_note: 60,
        }
    }
}

impl Sample {
    /// Create a sample from raw frames rooted at the given note.
    pub fn from_frames(name: &str, data: Vec<f32>, root_note: u8) -> Self {
        let mut sample = Self::default();
        let _ = sample.name.try_push_str(name);
        sample.data = data;
        sample.root_note = root_note;
        sample
    }

    /// Length in frames.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the sample has no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if the sample has a usable loop region.
    pub fn has_loop(&self) -> bool {
        self.looping && self.loop_end > self.loop_start && self.loop_end <= self.len()
    }

    /// Linearly interpolated read at a fractional frame position.
    ///
    /// Positions past the end read as silence; looping is the caller's
    /// concern (the playback voice wraps its position before reading).
    pub fn value_at(&self, pos: f64) -> f32 {
        if pos < 0.0 {
            return 0.0;
        }
        let idx = pos as usize;
        let frac = (pos - idx as f64) as f32;
        let a = self.data.get(idx).copied().unwrap_or(0.0);
        let b = self.data.get(idx + 1).copied().unwrap_or(0.0);
        a + (b - a) * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn from_frames_sets_root() {
        let s = Sample::from_frames("kick", vec![0.0, 1.0], 48);
        assert_eq!(s.root_note, 48);
        assert_eq!(s.len(), 2);
        assert!(!s.is_empty());
    }

    #[test]
    fn value_at_interpolates() {
        let s = Sample::from_frames("ramp", vec![0.0, 1.0], 60);
        assert_eq!(s.value_at(0.0), 0.0);
        assert!((s.value_at(0.5) - 0.5).abs() < 1e-6);
        assert_eq!(s.value_at(1.0), 1.0);
    }

    #[test]
    fn value_past_end_is_silent() {
        let s = Sample::from_frames("short", vec![1.0], 60);
        assert_eq!(s.value_at(5.0), 0.0);
        assert_eq!(s.value_at(-1.0), 0.0);
    }

    #[test]
    fn has_loop_requires_valid_region() {
        let mut s = Sample::from_frames("looped", vec![0.0; 100], 60);
        assert!(!s.has_loop());

        s.looping = true;
        s.loop_start = 10;
        s.loop_end = 90;
        assert!(s.has_loop());

        s.loop_end = 5;
        assert!(!s.has_loop());

        s.loop_end = 200;
        assert!(!s.has_loop());
    }
}
