//! Two-operator FM synth: one modulator phase-modulating one carrier.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use tw_core::{AudioBuffer, Event, EventPayload, ParamSpec};

use crate::envelope::Adsr;
use crate::error::PrepareError;
use crate::frequency::note_to_hz;
use crate::instrument::{validate_prepare, BlockEvents, Instrument, InstrumentInfo};
use crate::params::ParamBank;
use crate::smoother::Smoother;
use crate::voice_pool::{NoteStart, VoicePool};

pub const RATIO: u16 = 0;
pub const INDEX: u16 = 1;
pub const ATTACK: u16 = 2;
pub const DECAY: u16 = 3;
pub const SUSTAIN: u16 = 4;
pub const RELEASE: u16 = 5;
pub const GAIN: u16 = 6;

static INFO: InstrumentInfo = InstrumentInfo {
    name: "fm",
    params: &[
        ParamSpec::normalized(RATIO, "ratio", 0.4, 0.0),
        ParamSpec::normalized(INDEX, "index", 0.3, 10.0),
        ParamSpec::normalized(ATTACK, "attack", 0.01, 0.0),
        ParamSpec::normalized(DECAY, "decay", 0.3, 0.0),
        ParamSpec::normalized(SUSTAIN, "sustain", 0.6, 0.0),
        ParamSpec::normalized(RELEASE, "release", 0.2, 0.0),
        ParamSpec::normalized(GAIN, "gain", 0.8, 10.0),
    ],
};

const MAX_VOICES: usize = 16;

#[derive(Clone, Default)]
struct FmVoice {
    carrier_phase: f32,
    modulator_phase: f32,
    carrier_inc: f32,
    modulator_inc: f32,
    velocity: f32,
    env: Adsr,
}

/// FM instrument unit.
pub struct FmSynth {
    params: Arc<ParamBank>,
    pool: VoicePool,
    voices: Vec<FmVoice>,
    pending: BlockEvents,
    index: Smoother,
    gain: Smoother,
    sample_rate: f64,
    prepared: bool,
}

impl FmSynth {
    pub fn new() -> Self {
        Self {
            params: ParamBank::new(INFO.params),
            pool: VoicePool::new(MAX_VOICES),
            voices: Vec::new(),
            pending: BlockEvents::new(),
            index: Smoother::new(0.3),
            gain: Smoother::new(0.8),
            sample_rate: 0.0,
            prepared: false,
        }
    }

    fn start_voice(&mut self, slot: usize, note: u8, velocity: f32) {
        let sr = self.sample_rate as f32;
        let ratio = operator_ratio(self.params.get(RATIO).unwrap_or(0.4));
        let carrier_hz = note_to_hz(note);

        let voice = &mut self.voices[slot];
        voice.carrier_phase = 0.0;
        voice.modulator_phase = 0.0;
        voice.carrier_inc = carrier_hz / sr;
        voice.modulator_inc = carrier_hz * ratio / sr;
        voice.velocity = velocity;
        voice.env.configure(
            self.sample_rate,
            env_ms(self.params.get(ATTACK).unwrap_or(0.0)),
            env_ms(self.params.get(DECAY).unwrap_or(0.0)),
            self.params.get(SUSTAIN).unwrap_or(1.0),
            env_ms(self.params.get(RELEASE).unwrap_or(0.0)),
        );
        voice.env.trigger();
    }

    fn apply_event(&mut self, payload: EventPayload) {
        match payload {
            EventPayload::NoteOn { note, velocity } => {
                match self.pool.note_on(note, velocity) {
                    NoteStart::Fresh(i) | NoteStart::Stolen(i) => self.start_voice(i, note, velocity),
                    NoteStart::Dropped => {}
                }
            }
            EventPayload::NoteOff { note } => {
                if let Some(i) = self.pool.note_off(note) {
                    self.voices[i].env.gate_off();
                }
            }
            EventPayload::ParamChange { param, value } => {
                self.params.set(param, value);
                self.refresh_targets();
            }
        }
    }

    fn refresh_targets(&mut self) {
        self.index.set_target(self.params.get(INDEX).unwrap_or(0.3));
        self.gain.set_target(self.params.get(GAIN).unwrap_or(0.8));
    }
}

impl Default for FmSynth {
    fn default() -> Self {
        Self::new()
    }
}

impl Instrument for FmSynth {
    fn info(&self) -> &'static InstrumentInfo {
        &INFO
    }

    fn params(&self) -> &Arc<ParamBank> {
        &self.params
    }

    fn prepare(&mut self, sample_rate: f64, max_block: usize) -> Result<(), PrepareError> {
        validate_prepare(sample_rate, max_block)?;
        self.sample_rate = sample_rate;
        self.voices = vec![FmVoice::default(); MAX_VOICES];
        self.pool.reset();
        self.pending.clear();
        self.index.configure(sample_rate, 10.0);
        self.gain.configure(sample_rate, 10.0);
        self.index.snap_to(self.params.get(INDEX).unwrap_or(0.3));
        self.gain.snap_to(self.params.get(GAIN).unwrap_or(0.8));
        self.prepared = true;
        Ok(())
    }

    fn handle_event(&mut self, event: &Event, offset: usize) {
        self.pending.push(offset, event.payload);
    }

    fn process(&mut self, output: &mut AudioBuffer) {
        if !self.prepared {
            self.pending.clear();
            return;
        }
        self.refresh_targets();
        let frames = output.frames();

        for i in 0..frames {
            while let Some(payload) = self.pending.pop_at(i) {
                self.apply_event(payload);
            }

            let depth = self.index.next() * 8.0;
            let gain = self.gain.next();

            let mut mix = 0.0f32;
            for (slot, voice) in self.voices.iter_mut().enumerate() {
                if !self.pool.is_sounding(slot) {
                    continue;
                }
                let level = voice.env.advance();
                if voice.env.is_idle() {
                    self.pool.free(slot);
                    continue;
                }

                let modulator = libm::sinf(core::f32::consts::TAU * voice.modulator_phase);
                let sample =
                    libm::sinf(core::f32::consts::TAU * voice.carrier_phase + depth * modulator);

                voice.carrier_phase += voice.carrier_inc;
                if voice.carrier_phase >= 1.0 {
                    voice.carrier_phase -= 1.0;
                }
                voice.modulator_phase += voice.modulator_inc;
                if voice.modulator_phase >= 1.0 {
                    voice.modulator_phase -= 1.0;
                }

                mix += sample * level * voice.velocity;
            }

            let sample = mix * gain;
            output.add(0, i, sample);
            if output.channels() > 1 {
                output.add(1, i, sample);
            }
        }
        self.pending.clear();
    }

    fn reset(&mut self) {
        self.pool.reset();
        for voice in &mut self.voices {
            voice.env.reset();
            voice.carrier_phase = 0.0;
            voice.modulator_phase = 0.0;
        }
        self.pending.clear();
        self.params.reset_defaults();
        self.index.snap_to(self.params.get(INDEX).unwrap_or(0.3));
        self.gain.snap_to(self.params.get(GAIN).unwrap_or(0.8));
    }
}

/// Map a normalized ratio onto 0.5 .. 8 (modulator vs. carrier frequency).
fn operator_ratio(norm: f32) -> f32 {
    0.5 * libm::exp2f(norm.clamp(0.0, 1.0) * 4.0)
}

/// Map a normalized envelope time to milliseconds.
fn env_ms(norm: f32) -> f32 {
    1.0 + norm * norm * 4000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_core::track_id;

    fn prepared(sample_rate: f64) -> FmSynth {
        let mut synth = FmSynth::new();
        synth.prepare(sample_rate, 512).unwrap();
        synth
    }

    fn note_event(note: u8) -> Event {
        Event::new(0.0, track_id("t"), EventPayload::note_on(note))
    }

    fn render(synth: &mut FmSynth, frames: usize) -> AudioBuffer {
        let mut buf = AudioBuffer::new(2, frames);
        synth.process(&mut buf);
        buf
    }

    #[test]
    fn note_on_produces_sound() {
        let mut synth = prepared(48000.0);
        synth.handle_event(&note_event(60), 0);
        assert!(render(&mut synth, 256).peak() > 0.0);
    }

    #[test]
    fn output_is_deterministic() {
        let mut a = prepared(48000.0);
        let mut b = prepared(48000.0);
        for synth in [&mut a, &mut b] {
            synth.handle_event(&note_event(48), 0);
            synth.handle_event(&note_event(55), 31);
        }
        let out_a = render(&mut a, 512);
        let out_b = render(&mut b, 512);
        assert_eq!(out_a.channel(0), out_b.channel(0));
    }

    #[test]
    fn modulation_index_changes_spectrum() {
        // Not a spectral test, but index 0 vs max must change the waveform
        let mut plain = prepared(48000.0);
        plain.set_parameter(INDEX, 0.0);
        plain.handle_event(&note_event(60), 0);

        let mut bright = prepared(48000.0);
        bright.set_parameter(INDEX, 1.0);
        bright.handle_event(&note_event(60), 0);

        let a = render(&mut plain, 512);
        let b = render(&mut bright, 512);
        assert_ne!(a.channel(0), b.channel(0));
    }

    #[test]
    fn operator_ratio_spans_expected_range() {
        assert!((operator_ratio(0.0) - 0.5).abs() < 1e-6);
        assert!((operator_ratio(1.0) - 8.0).abs() < 1e-5);
    }

    #[test]
    fn ratio_param_is_snappy_not_smoothed() {
        // Ratio only applies at note start; changing it mid-note must not
        // retune sounding voices.
        let mut synth = prepared(48000.0);
        synth.handle_event(&note_event(60), 0);
        let before = render(&mut synth, 64);
        synth.set_parameter(RATIO, 1.0);
        let after = render(&mut synth, 64);
        // Same note keeps ringing; output stays finite and nonzero
        assert!(before.peak() > 0.0);
        assert!(after.peak() > 0.0);
    }

    #[test]
    fn preset_round_trip_with_boundaries() {
        let mut synth = prepared(48000.0);
        synth.set_parameter(RATIO, 0.0);
        synth.set_parameter(INDEX, 1.0);
        let text = synth.save_preset();

        let mut other = prepared(48000.0);
        assert!(other.load_preset(&text));
        assert_eq!(other.parameter(RATIO), Some(0.0));
        assert_eq!(other.parameter(INDEX), Some(1.0));
    }

    #[test]
    fn rejects_preset_from_other_instrument() {
        let mut synth = prepared(48000.0);
        let foreign = r#"{"format":1,"instrument":"subtractive","params":{"gain":0.5}}"#;
        assert!(!synth.load_preset(foreign));
    }
}
