//! Polyphonic subtractive synth: saw/pulse oscillator into a one-pole
//! lowpass, ADSR amplitude envelope per voice.

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

pub const WAVEFORM: u16 = 0;
pub const CUTOFF: u16 = 1;
pub const ATTACK: u16 = 2;
pub const DECAY: u16 = 3;
pub const SUSTAIN: u16 = 4;
pub const RELEASE: u16 = 5;
pub const GAIN: u16 = 6;

static INFO: InstrumentInfo = InstrumentInfo {
    name: "subtractive",
    params: &[
        ParamSpec::normalized(WAVEFORM, "waveform", 0.0, 0.0),
        ParamSpec::normalized(CUTOFF, "cutoff", 0.7, 10.0),
        ParamSpec::normalized(ATTACK, "attack", 0.02, 0.0),
        ParamSpec::normalized(DECAY, "decay", 0.2, 0.0),
        ParamSpec::normalized(SUSTAIN, "sustain", 0.7, 0.0),
        ParamSpec::normalized(RELEASE, "release", 0.25, 0.0),
        ParamSpec::normalized(GAIN, "gain", 0.8, 10.0),
    ],
};

const MAX_VOICES: usize = 16;

#[derive(Clone, Default)]
struct OscVoice {
    phase: f32,
    increment: f32,
    filter_state: f32,
    velocity: f32,
    env: Adsr,
}

/// Subtractive instrument unit.
pub struct Subtractive {
    params: Arc<ParamBank>,
    pool: VoicePool,
    voices: Vec<OscVoice>,
    pending: BlockEvents,
    cutoff: Smoother,
    gain: Smoother,
    sample_rate: f64,
    prepared: bool,
}

impl Subtractive {
    pub fn new() -> Self {
        let params = ParamBank::new(INFO.params);
        Self {
            params,
            pool: VoicePool::new(MAX_VOICES),
            voices: Vec::new(),
            pending: BlockEvents::new(),
            cutoff: Smoother::new(0.7),
            gain: Smoother::new(0.8),
            sample_rate: 0.0,
            prepared: false,
        }
    }

    fn start_voice(&mut self, index: usize, note: u8, velocity: f32) {
        let sr = self.sample_rate;
        let voice = &mut self.voices[index];
        voice.phase = 0.0;
        voice.increment = note_to_hz(note) / sr as f32;
        voice.velocity = velocity;
        voice.env.configure(
            sr,
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
                    NoteStart::Fresh(i) | NoteStart::Stolen(i) => {
                        self.start_voice(i, note, velocity)
                    }
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

    /// Pull the latest control-side targets into the smoothers.
    fn refresh_targets(&mut self) {
        self.cutoff.set_target(self.params.get(CUTOFF).unwrap_or(0.7));
        self.gain.set_target(self.params.get(GAIN).unwrap_or(0.8));
    }
}

impl Default for Subtractive {
    fn default() -> Self {
        Self::new()
    }
}

impl Instrument for Subtractive {
    fn info(&self) -> &'static InstrumentInfo {
        &INFO
    }

    fn params(&self) -> &Arc<ParamBank> {
        &self.params
    }

    fn prepare(&mut self, sample_rate: f64, max_block: usize) -> Result<(), PrepareError> {
        validate_prepare(sample_rate, max_block)?;
        self.sample_rate = sample_rate;
        self.voices = vec![OscVoice::default(); MAX_VOICES];
        self.pool.reset();
        self.pending.clear();
        self.cutoff.configure(sample_rate, spec_smooth_ms(CUTOFF));
        self.gain.configure(sample_rate, spec_smooth_ms(GAIN));
        self.cutoff.snap_to(self.params.get(CUTOFF).unwrap_or(0.7));
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
        let wave_blend = self.params.get(WAVEFORM).unwrap_or(0.0);
        let frames = output.frames();
        let sr = self.sample_rate;

        for i in 0..frames {
            while let Some(payload) = self.pending.pop_at(i) {
                self.apply_event(payload);
            }

            let cutoff = self.cutoff.next();
            let gain = self.gain.next();
            let g = filter_coeff(cutoff, sr);

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

                let saw = 2.0 * voice.phase - 1.0;
                let pulse = if voice.phase < 0.5 { 1.0 } else { -1.0 };
                let osc = saw + (pulse - saw) * wave_blend;
                voice.phase += voice.increment;
                if voice.phase >= 1.0 {
                    voice.phase -= 1.0;
                }

                voice.filter_state += g * (osc - voice.filter_state);
                mix += voice.filter_state * level * voice.velocity;
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
            voice.phase = 0.0;
            voice.filter_state = 0.0;
        }
        self.pending.clear();
        self.params.reset_defaults();
        self.cutoff.snap_to(self.params.get(CUTOFF).unwrap_or(0.7));
        self.gain.snap_to(self.params.get(GAIN).unwrap_or(0.8));
    }
}

/// Smoothing time declared in the param table.
fn spec_smooth_ms(id: u16) -> f32 {
    INFO.params
        .iter()
        .find(|s| s.id == id)
        .map_or(0.0, |s| s.smooth_ms)
}

/// Map a normalized envelope time to milliseconds (1 ms .. ~4 s, squared
/// taper so small values stay usable).
fn env_ms(norm: f32) -> f32 {
    1.0 + norm * norm * 4000.0
}

/// One-pole lowpass coefficient from a normalized cutoff.
/// Cutoff maps 20 Hz .. ~20 kHz exponentially.
fn filter_coeff(norm_cutoff: f32, sample_rate: f64) -> f32 {
    let hz = 20.0 * libm::exp2f(norm_cutoff.clamp(0.0, 1.0) * 10.0);
    let g = 1.0 - libm::expf(-core::f32::consts::TAU * hz / sample_rate as f32);
    g.clamp(0.0, 1.0)
}
