//! Karplus-Strong plucked string: a seeded noise burst circulating in a
//! damped delay line.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use tw_core::{AudioBuffer, Event, EventPayload, ParamSpec};

use crate::envelope::{Adsr, SILENCE_THRESHOLD};
use crate::error::PrepareError;
use crate::frequency::note_to_hz;
use crate::instrument::{validate_prepare, BlockEvents, Instrument, InstrumentInfo};
use crate::params::ParamBank;
use crate::smoother::Smoother;
use crate::voice_pool::{NoteStart, VoicePool};

pub const DAMPING: u16 = 0;
pub const DECAY: u16 = 1;
pub const GAIN: u16 = 2;

static INFO: InstrumentInfo = InstrumentInfo {
    name: "pluck",
    params: &[
        ParamSpec::normalized(DAMPING, "damping", 0.3, 0.0),
        ParamSpec::normalized(DECAY, "decay", 0.5, 0.0),
        ParamSpec::normalized(GAIN, "gain", 0.9, 10.0),
    ],
};

const MAX_VOICES: usize = 16;

/// Lowest supported fundamental; sizes the delay lines at prepare.
const MIN_FREQ_HZ: f64 = 27.5;

#[derive(Clone, Default)]
struct StringVoice {
    /// Delay line, allocated once at prepare
    line: Vec<f32>,
    /// Active delay length in samples (the period)
    period: usize,
    /// Read/write cursor
    pos: usize,
    feedback: f32,
    velocity: f32,
    /// EMA of the circulating energy, for voice reclamation
    level: f32,
    age: u32,
    env: Adsr,
}

/// Plucked-string instrument unit.
pub struct Pluck {
    params: Arc<ParamBank>,
    pool: VoicePool,
    voices: Vec<StringVoice>,
    pending: BlockEvents,
    gain: Smoother,
    sample_rate: f64,
    prepared: bool,
}

impl Pluck {
    pub fn new() -> Self {
        Self {
            params: ParamBank::new(INFO.params),
            pool: VoicePool::new(MAX_VOICES),
            voices: Vec::new(),
            pending: BlockEvents::new(),
            gain: Smoother::new(0.9),
            sample_rate: 0.0,
            prepared: false,
        }
    }

    fn start_voice(&mut self, slot: usize, note: u8, velocity: f32) {
        let damping = self.params.get(DAMPING).unwrap_or(0.3);
        let decay_ms = env_ms(self.params.get(DECAY).unwrap_or(0.5));
        let hz = note_to_hz(note) as f64;
        let sr = self.sample_rate;

        let voice = &mut self.voices[slot];
        let max_period = voice.line.len();
        voice.period = ((sr / hz) as usize).clamp(2, max_period.max(2));
        voice.pos = 0;
        voice.feedback = 0.999 - 0.049 * damping;
        voice.velocity = velocity;
        voice.level = 1.0;
        voice.age = 0;

        // Deterministic excitation: the same note and velocity always
        // produce the same burst.
        let mut seed = (note as u32 + 1)
            .wrapping_mul(2_654_435_761)
            ^ velocity.to_bits();
        if seed == 0 {
            seed = 0x9E37_79B9;
        }
        for i in 0..voice.period {
            voice.line[i] = noise(&mut seed) * velocity;
        }

        voice.env.configure(sr, 1.0, 1.0, 1.0, decay_ms);
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
                self.gain.set_target(self.params.get(GAIN).unwrap_or(0.9));
            }
        }
    }
}

impl Default for Pluck {
    fn default() -> Self {
        Self::new()
    }
}

impl Instrument for Pluck {
    fn info(&self) -> &'static InstrumentInfo {
        &INFO
    }

    fn params(&self) -> &Arc<ParamBank> {
        &self.params
    }

    fn prepare(&mut self, sample_rate: f64, max_block: usize) -> Result<(), PrepareError> {
        validate_prepare(sample_rate, max_block)?;
        self.sample_rate = sample_rate;
        let max_period = (sample_rate / MIN_FREQ_HZ) as usize + 1;
        self.voices = (0..MAX_VOICES)
            .map(|_| StringVoice {
                line: vec![0.0; max_period],
                ..StringVoice::default()
            })
            .collect();
        self.pool.reset();
        self.pending.clear();
        self.gain.configure(sample_rate, 10.0);
        self.gain.snap_to(self.params.get(GAIN).unwrap_or(0.9));
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
        self.gain.set_target(self.params.get(GAIN).unwrap_or(0.9));
        let frames = output.frames();

        for i in 0..frames {
            while let Some(payload) = self.pending.pop_at(i) {
                self.apply_event(payload);
            }

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

                let out = voice.line[voice.pos];
                let next = (voice.pos + 1) % voice.period;
                let averaged = 0.5 * (out + voice.line[next]) * voice.feedback;
                voice.line[voice.pos] = averaged;
                voice.pos = next;

                voice.level = 0.999 * voice.level + 0.001 * averaged.abs();
                voice.age = voice.age.saturating_add(1);
                if voice.age as usize > voice.period * 4 && voice.level < SILENCE_THRESHOLD {
                    self.pool.free(slot);
                    continue;
                }

                mix += out * level;
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
            voice.line.fill(0.0);
            voice.pos = 0;
            voice.level = 0.0;
            voice.age = 0;
        }
        self.pending.clear();
        self.params.reset_defaults();
        self.gain.snap_to(self.params.get(GAIN).unwrap_or(0.9));
    }
}

/// Map a normalized decay to a release time in milliseconds.
fn env_ms(norm: f32) -> f32 {
    1.0 + norm * norm * 4000.0
}

/// Xorshift32 noise in [-1, 1].
fn noise(state: &mut u32) -> f32 {
    let mut x = *state;
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    *state = x;
    (x as f32 / u32::MAX as f32) * 2.0 - 1.0
}
