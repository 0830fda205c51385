//! Sample-playback instrument: pitch-shifted, loop-aware voices reading
//! from a keyed sample bank.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use slotmap::SlotMap;
use tw_core::{AudioBuffer, Event, EventPayload, ParamSpec, Sample, SampleKey};

use crate::envelope::Adsr;
use crate::error::PrepareError;
use crate::frequency::pitch_ratio;
use crate::instrument::{validate_prepare, BlockEvents, Instrument, InstrumentInfo};
use crate::params::ParamBank;
use crate::smoother::Smoother;
use crate::voice_pool::{NoteStart, StealPolicy, VoicePool};

pub const ATTACK: u16 = 0;
pub const RELEASE: u16 = 1;
pub const GAIN: u16 = 2;

static INFO: InstrumentInfo = InstrumentInfo {
    name: "sampler",
    params: &[
        ParamSpec::normalized(ATTACK, "attack", 0.0, 0.0),
        ParamSpec::normalized(RELEASE, "release", 0.1, 0.0),
        ParamSpec::normalized(GAIN, "gain", 0.9, 10.0),
    ],
};

const MAX_VOICES: usize = 16;

#[derive(Clone, Default)]
struct SamplerVoice {
    position: f64,
    ratio: f64,
    key: Option<SampleKey>,
    velocity: f32,
    env: Adsr,
}

/// Sampler instrument unit.
///
/// Ships with the `DropNew` policy: exceeding polyphony drops the incoming
/// note instead of stealing. Hosts that prefer stealing can flip it with
/// [`Sampler::set_steal_policy`].
pub struct Sampler {
    params: Arc<ParamBank>,
    bank: SlotMap<SampleKey, Sample>,
    active_sample: Option<SampleKey>,
    pool: VoicePool,
    voices: Vec<SamplerVoice>,
    pending: BlockEvents,
    gain: Smoother,
    sample_rate: f64,
    prepared: bool,
}

impl Sampler {
    pub fn new() -> Self {
        let mut pool = VoicePool::new(MAX_VOICES);
        pool.set_policy(StealPolicy::DropNew);
        Self {
            params: ParamBank::new(INFO.params),
            bank: SlotMap::with_key(),
            active_sample: None,
            pool,
            voices: Vec::new(),
            pending: BlockEvents::new(),
            gain: Smoother::new(0.9),
            sample_rate: 0.0,
            prepared: false,
        }
    }

    /// Add a sample to the bank; the first added sample becomes active.
    /// Control-context only (allocates).
    pub fn add_sample(&mut self, sample: Sample) -> SampleKey {
        let key = self.bank.insert(sample);
        if self.active_sample.is_none() {
            self.active_sample = Some(key);
        }
        key
    }

    /// Select which bank sample new notes play.
    pub fn select_sample(&mut self, key: SampleKey) -> bool {
        if self.bank.contains_key(key) {
            self.active_sample = Some(key);
            true
        } else {
            false
        }
    }

    /// Change the voice-exhaustion policy.
    pub fn set_steal_policy(&mut self, policy: StealPolicy) {
        self.pool.set_policy(policy);
    }

    fn start_voice(&mut self, slot: usize, note: u8, velocity: f32) {
        let Some(key) = self.active_sample else {
            self.pool.free(slot);
            return;
        };
        let root = self.bank.get(key).map_or(60, |s| s.root_note);
        let voice = &mut self.voices[slot];
        voice.position = 0.0;
        voice.ratio = pitch_ratio(note, root);
        voice.key = Some(key);
        voice.velocity = velocity;
        voice.env.configure(
            self.sample_rate,
            env_ms(self.params.get(ATTACK).unwrap_or(0.0)),
            1.0,
            1.0,
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
                self.gain.set_target(self.params.get(GAIN).unwrap_or(0.9));
            }
        }
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Instrument for Sampler {
    fn info(&self) -> &'static InstrumentInfo {
        &INFO
    }

    fn params(&self) -> &Arc<ParamBank> {
        &self.params
    }

    fn prepare(&mut self, sample_rate: f64, max_block: usize) -> Result<(), PrepareError> {
        validate_prepare(sample_rate, max_block)?;
        self.sample_rate = sample_rate;
        self.voices = vec![SamplerVoice::default(); MAX_VOICES];
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
                let Some(sample) = voice.key.and_then(|k| self.bank.get(k)) else {
                    self.pool.free(slot);
                    continue;
                };

                if sample.has_loop() {
                    let loop_len = (sample.loop_end - sample.loop_start) as f64;
                    while voice.position >= sample.loop_end as f64 {
                        voice.position -= loop_len;
                    }
                } else if voice.position >= sample.len() as f64 {
                    self.pool.free(slot);
                    continue;
                }

                mix += sample.value_at(voice.position) * level * voice.velocity;
                voice.position += voice.ratio;
            }

            let out = mix * gain;
            output.add(0, i, out);
            if output.channels() > 1 {
                output.add(1, i, out);
            }
        }
        self.pending.clear();
    }

    fn reset(&mut self) {
        self.pool.reset();
        for voice in &mut self.voices {
            voice.env.reset();
            voice.position = 0.0;
            voice.key = None;
        }
        self.pending.clear();
        self.params.reset_defaults();
        self.gain.snap_to(self.params.get(GAIN).unwrap_or(0.9));
    }
}

/// Map a normalized envelope time to milliseconds.
fn env_ms(norm: f32) -> f32 {
    1.0 + norm * norm * 4000.0
}
