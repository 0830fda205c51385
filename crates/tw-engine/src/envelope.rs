//! Per-voice ADSR amplitude envelope.

/// Output level below which a releasing voice counts as silent and its
/// slot can be reclaimed.
pub const SILENCE_THRESHOLD: f32 = 1.0e-4;

/// Envelope stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnvStage {
    /// Producing no output; voice slot reclaimable
    #[default]
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Linear ADSR envelope advanced once per sample.
///
/// `trigger` keeps the current level, so retriggering a stolen voice ramps
/// from where it was instead of stepping to zero.
#[derive(Clone, Debug, Default)]
pub struct Adsr {
    stage: EnvStage,
    level: f32,
    attack_step: f32,
    decay_step: f32,
    sustain: f32,
    release_step: f32,
}

impl Adsr {
    /// Set segment rates from times in milliseconds and a sustain level.
    pub fn configure(
        &mut self,
        sample_rate: f64,
        attack_ms: f32,
        decay_ms: f32,
        sustain: f32,
        release_ms: f32,
    ) {
        self.attack_step = 1.0 / samples_for(sample_rate, attack_ms);
        self.sustain = sustain.clamp(0.0, 1.0);
        self.decay_step = (1.0 - self.sustain).max(0.0) / samples_for(sample_rate, decay_ms);
        self.release_step = 1.0 / samples_for(sample_rate, release_ms);
    }

    /// Enter the attack stage from the current level.
    pub fn trigger(&mut self) {
        self.stage = EnvStage::Attack;
    }

    /// Enter the release stage (note-off).
    pub fn gate_off(&mut self) {
        if self.stage != EnvStage::Idle {
            self.stage = EnvStage::Release;
        }
    }

    /// Silence immediately.
    pub fn reset(&mut self) {
        self.stage = EnvStage::Idle;
        self.level = 0.0;
    }

    /// Advance one sample and return the new level.
    pub fn advance(&mut self) -> f32 {
        match self.stage {
            EnvStage::Idle => {}
            EnvStage::Attack => {
                self.level += self.attack_step;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvStage::Decay;
                }
            }
            EnvStage::Decay => {
                self.level -= self.decay_step;
                if self.level <= self.sustain {
                    self.level = self.sustain;
                    self.stage = if self.sustain <= SILENCE_THRESHOLD {
                        self.level = 0.0;
                        EnvStage::Idle
                    } else {
                        EnvStage::Sustain
                    };
                }
            }
            EnvStage::Sustain => {
                self.level = self.sustain;
            }
            EnvStage::Release => {
                self.level -= self.release_step;
                if self.level <= SILENCE_THRESHOLD {
                    self.level = 0.0;
                    self.stage = EnvStage::Idle;
                }
            }
        }
        self.level
    }

    /// Current level without advancing.
    pub fn level(&self) -> f32 {
        self.level
    }

    /// Current stage.
    pub fn stage(&self) -> EnvStage {
        self.stage
    }

    /// Whether the envelope has fully decayed.
    pub fn is_idle(&self) -> bool {
        self.stage == EnvStage::Idle
    }
}

/// Samples for a segment time, minimum one to keep steps finite.
fn samples_for(sample_rate: f64, ms: f32) -> f32 {
    let samples = (sample_rate * ms as f64 / 1000.0) as f32;
    samples.max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adsr(sample_rate: f64, a: f32, d: f32, s: f32, r: f32) -> Adsr {
        let mut env = Adsr::default();
        env.configure(sample_rate, a, d, s, r);
        env
    }

    #[test]
    fn attack_reaches_peak() {
        // 10 ms at 1 kHz = 10 samples
        let mut env = adsr(1000.0, 10.0, 10.0, 0.5, 10.0);
        env.trigger();
        for _ in 0..10 {
            env.advance();
        }
        assert_eq!(env.level(), 1.0);
        assert_eq!(env.stage(), EnvStage::Decay);
    }

    #[test]
    fn decay_settles_at_sustain() {
        let mut env = adsr(1000.0, 10.0, 10.0, 0.5, 10.0);
        env.trigger();
        for _ in 0..25 {
            env.advance();
        }
        assert_eq!(env.level(), 0.5);
        assert_eq!(env.stage(), EnvStage::Sustain);
    }

    #[test]
    fn release_reaches_idle() {
        let mut env = adsr(1000.0, 1.0, 1.0, 1.0, 10.0);
        env.trigger();
        for _ in 0..5 {
            env.advance();
        }
        env.gate_off();
        for _ in 0..20 {
            env.advance();
        }
        assert!(env.is_idle());
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn zero_sustain_goes_idle_after_decay() {
        let mut env = adsr(1000.0, 1.0, 5.0, 0.0, 10.0);
        env.trigger();
        for _ in 0..20 {
            env.advance();
        }
        assert!(env.is_idle());
    }

    #[test]
    fn trigger_keeps_current_level() {
        let mut env = adsr(1000.0, 10.0, 10.0, 0.8, 100.0);
        env.trigger();
        for _ in 0..10 {
            env.advance();
        }
        env.gate_off();
        env.advance();
        let level = env.level();
        assert!(level > 0.0);

        // Retrigger (steal): level continues from where it was
        env.trigger();
        let next = env.advance();
        assert!((next - level).abs() <= 0.11);
    }

    #[test]
    fn idle_stays_silent() {
        let mut env = adsr(1000.0, 1.0, 1.0, 0.5, 1.0);
        assert_eq!(env.advance(), 0.0);
        assert!(env.is_idle());
    }

    #[test]
    fn gate_off_when_idle_is_noop() {
        let mut env = adsr(1000.0, 1.0, 1.0, 0.5, 1.0);
        env.gate_off();
        assert!(env.is_idle());
    }

    #[test]
    fn reset_silences() {
        let mut env = adsr(1000.0, 10.0, 10.0, 0.5, 10.0);
        env.trigger();
        env.advance();
        env.reset();
        assert!(env.is_idle());
        assert_eq!(env.level(), 0.0);
    }
}
