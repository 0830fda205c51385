//! The engine controller: transport, track map, and the per-block
//! render loop.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use tw_core::{
    block_duration, AudioBuffer, Event, TimeSignature, TrackId, Transport, TransportState,
};

use crate::error::{EngineError, ScheduleError};
use crate::event_queue::{EventQueue, EventSink};
use crate::instrument::Instrument;
use crate::params::ParamBank;

struct TrackSlot {
    id: TrackId,
    unit: Box<dyn Instrument>,
}

/// Routes dispatched events to their track's instrument unit.
struct TrackMapSink<'a> {
    tracks: &'a mut [TrackSlot],
}

impl EventSink for TrackMapSink<'_> {
    fn dispatch(&mut self, event: &Event, offset: usize) -> bool {
        match self.tracks.iter_mut().find(|t| t.id == event.target) {
            Some(track) => {
                track.unit.handle_event(event, offset);
                true
            }
            None => false,
        }
    }
}

#[cfg(feature = "alloc_check")]
fn rt_guard<T>(f: impl FnOnce() -> T) -> T {
    assert_no_alloc::assert_no_alloc(f)
}

#[cfg(not(feature = "alloc_check"))]
fn rt_guard<T>(f: impl FnOnce() -> T) -> T {
    f()
}

/// Owns transport state, the event queue, and the registered instrument
/// units, and drives them once per audio block.
///
/// The engine itself is single-threaded: exactly one context may call
/// `process`, and hosts bridge other threads to it with lock-free
/// structures (see `tw-host`). Parameter writes are the exception — the
/// per-track [`ParamBank`] handles are safe from any thread.
pub struct Engine {
    tracks: Vec<TrackSlot>,
    queue: EventQueue,
    transport: Transport,
    pending_tempo: Option<f64>,
    pending_time_signature: Option<TimeSignature>,
    sample_rate: f64,
}

impl Engine {
    /// Create an engine at the given sample rate.
    pub fn new(sample_rate: f64) -> Result<Self, EngineError> {
        let mut queue = EventQueue::new();
        queue
            .initialize(sample_rate)
            .map_err(|_| EngineError::InvalidSampleRate)?;
        Ok(Self {
            tracks: Vec::new(),
            queue,
            transport: Transport::new(),
            pending_tempo: None,
            pending_time_signature: None,
            sample_rate,
        })
    }

    /// The engine sample rate.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Register a prepared instrument unit under a stable track id.
    ///
    /// The unit must already be `prepare`d at this engine's sample rate
    /// with a block size no smaller than the host's.
    pub fn register_track(
        &mut self,
        id: TrackId,
        unit: Box<dyn Instrument>,
    ) -> Result<(), EngineError> {
        if self.tracks.iter().any(|t| t.id == id) {
            return Err(EngineError::DuplicateTrack(id));
        }
        self.tracks.push(TrackSlot { id, unit });
        Ok(())
    }

    /// Registered track ids, in registration order.
    pub fn track_ids(&self) -> impl Iterator<Item = &TrackId> {
        self.tracks.iter().map(|t| &t.id)
    }

    /// Number of registered tracks.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// A track's shared parameter bank, for lock-free control-side writes.
    pub fn param_bank(&self, id: &TrackId) -> Option<Arc<ParamBank>> {
        self.tracks
            .iter()
            .find(|t| &t.id == id)
            .map(|t| Arc::clone(t.unit.params()))
    }

    /// Write a parameter target on one track.
    pub fn set_parameter(&self, id: &TrackId, param: u16, value: f32) -> bool {
        match self.tracks.iter().find(|t| &t.id == id) {
            Some(track) => track.unit.set_parameter(param, value),
            None => false,
        }
    }

    // --- Transport ---

    /// Start (or resume) playback. Returns false, with no state change,
    /// when no tracks are loaded.
    pub fn play(&mut self) -> bool {
        if self.tracks.is_empty() {
            return false;
        }
        self.transport.state = TransportState::Playing;
        true
    }

    /// Pause playback; position is kept. No effect unless playing.
    pub fn pause(&mut self) -> bool {
        if self.transport.state != TransportState::Playing {
            return false;
        }
        self.transport.state = TransportState::Paused;
        true
    }

    /// Stop playback, rewind to zero, clear pending events, and silence
    /// every unit.
    pub fn stop(&mut self) {
        self.transport.state = TransportState::Stopped;
        self.transport.position_seconds = 0.0;
        self.queue.clear();
        for track in &mut self.tracks {
            track.unit.reset();
        }
    }

    /// Current transport snapshot.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Current playback position in seconds.
    pub fn position_seconds(&self) -> f64 {
        self.transport.position_seconds
    }

    /// Stage a tempo change; it takes effect at the next `process` call,
    /// never mid-block.
    pub fn set_tempo(&mut self, bpm: f64) -> bool {
        if !bpm.is_finite() || bpm <= 0.0 {
            return false;
        }
        self.pending_tempo = Some(bpm);
        true
    }

    /// Stage a time-signature change for the next `process` call.
    pub fn set_time_signature(&mut self, numerator: u8, denominator: u8) -> bool {
        match TimeSignature::new(numerator, denominator) {
            Some(ts) => {
                self.pending_time_signature = Some(ts);
                true
            }
            None => false,
        }
    }

    // --- Events ---

    /// Schedule an event; false if rejected as stale, malformed, or the
    /// queue is full.
    pub fn schedule_event(&mut self, event: Event) -> bool {
        self.try_schedule(event).is_ok()
    }

    /// Schedule an event with a typed rejection reason.
    pub fn try_schedule(&mut self, event: Event) -> Result<(), ScheduleError> {
        self.queue.schedule(event)
    }

    /// Set the scheduling quantization grid; 0 disables.
    pub fn set_quantization(&mut self, interval_seconds: f64) {
        self.queue.set_quantization(interval_seconds);
    }

    /// Pending event count.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Events dropped because their target track was unknown.
    pub fn dropped_events(&self) -> u64 {
        self.queue.dropped_events()
    }

    // --- Render ---

    /// Render one block into `output`.
    ///
    /// Clears the buffer, applies staged tempo/time-signature changes,
    /// returns silence unless playing, then dispatches due events at their
    /// sample offsets and lets every unit add its contribution. The number
    /// of frames is the buffer's frame count.
    pub fn process(&mut self, output: &mut AudioBuffer) {
        output.silence();

        if let Some(bpm) = self.pending_tempo.take() {
            self.transport.tempo_bpm = bpm;
        }
        if let Some(ts) = self.pending_time_signature.take() {
            self.transport.time_signature = ts;
        }

        if self.transport.state != TransportState::Playing {
            return;
        }

        let frames = output.frames();
        let block_start = self.transport.position_seconds;
        let block_end = block_start + block_duration(frames, self.sample_rate);

        let queue = &mut self.queue;
        let tracks = self.tracks.as_mut_slice();
        rt_guard(|| {
            let mut sink = TrackMapSink { tracks };
            queue.process_events(block_start, block_end, frames, &mut sink);
            for track in sink.tracks.iter_mut() {
                track.unit.process(output);
            }
        });

        self.transport.position_seconds = block_end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_core::{track_id, EventPayload, ParamSpec};

    use crate::error::PrepareError;
    use crate::instrument::{validate_prepare, BlockEvents, InstrumentInfo};

    static PROBE_INFO: InstrumentInfo = InstrumentInfo {
        name: "probe",
        params: &[ParamSpec::normalized(0, "level", 0.5, 0.0)],
    };

    /// Test instrument: writes an impulse at each note-on offset.
    struct Probe {
        params: Arc<ParamBank>,
        pending: BlockEvents,
    }

    impl Probe {
        fn new() -> Self {
            Self {
                params: ParamBank::new(PROBE_INFO.params),
                pending: BlockEvents::new(),
            }
        }
    }

    impl Instrument for Probe {
        fn info(&self) -> &'static InstrumentInfo {
            &PROBE_INFO
        }

        fn params(&self) -> &Arc<ParamBank> {
            &self.params
        }

        fn prepare(&mut self, sample_rate: f64, max_block: usize) -> Result<(), PrepareError> {
            validate_prepare(sample_rate, max_block)
        }

        fn handle_event(&mut self, event: &Event, offset: usize) {
            self.pending.push(offset, event.payload);
        }

        fn process(&mut self, output: &mut AudioBuffer) {
            for i in 0..output.frames() {
                while let Some(payload) = self.pending.pop_at(i) {
                    if matches!(payload, EventPayload::NoteOn { .. }) {
                        output.add(0, i, 1.0);
                    }
                }
            }
            self.pending.clear();
        }

        fn reset(&mut self) {
            self.pending.clear();
        }
    }

    fn engine_with_probe(sample_rate: f64) -> Engine {
        let mut engine = Engine::new(sample_rate).unwrap();
        let mut probe = Probe::new();
        probe.prepare(sample_rate, 512).unwrap();
        engine.register_track(track_id("probe"), Box::new(probe)).unwrap();
        engine
    }

    #[test]
    fn new_rejects_bad_sample_rate() {
        assert!(Engine::new(0.0).is_err());
        assert!(Engine::new(f64::NAN).is_err());
        assert!(Engine::new(48000.0).is_ok());
    }

    #[test]
    fn play_fails_without_tracks() {
        let mut engine = Engine::new(48000.0).unwrap();
        assert!(!engine.play());
        assert_eq!(engine.transport().state, TransportState::Stopped);
    }

    #[test]
    fn duplicate_track_is_rejected() {
        let mut engine = engine_with_probe(48000.0);
        let result = engine.register_track(track_id("probe"), Box::new(Probe::new()));
        assert_eq!(result, Err(EngineError::DuplicateTrack(track_id("probe"))));
    }

    #[test]
    fn transport_state_machine() {
        let mut engine = engine_with_probe(48000.0);

        assert!(engine.play());
        assert_eq!(engine.transport().state, TransportState::Playing);

        assert!(engine.pause());
        assert_eq!(engine.transport().state, TransportState::Paused);
        assert!(!engine.pause());

        assert!(engine.play());
        assert_eq!(engine.transport().state, TransportState::Playing);

        engine.stop();
        assert_eq!(engine.transport().state, TransportState::Stopped);
        assert_eq!(engine.position_seconds(), 0.0);
    }

    #[test]
    fn process_is_silent_when_not_playing() {
        let mut engine = engine_with_probe(48000.0);
        let mut buf = AudioBuffer::new(2, 64);
        buf.channel_mut(0).fill(0.7);

        engine.process(&mut buf);
        assert_eq!(buf.peak(), 0.0);
        assert_eq!(engine.position_seconds(), 0.0);
    }

    #[test]
    fn position_advances_per_block() {
        let mut engine = engine_with_probe(48000.0);
        engine.play();
        let mut buf = AudioBuffer::new(2, 480);
        engine.process(&mut buf);
        assert!((engine.position_seconds() - 0.01).abs() < 1e-12);
        engine.process(&mut buf);
        assert!((engine.position_seconds() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn tempo_applies_at_block_boundary() {
        let mut engine = engine_with_probe(48000.0);
        engine.play();

        assert!(engine.set_tempo(140.0));
        assert_eq!(engine.transport().tempo_bpm, 120.0);

        let mut buf = AudioBuffer::new(2, 64);
        engine.process(&mut buf);
        assert_eq!(engine.transport().tempo_bpm, 140.0);
    }

    #[test]
    fn set_tempo_rejects_nonsense() {
        let mut engine = engine_with_probe(48000.0);
        assert!(!engine.set_tempo(0.0));
        assert!(!engine.set_tempo(-10.0));
        assert!(!engine.set_tempo(f64::NAN));
    }

    #[test]
    fn time_signature_applies_at_block_boundary() {
        let mut engine = engine_with_probe(48000.0);
        engine.play();
        assert!(engine.set_time_signature(7, 8));
        assert!(!engine.set_time_signature(0, 4));

        let mut buf = AudioBuffer::new(2, 64);
        engine.process(&mut buf);
        assert_eq!(engine.transport().time_signature, TimeSignature::new(7, 8).unwrap());
    }

    #[test]
    fn note_lands_at_its_sample_offset() {
        let mut engine = engine_with_probe(48000.0);
        engine.play();
        assert!(engine.schedule_event(Event::new(
            0.001,
            track_id("probe"),
            EventPayload::note_on(60),
        )));

        let mut buf = AudioBuffer::new(2, 96);
        engine.process(&mut buf);

        // 0.001s at 48 kHz = sample 48
        let left = buf.channel(0);
        assert_eq!(left[48], 1.0);
        assert!(left[..48].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn unknown_target_counts_as_dropped() {
        let mut engine = engine_with_probe(48000.0);
        engine.play();
        engine.schedule_event(Event::new(0.0, track_id("ghost"), EventPayload::note_on(60)));

        let mut buf = AudioBuffer::new(2, 64);
        engine.process(&mut buf);
        assert_eq!(engine.dropped_events(), 1);
    }

    #[test]
    fn set_parameter_routes_to_track_bank() {
        let engine = engine_with_probe(48000.0);
        assert!(engine.set_parameter(&track_id("probe"), 0, 0.9));
        assert!(!engine.set_parameter(&track_id("ghost"), 0, 0.9));
        let bank = engine.param_bank(&track_id("probe")).unwrap();
        assert_eq!(bank.get(0), Some(0.9));
    }

    #[test]
    fn stop_resets_units_and_queue() {
        let mut engine = engine_with_probe(48000.0);
        engine.play();
        engine.schedule_event(Event::new(5.0, track_id("probe"), EventPayload::note_on(60)));
        engine.stop();
        assert_eq!(engine.pending_events(), 0);
        // A time before the old position is schedulable again after stop
        assert!(engine.schedule_event(Event::new(0.0, track_id("probe"), EventPayload::note_on(60))));
    }

    #[test]
    fn stale_events_are_reported() {
        let mut engine = engine_with_probe(48000.0);
        engine.play();
        let mut buf = AudioBuffer::new(2, 4800); // 0.1s
        engine.process(&mut buf);

        let stale = Event::new(0.05, track_id("probe"), EventPayload::note_on(60));
        assert_eq!(engine.try_schedule(stale), Err(ScheduleError::Stale));
    }
}
