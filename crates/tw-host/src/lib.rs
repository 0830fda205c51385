//! Headless host for the tonewheel engine.
//!
//! Owns the instrument registry and a song model, builds and prepares
//! engine instances from them, and manages live playback: the engine runs
//! on a dedicated audio thread, control commands cross on a bounded
//! lock-free message ring, and the playback position is reported back
//! through an atomic.

mod wav;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use tw_audio::{AudioOutput, CpalOutput};
use tw_core::{AudioBuffer, Event, Song, TrackId, BLOCK_SIZE};
use tw_engine::{Engine, EngineError, Frame, InstrumentRegistry, PrepareError};

// Re-export common types so callers don't need tw-core/tw-engine directly.
pub use tw_core::{track_id, EventPayload, TimeSignature, TrackSpec};
pub use tw_engine::Instrument;
pub use wav::{frames_to_wav, write_wav};

/// Extra seconds rendered past the last event so releases ring out.
const RELEASE_TAIL_SECONDS: f64 = 2.0;

/// Capacity of the control→audio message ring.
const CONTROL_RING_CAPACITY: usize = 256;

/// Host-level error type.
#[derive(Debug)]
pub enum HostError {
    /// A track names an instrument the registry doesn't know
    UnknownInstrument(String),
    /// Instrument rejected its configuration
    Prepare(PrepareError),
    /// Engine rejected the configuration
    Engine(EngineError),
}

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostError::UnknownInstrument(name) => write!(f, "unknown instrument: {}", name),
            HostError::Prepare(e) => write!(f, "prepare failed: {}", e),
            HostError::Engine(e) => write!(f, "engine error: {}", e),
        }
    }
}

impl std::error::Error for HostError {}

/// Commands crossing from control threads to the audio thread.
enum ControlMsg {
    Play,
    Pause,
    SetTempo(f64),
    SetTimeSignature(u8, u8),
    Schedule(Event),
    SetParam { track: TrackId, param: u16, value: f32 },
}

struct PlaybackHandle {
    msgs: HeapProd<ControlMsg>,
    stop_signal: Arc<AtomicBool>,
    position_bits: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// Headless controller — owns a registry and a song, manages playback.
pub struct Host {
    registry: InstrumentRegistry,
    song: Song,
    playback: Option<PlaybackHandle>,
}

impl Host {
    /// Create a host with the built-in instrument registry.
    pub fn new() -> Self {
        Self::with_registry(InstrumentRegistry::with_builtins())
    }

    /// Create a host with a custom registry.
    pub fn with_registry(registry: InstrumentRegistry) -> Self {
        Self {
            registry,
            song: Song::new("Untitled"),
            playback: None,
        }
    }

    // --- Song management ---

    /// The loaded song.
    pub fn song(&self) -> &Song {
        &self.song
    }

    /// The instrument registry.
    pub fn registry(&self) -> &InstrumentRegistry {
        &self.registry
    }

    /// Mutable registry access (stopped hosts only make sense here).
    pub fn registry_mut(&mut self) -> &mut InstrumentRegistry {
        &mut self.registry
    }

    /// Load a song, validating that every track's instrument exists.
    pub fn load_song(&mut self, song: Song) -> Result<(), HostError> {
        self.stop();
        for track in &song.tracks {
            if self.registry.create(&track.instrument).is_none() {
                return Err(HostError::UnknownInstrument(track.instrument.to_string()));
            }
        }
        self.song = song;
        Ok(())
    }

    /// Build a prepared engine for the current song at the given rate:
    /// instruments constructed, prepared, initial params applied, tracks
    /// registered, and all song events scheduled.
    pub fn build_engine(&self, sample_rate: f64, max_block: usize) -> Result<Engine, HostError> {
        build_engine(&self.registry, &self.song, sample_rate, max_block)
    }

    // --- Real-time playback ---

    /// Start live playback on a new audio thread.
    pub fn play(&mut self) {
        self.stop();

        let registry = self.registry.clone();
        let song = self.song.clone();
        let stop_signal = Arc::new(AtomicBool::new(false));
        let position_bits = Arc::new(AtomicU64::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let rb = HeapRb::<ControlMsg>::new(CONTROL_RING_CAPACITY);
        let (producer, consumer) = rb.split();

        let stop = stop_signal.clone();
        let pos = position_bits.clone();
        let done = finished.clone();

        let thread = std::thread::spawn(move || {
            audio_thread(registry, song, consumer, stop, pos, done);
        });

        self.playback = Some(PlaybackHandle {
            msgs: producer,
            stop_signal,
            position_bits,
            finished,
            thread: Some(thread),
        });
    }

    /// Stop playback and join the audio thread.
    pub fn stop(&mut self) {
        if let Some(mut pb) = self.playback.take() {
            pb.stop_signal.store(true, Ordering::Relaxed);
            if let Some(handle) = pb.thread.take() {
                let _ = handle.join();
            }
        }
    }

    /// Pause the transport; the audio thread keeps running silence.
    pub fn pause(&mut self) -> bool {
        self.send(ControlMsg::Pause)
    }

    /// Resume a paused transport.
    pub fn resume(&mut self) -> bool {
        self.send(ControlMsg::Play)
    }

    /// Stage a tempo change for the next block.
    pub fn set_tempo(&mut self, bpm: f64) -> bool {
        if !bpm.is_finite() || bpm <= 0.0 {
            return false;
        }
        self.send(ControlMsg::SetTempo(bpm))
    }

    /// Stage a time-signature change for the next block.
    pub fn set_time_signature(&mut self, numerator: u8, denominator: u8) -> bool {
        if numerator == 0 || denominator == 0 {
            return false;
        }
        self.send(ControlMsg::SetTimeSignature(numerator, denominator))
    }

    /// Schedule an event: forwarded live while playing, appended to the
    /// song otherwise. False if rejected as malformed (or the control
    /// ring is full).
    pub fn schedule_event(&mut self, event: Event) -> bool {
        if !event.is_well_formed() {
            return false;
        }
        if self.playback.is_some() {
            self.send(ControlMsg::Schedule(event))
        } else {
            self.song.push_event(event);
            true
        }
    }

    /// Write a parameter target on a live track.
    pub fn set_parameter(&mut self, track: TrackId, param: u16, value: f32) -> bool {
        if !value.is_finite() {
            return false;
        }
        self.send(ControlMsg::SetParam { track, param, value })
    }

    /// Whether the audio thread is still producing sound.
    pub fn is_playing(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| !p.finished.load(Ordering::Relaxed))
    }

    /// Whether playback ran to the end of the song.
    pub fn is_finished(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| p.finished.load(Ordering::Relaxed))
    }

    /// Current playback position, when playing.
    pub fn position_seconds(&self) -> Option<f64> {
        let pb = self.playback.as_ref()?;
        if pb.finished.load(Ordering::Relaxed) {
            return None;
        }
        Some(f64::from_bits(pb.position_bits.load(Ordering::Relaxed)))
    }

    fn send(&mut self, msg: ControlMsg) -> bool {
        match self.playback.as_mut() {
            Some(pb) => pb.msgs.try_push(msg).is_ok(),
            None => false,
        }
    }

    // --- Offline rendering ---

    /// Render the song to stereo frames, stopping at the song end (plus a
    /// release tail) or `max_frames`, whichever comes first.
    pub fn render_frames(&self, sample_rate: u32, max_frames: usize) -> Result<Vec<Frame>, HostError> {
        let mut engine = self.build_engine(sample_rate as f64, BLOCK_SIZE)?;
        if !engine.play() {
            return Ok(Vec::new());
        }

        let end_time = self.song.total_time() + RELEASE_TAIL_SECONDS;
        let mut frames = Vec::with_capacity(max_frames);
        let mut buf = AudioBuffer::new(2, BLOCK_SIZE);

        while frames.len() < max_frames && engine.position_seconds() < end_time {
            engine.process(&mut buf);
            let take = BLOCK_SIZE.min(max_frames - frames.len());
            for i in 0..take {
                frames.push(Frame {
                    left: buf.channel(0)[i],
                    right: buf.channel(1)[i],
                });
            }
        }
        Ok(frames)
    }

    /// Render the song to a WAV byte vector.
    pub fn render_to_wav(&self, sample_rate: u32, max_seconds: u32) -> Result<Vec<u8>, HostError> {
        let max_frames = (sample_rate * max_seconds) as usize;
        let frames = self.render_frames(sample_rate, max_frames)?;
        Ok(wav::frames_to_wav(&frames, sample_rate))
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

/// Construct, prepare, and register every track of a song.
fn build_engine(
    registry: &InstrumentRegistry,
    song: &Song,
    sample_rate: f64,
    max_block: usize,
) -> Result<Engine, HostError> {
    let mut engine = Engine::new(sample_rate).map_err(HostError::Engine)?;
    engine.set_tempo(song.tempo_bpm);
    engine.set_time_signature(song.time_signature.numerator, song.time_signature.denominator);

    for track in &song.tracks {
        let mut unit = registry
            .create(&track.instrument)
            .ok_or_else(|| HostError::UnknownInstrument(track.instrument.to_string()))?;
        unit.prepare(sample_rate, max_block).map_err(HostError::Prepare)?;
        for (name, value) in &track.params {
            unit.params().set_by_name(name, *value);
        }
        engine.register_track(track.id, unit).map_err(HostError::Engine)?;
    }

    for event in &song.events {
        // Stale or malformed song events are skipped, not fatal
        let _ = engine.schedule_event(*event);
    }
    Ok(engine)
}

fn apply_msg(engine: &mut Engine, msg: ControlMsg) {
    match msg {
        ControlMsg::Play => {
            engine.play();
        }
        ControlMsg::Pause => {
            engine.pause();
        }
        ControlMsg::SetTempo(bpm) => {
            engine.set_tempo(bpm);
        }
        ControlMsg::SetTimeSignature(num, den) => {
            engine.set_time_signature(num, den);
        }
        ControlMsg::Schedule(event) => {
            engine.schedule_event(event);
        }
        ControlMsg::SetParam { track, param, value } => {
            engine.set_parameter(&track, param, value);
        }
    }
}

fn audio_thread(
    registry: InstrumentRegistry,
    song: Song,
    mut msgs: HeapCons<ControlMsg>,
    stop_signal: Arc<AtomicBool>,
    position_bits: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
) {
    let Ok((mut output, consumer)) = CpalOutput::new() else {
        finished.store(true, Ordering::Relaxed);
        return;
    };

    let sample_rate = output.sample_rate();
    let end_time = song.total_time() + RELEASE_TAIL_SECONDS;
    let Ok(mut engine) = build_engine(&registry, &song, sample_rate as f64, BLOCK_SIZE) else {
        finished.store(true, Ordering::Relaxed);
        return;
    };

    if output.build_stream(consumer).is_err() {
        finished.store(true, Ordering::Relaxed);
        return;
    }
    let _ = output.start();
    if !engine.play() {
        // Nothing to play (no tracks)
        finished.store(true, Ordering::Relaxed);
        return;
    }

    let mut buf = AudioBuffer::new(2, BLOCK_SIZE);
    while !stop_signal.load(Ordering::Relaxed) && engine.position_seconds() < end_time {
        while let Some(msg) = msgs.try_pop() {
            apply_msg(&mut engine, msg);
        }

        engine.process(&mut buf);
        for i in 0..BLOCK_SIZE {
            output.write_spin(Frame {
                left: buf.channel(0)[i],
                right: buf.channel(1)[i],
            });
        }
        position_bits.store(engine.position_seconds().to_bits(), Ordering::Relaxed);
    }

    // Drain the device buffer with silence so playback doesn't cut off
    for _ in 0..sample_rate {
        output.write_spin(Frame::silence());
    }

    finished.store(true, Ordering::Relaxed);
}
