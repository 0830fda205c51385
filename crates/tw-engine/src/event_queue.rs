//! Time-ordered queue of scheduled events.
//!
//! Events are kept sorted by time, FIFO-stable for equal timestamps, in a
//! pre-sized buffer. Scheduling uses binary search and never allocates
//! while spare capacity remains; the per-block drain is a cursor walk plus
//! one memmove, so the render path stays allocation-free.

use alloc::vec::Vec;

use tw_core::{sample_offset, Event};

use crate::error::{PrepareError, ScheduleError};

/// Default pre-sized capacity of pending events.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Sentinel returned by [`EventQueue::next_event_time`] when empty.
pub const NO_EVENT: f64 = -1.0;

/// Receiver for dispatched events (the engine's track map).
pub trait EventSink {
    /// Deliver an event at its intra-block sample offset.
    /// Returns false if the target is unknown.
    fn dispatch(&mut self, event: &Event, offset: usize) -> bool;
}

/// A time-ordered buffer of pending musical events.
pub struct EventQueue {
    events: Vec<Event>,
    sample_rate: f64,
    /// Times strictly before this point have been consumed.
    consumed_until: f64,
    /// Quantization grid in seconds; <= 0 disables.
    quantize: f64,
    /// Events dropped at dispatch because their target was unknown.
    dropped: u64,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    /// Create a queue with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a queue holding at most `capacity` pending events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            sample_rate: 0.0,
            consumed_until: 0.0,
            quantize: 0.0,
            dropped: 0,
        }
    }

    /// Reset the queue for a new run at the given sample rate.
    ///
    /// Fails only for a non-positive or non-finite rate. Capacity is kept.
    pub fn initialize(&mut self, sample_rate: f64) -> Result<(), PrepareError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(PrepareError::InvalidSampleRate);
        }
        self.sample_rate = sample_rate;
        self.events.clear();
        self.consumed_until = 0.0;
        self.dropped = 0;
        Ok(())
    }

    /// Set the scheduling quantization grid; 0 (or less) disables it.
    pub fn set_quantization(&mut self, interval_seconds: f64) {
        self.quantize = if interval_seconds.is_finite() && interval_seconds > 0.0 {
            interval_seconds
        } else {
            0.0
        };
    }

    /// Current quantization grid (0 when disabled).
    pub fn quantization(&self) -> f64 {
        self.quantize
    }

    /// Snap a time to the nearest grid boundary at or after it.
    fn quantized(&self, time: f64) -> f64 {
        if self.quantize > 0.0 {
            // Epsilon guards against a boundary value rounding up a slot
            libm::ceil(time / self.quantize - 1e-9) * self.quantize
        } else {
            time
        }
    }

    /// Insert an event in time order, applying quantization.
    ///
    /// Rejects malformed events, events before the consumption point, and
    /// inserts that would grow past the pre-sized capacity. Equal-time
    /// events keep insertion order (FIFO), so a parameter change scheduled
    /// before a note-on at the same instant is applied first.
    pub fn schedule(&mut self, mut event: Event) -> Result<(), ScheduleError> {
        if !event.is_well_formed() {
            return Err(ScheduleError::Malformed);
        }
        event.time = self.quantized(event.time);
        if event.time < self.consumed_until {
            return Err(ScheduleError::Stale);
        }
        if self.events.len() == self.events.capacity() {
            return Err(ScheduleError::Full);
        }
        let pos = self.events.partition_point(|e| e.time <= event.time);
        self.events.insert(pos, event);
        Ok(())
    }

    /// Dispatch every event with `time < block_end` in order, computing
    /// each event's sample offset within the current block.
    ///
    /// Events whose target is unknown are dropped and counted, never an
    /// error. Consumed events are removed; the consumption point advances
    /// to `block_end`.
    pub fn process_events(
        &mut self,
        block_start: f64,
        block_end: f64,
        frames: usize,
        sink: &mut dyn EventSink,
    ) {
        let due = self.events.partition_point(|e| e.time < block_end);
        for i in 0..due {
            let event = self.events[i];
            let offset = sample_offset(event.time, block_start, self.sample_rate, frames);
            if !sink.dispatch(&event, offset) {
                self.dropped += 1;
            }
        }
        self.events.drain(..due);
        if block_end > self.consumed_until {
            self.consumed_until = block_end;
        }
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if no events are pending.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Time of the next pending event, or [`NO_EVENT`] when empty.
    pub fn next_event_time(&self) -> f64 {
        self.events.first().map_or(NO_EVENT, |e| e.time)
    }

    /// Drop all pending events and rewind the consumption point.
    pub fn clear(&mut self) {
        self.events.clear();
        self.consumed_until = 0.0;
        self.dropped = 0;
    }

    /// Events dropped at dispatch because their target was unknown.
    pub fn dropped_events(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use tw_core::{track_id, EventPayload};

    /// Sink that records dispatches and knows a fixed set of targets.
    struct RecordingSink {
        known: Vec<&'static str>,
        seen: Vec<(Event, usize)>,
    }

    impl RecordingSink {
        fn knowing(targets: &[&'static str]) -> Self {
            Self { known: targets.to_vec(), seen: Vec::new() }
        }
    }

    impl EventSink for RecordingSink {
        fn dispatch(&mut self, event: &Event, offset: usize) -> bool {
            if !self.known.iter().any(|k| *k == &event.target[..]) {
                return false;
            }
            self.seen.push((*event, offset));
            true
        }
    }

    fn queue_at(sample_rate: f64) -> EventQueue {
        let mut q = EventQueue::new();
        q.initialize(sample_rate).unwrap();
        q
    }

    fn note_on(time: f64, target: &str, note: u8) -> Event {
        Event::new(time, track_id(target), EventPayload::note_on(note))
    }

    #[test]
    fn initialize_rejects_bad_sample_rate() {
        let mut q = EventQueue::new();
        assert_eq!(q.initialize(0.0), Err(PrepareError::InvalidSampleRate));
        assert_eq!(q.initialize(-44100.0), Err(PrepareError::InvalidSampleRate));
        assert_eq!(q.initialize(f64::NAN), Err(PrepareError::InvalidSampleRate));
        assert!(q.initialize(48000.0).is_ok());
    }

    #[test]
    fn events_dispatch_in_time_order() {
        let mut q = queue_at(48000.0);
        q.schedule(note_on(0.3, "a", 62)).unwrap();
        q.schedule(note_on(0.1, "a", 60)).unwrap();
        q.schedule(note_on(0.2, "a", 61)).unwrap();

        let mut sink = RecordingSink::knowing(&["a"]);
        q.process_events(0.0, 1.0, 48000, &mut sink);

        let notes: Vec<u8> = sink
            .seen
            .iter()
            .map(|(e, _)| match e.payload {
                EventPayload::NoteOn { note, .. } => note,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(notes, vec![60, 61, 62]);
        assert!(q.is_empty());
    }

    #[test]
    fn equal_times_keep_insertion_order() {
        let mut q = queue_at(48000.0);
        let target = track_id("a");
        q.schedule(Event::new(
            0.5,
            target,
            EventPayload::ParamChange { param: 1, value: 0.7 },
        ))
        .unwrap();
        q.schedule(Event::new(0.5, target, EventPayload::note_on(60))).unwrap();

        let mut sink = RecordingSink::knowing(&["a"]);
        q.process_events(0.0, 0.6, 28800, &mut sink);

        assert_eq!(sink.seen.len(), 2);
        assert!(matches!(sink.seen[0].0.payload, EventPayload::ParamChange { .. }));
        assert!(matches!(sink.seen[1].0.payload, EventPayload::NoteOn { .. }));
        // Both land at the same sample offset
        assert_eq!(sink.seen[0].1, 24000);
        assert_eq!(sink.seen[1].1, 24000);
    }

    #[test]
    fn sample_offsets_are_block_relative() {
        let mut q = queue_at(48000.0);
        q.schedule(note_on(0.505, "a", 60)).unwrap();

        let mut sink = RecordingSink::knowing(&["a"]);
        q.process_events(0.5, 0.51, 480, &mut sink);
        assert_eq!(sink.seen[0].1, 240);
    }

    #[test]
    fn only_events_before_block_end_dispatch() {
        let mut q = queue_at(48000.0);
        q.schedule(note_on(0.1, "a", 60)).unwrap();
        q.schedule(note_on(0.2, "a", 61)).unwrap();

        let mut sink = RecordingSink::knowing(&["a"]);
        q.process_events(0.0, 0.2, 9600, &mut sink);
        assert_eq!(sink.seen.len(), 1);
        assert_eq!(q.len(), 1);
        assert_eq!(q.next_event_time(), 0.2);
    }

    #[test]
    fn stale_events_are_rejected() {
        let mut q = queue_at(48000.0);
        let mut sink = RecordingSink::knowing(&["a"]);
        q.process_events(0.0, 0.5, 24000, &mut sink);

        assert_eq!(q.schedule(note_on(0.25, "a", 60)), Err(ScheduleError::Stale));
        assert!(q.schedule(note_on(0.5, "a", 60)).is_ok());
    }

    #[test]
    fn malformed_events_are_rejected() {
        let mut q = queue_at(48000.0);
        assert_eq!(
            q.schedule(note_on(f64::NAN, "a", 60)),
            Err(ScheduleError::Malformed)
        );
        assert_eq!(q.schedule(note_on(0.0, "a", 200)), Err(ScheduleError::Malformed));
    }

    #[test]
    fn full_queue_reports_instead_of_growing() {
        let mut q = EventQueue::with_capacity(2);
        q.initialize(48000.0).unwrap();
        q.schedule(note_on(0.1, "a", 60)).unwrap();
        q.schedule(note_on(0.2, "a", 61)).unwrap();
        assert_eq!(q.schedule(note_on(0.3, "a", 62)), Err(ScheduleError::Full));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn unknown_targets_are_dropped_and_counted() {
        let mut q = queue_at(48000.0);
        q.schedule(note_on(0.1, "ghost", 60)).unwrap();
        q.schedule(note_on(0.2, "a", 61)).unwrap();

        let mut sink = RecordingSink::knowing(&["a"]);
        q.process_events(0.0, 1.0, 48000, &mut sink);
        assert_eq!(sink.seen.len(), 1);
        assert_eq!(q.dropped_events(), 1);
    }

    #[test]
    fn next_event_time_sentinel_when_empty() {
        let q = queue_at(48000.0);
        assert_eq!(q.next_event_time(), NO_EVENT);
    }

    #[test]
    fn quantization_snaps_at_or_after() {
        let mut q = queue_at(48000.0);
        q.set_quantization(0.25);
        q.schedule(note_on(0.3, "a", 60)).unwrap();
        assert_eq!(q.next_event_time(), 0.5);

        // Exactly on a boundary stays put
        q.schedule(note_on(0.25, "a", 61)).unwrap();
        assert_eq!(q.next_event_time(), 0.25);
    }

    #[test]
    fn quantization_is_idempotent() {
        let mut q = queue_at(48000.0);
        q.set_quantization(0.1);
        q.schedule(note_on(0.34, "a", 60)).unwrap();
        q.schedule(note_on(0.34, "a", 61)).unwrap();
        let t0 = q.next_event_time();
        let mut sink = RecordingSink::knowing(&["a"]);
        q.process_events(0.0, 1.0, 48000, &mut sink);
        assert_eq!(sink.seen[0].0.time, t0);
        assert_eq!(sink.seen[1].0.time, t0);
    }

    #[test]
    fn zero_quantization_disables() {
        let mut q = queue_at(48000.0);
        q.set_quantization(0.25);
        q.set_quantization(0.0);
        q.schedule(note_on(0.3, "a", 60)).unwrap();
        assert_eq!(q.next_event_time(), 0.3);
    }

    #[test]
    fn clear_resets_events_and_consumption() {
        let mut q = queue_at(48000.0);
        q.schedule(note_on(0.1, "a", 60)).unwrap();
        let mut sink = RecordingSink::knowing(&["a"]);
        q.process_events(0.0, 1.0, 48000, &mut sink);

        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.dropped_events(), 0);
        // Times before the old consumption point are schedulable again
        assert!(q.schedule(note_on(0.1, "a", 60)).is_ok());
    }
}
