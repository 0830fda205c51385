//! Musical event types for the event-driven engine.

use arrayvec::ArrayString;

/// Stable identifier of a track (and its instrument unit).
///
/// Fixed capacity so events can cross thread boundaries without heap
/// allocation; longer names are truncated at construction.
pub type TrackId = ArrayString<24>;

/// Build a [`TrackId`] from a string, truncating past capacity.
pub fn track_id(name: &str) -> TrackId {
    let mut id = TrackId::new();
    for ch in name.chars() {
        if id.try_push(ch).is_err() {
            break;
        }
    }
    id
}

/// A scheduled event on the timeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Event {
    /// Absolute time in seconds from transport zero
    pub time: f64,
    /// Which track's instrument receives the event
    pub target: TrackId,
    /// What the event does
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event.
    pub fn new(time: f64, target: TrackId, payload: EventPayload) -> Self {
        Self {
            time,
            target,
            payload,
        }
    }

    /// Whether this event carries only finite, in-range values.
    ///
    /// Malformed events are rejected at scheduling time, never dispatched.
    pub fn is_well_formed(&self) -> bool {
        if !self.time.is_finite() || self.target.is_empty() {
            return false;
        }
        match self.payload {
            EventPayload::NoteOn { note, velocity } => {
                note <= 127 && velocity.is_finite() && (0.0..=1.0).contains(&velocity)
            }
            EventPayload::NoteOff { note } => note <= 127,
            EventPayload::ParamChange { value, .. } => value.is_finite(),
        }
    }
}

/// What an event does.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EventPayload {
    /// Trigger a note
    NoteOn { note: u8, velocity: f32 },
    /// Release a note
    NoteOff { note: u8 },
    /// Move a parameter's smoothing target
    ParamChange { param: u16, value: f32 },
}

impl EventPayload {
    /// Create a note-on event with full velocity.
    pub fn note_on(note: u8) -> Self {
        Self::NoteOn {
            note,
            velocity: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_id_truncates() {
        let id = track_id("a-very-long-track-name-that-overflows");
        assert_eq!(id.len(), 24);
    }

    #[test]
    fn note_on_helper_has_full_velocity() {
        assert_eq!(
            EventPayload::note_on(60),
            EventPayload::NoteOn { note: 60, velocity: 1.0 }
        );
    }

    #[test]
    fn well_formed_note_on() {
        let e = Event::new(0.5, track_id("lead"), EventPayload::note_on(60));
        assert!(e.is_well_formed());
    }

    #[test]
    fn rejects_non_finite_time() {
        let e = Event::new(f64::NAN, track_id("lead"), EventPayload::note_on(60));
        assert!(!e.is_well_formed());
    }

    #[test]
    fn rejects_out_of_range_note() {
        let e = Event::new(0.0, track_id("lead"), EventPayload::note_on(128));
        assert!(!e.is_well_formed());
    }

    #[test]
    fn rejects_out_of_range_velocity() {
        let e = Event::new(
            0.0,
            track_id("lead"),
            EventPayload::NoteOn { note: 60, velocity: 1.5 },
        );
        assert!(!e.is_well_formed());
    }

    #[test]
    fn rejects_non_finite_param_value() {
        let e = Event::new(
            0.0,
            track_id("lead"),
            EventPayload::ParamChange { param: 0, value: f32::INFINITY },
        );
        assert!(!e.is_well_formed());
    }

    #[test]
    fn rejects_empty_target() {
        let e = Event::new(0.0, TrackId::new(), EventPayload::note_on(60));
        assert!(!e.is_well_formed());
    }
}
