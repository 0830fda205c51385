//! Voice slot allocation and lifecycle bookkeeping.
//!
//! The pool tracks which note each slot is sounding and how old it is; the
//! owning instrument keeps the matching DSP state in a parallel array. The
//! pool owns no DSP state and never allocates after construction.

use alloc::vec;
use alloc::vec::Vec;

/// Lifecycle stage of a pooled voice slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VoiceStage {
    /// Free for allocation
    #[default]
    Idle,
    /// Sounding, gate held
    Active,
    /// Note-off received; envelope releasing
    Releasing,
}

/// What to do when a note arrives and every slot is busy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StealPolicy {
    /// Steal the oldest releasing voice, else the oldest voice overall
    #[default]
    StealOldest,
    /// Drop the incoming note (declared per-instrument behavior)
    DropNew,
}

/// Outcome of a note-on request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteStart {
    /// A free slot was claimed
    Fresh(usize),
    /// An older voice was stolen; the instrument should retrigger it
    /// from its current envelope level
    Stolen(usize),
    /// Pool exhausted under `DropNew`
    Dropped,
}

/// Bookkeeping state for one voice slot.
#[derive(Clone, Copy, Debug, Default)]
pub struct VoiceSlot {
    pub note: u8,
    pub velocity: f32,
    pub stage: VoiceStage,
    age: u64,
}

/// Fixed-capacity voice pool with a deterministic stealing policy.
pub struct VoicePool {
    slots: Vec<VoiceSlot>,
    clock: u64,
    policy: StealPolicy,
}

impl VoicePool {
    /// Create a pool with `capacity` slots (minimum one).
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![VoiceSlot::default(); capacity.max(1)],
            clock: 0,
            policy: StealPolicy::default(),
        }
    }

    /// Change the stealing policy.
    pub fn set_policy(&mut self, policy: StealPolicy) {
        self.policy = policy;
    }

    /// Current stealing policy.
    pub fn policy(&self) -> StealPolicy {
        self.policy
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of non-idle slots.
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.stage != VoiceStage::Idle).count()
    }

    /// Read a slot's bookkeeping state.
    pub fn slot(&self, index: usize) -> &VoiceSlot {
        &self.slots[index]
    }

    /// Whether a slot is sounding (active or releasing).
    pub fn is_sounding(&self, index: usize) -> bool {
        self.slots[index].stage != VoiceStage::Idle
    }

    /// Claim a slot for a note. Free slots first; otherwise the policy
    /// decides between stealing and dropping.
    pub fn note_on(&mut self, note: u8, velocity: f32) -> NoteStart {
        if let Some(index) = self.slots.iter().position(|s| s.stage == VoiceStage::Idle) {
            self.claim(index, note, velocity);
            return NoteStart::Fresh(index);
        }
        match self.policy {
            StealPolicy::DropNew => NoteStart::Dropped,
            StealPolicy::StealOldest => {
                let index = self.steal_candidate();
                self.claim(index, note, velocity);
                NoteStart::Stolen(index)
            }
        }
    }

    /// Release the oldest active voice playing `note`, returning its slot.
    pub fn note_off(&mut self, note: u8) -> Option<usize> {
        let index = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.stage == VoiceStage::Active && s.note == note)
            .min_by_key(|(_, s)| s.age)
            .map(|(i, _)| i)?;
        self.slots[index].stage = VoiceStage::Releasing;
        Some(index)
    }

    /// Release every active voice.
    pub fn release_all(&mut self) {
        for slot in &mut self.slots {
            if slot.stage == VoiceStage::Active {
                slot.stage = VoiceStage::Releasing;
            }
        }
    }

    /// Return a slot to the free list (envelope reached silence).
    pub fn free(&mut self, index: usize) {
        self.slots[index].stage = VoiceStage::Idle;
    }

    /// Free all slots and restart the age clock.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = VoiceSlot::default();
        }
        self.clock = 0;
    }

    fn claim(&mut self, index: usize, note: u8, velocity: f32) {
        self.clock += 1;
        self.slots[index] = VoiceSlot {
            note,
            velocity,
            stage: VoiceStage::Active,
            age: self.clock,
        };
    }

    /// Oldest releasing slot, else oldest overall. The incoming note is not
    /// yet in the pool, so the most recently triggered voice is only chosen
    /// when the pool has a single slot.
    fn steal_candidate(&self) -> usize {
        let releasing = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.stage == VoiceStage::Releasing)
            .min_by_key(|(_, s)| s.age)
            .map(|(i, _)| i);
        releasing.unwrap_or_else(|| {
            self.slots
                .iter()
                .enumerate()
                .min_by_key(|(_, s)| s.age)
                .map(|(i, _)| i)
                .unwrap_or(0)
        })
    }
}
