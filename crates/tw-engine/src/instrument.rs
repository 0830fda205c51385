//! The instrument unit contract.

use alloc::string::String;
use alloc::sync::Arc;

use tw_core::{AudioBuffer, Event, EventPayload, ParamSpec};

use crate::error::PrepareError;
use crate::params::ParamBank;
use crate::preset;

/// Static metadata about an instrument.
pub struct InstrumentInfo {
    /// Stable registry name, also embedded in presets
    pub name: &'static str,
    /// Parameter table
    pub params: &'static [ParamSpec],
}

/// Contract implemented by every instrument unit.
///
/// Lifecycle: construct, `prepare`, then any number of
/// `handle_event`/`process` blocks; `reset` or `prepare` again as needed.
/// `prepare` allocates everything the worst-case block needs; afterwards
/// `handle_event` and `process` are bounded and allocation-free.
///
/// `prepare` and `reset` are control-context operations. The host must not
/// run them concurrently with `process` on the same unit; the engine does
/// not lock internally for this.
pub trait Instrument: Send {
    /// Static name and parameter table.
    fn info(&self) -> &'static InstrumentInfo;

    /// Shared parameter target bank.
    fn params(&self) -> &Arc<ParamBank>;

    /// Allocate for the given sample rate and worst-case block size.
    fn prepare(&mut self, sample_rate: f64, max_block: usize) -> Result<(), PrepareError>;

    /// Queue an event for the current block at its sample offset.
    /// Bounded time, no allocation.
    fn handle_event(&mut self, event: &Event, offset: usize);

    /// Render one block, applying queued events at their offsets and
    /// ADDING into the (possibly shared) output buffer.
    fn process(&mut self, output: &mut AudioBuffer);

    /// Silence all voices and return to initial state without
    /// deallocating buffers.
    fn reset(&mut self);

    /// Thread-safe, allocation-free parameter write; targets the
    /// smoother rather than the live value.
    fn set_parameter(&self, id: u16, value: f32) -> bool {
        self.params().set(id, value)
    }

    /// Read a parameter's current target.
    fn parameter(&self, id: u16) -> Option<f32> {
        self.params().get(id)
    }

    /// Serialize the full parameter set as structured text.
    fn save_preset(&self) -> String {
        preset::save(self.info().name, self.params())
    }

    /// Replace the parameter set from preset text. Malformed input is
    /// rejected with prior state intact, never partially applied.
    fn load_preset(&mut self, text: &str) -> bool {
        preset::load(self.info().name, self.params(), text)
    }
}

/// Validate `prepare` arguments the same way for every instrument.
pub fn validate_prepare(sample_rate: f64, max_block: usize) -> Result<(), PrepareError> {
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        return Err(PrepareError::InvalidSampleRate);
    }
    if max_block == 0 {
        return Err(PrepareError::InvalidBlockSize);
    }
    Ok(())
}

/// Maximum events an instrument holds for one block; later arrivals in the
/// same block are dropped and counted.
pub const MAX_BLOCK_EVENTS: usize = 64;

/// Fixed-capacity queue of payloads waiting for their intra-block offsets.
///
/// `handle_event` pushes in dispatch order (offsets non-decreasing within a
/// block), `process` pops while walking sample indices, then clears.
#[derive(Default)]
pub struct BlockEvents {
    events: heapless::Vec<(u32, EventPayload), MAX_BLOCK_EVENTS>,
    next: usize,
    overflowed: u64,
}

impl BlockEvents {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a payload at a sample offset. Full queues drop and count.
    pub fn push(&mut self, offset: usize, payload: EventPayload) {
        if self.events.push((offset as u32, payload)).is_err() {
            self.overflowed += 1;
        }
    }

    /// Pop the next payload due at or before `frame`, if any.
    pub fn pop_at(&mut self, frame: usize) -> Option<EventPayload> {
        let (offset, payload) = *self.events.get(self.next)?;
        if offset as usize <= frame {
            self.next += 1;
            Some(payload)
        } else {
            None
        }
    }

    /// Number of queued payloads not yet popped.
    pub fn pending(&self) -> usize {
        self.events.len() - self.next
    }

    /// Events dropped because a block carried more than
    /// [`MAX_BLOCK_EVENTS`].
    pub fn overflowed(&self) -> u64 {
        self.overflowed
    }

    /// Drop everything queued (end of block or reset).
    pub fn clear(&mut self) {
        self.events.clear();
        self.next = 0;
    }
}
