//! Instrument factory registry.
//!
//! Hosts own a registry instance and pass it where instruments are built;
//! its lifetime is tied to the host, not the process, so there are no
//! global factory tables.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::instrument::Instrument;
use crate::instruments::{FmSynth, Pluck, Sampler, Subtractive};

/// Constructor for one instrument kind.
pub type InstrumentCtor = fn() -> Box<dyn Instrument>;

/// Maps stable instrument names to constructors.
#[derive(Clone)]
pub struct InstrumentRegistry {
    entries: Vec<(&'static str, InstrumentCtor)>,
}

impl InstrumentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Create a registry with all built-in instruments.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("subtractive", || Box::new(Subtractive::new()));
        registry.register("fm", || Box::new(FmSynth::new()));
        registry.register("sampler", || Box::new(Sampler::new()));
        registry.register("pluck", || Box::new(Pluck::new()));
        registry
    }

    /// Register a constructor, replacing any existing entry for the name.
    pub fn register(&mut self, name: &'static str, ctor: InstrumentCtor) {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = ctor,
            None => self.entries.push((name, ctor)),
        }
    }

    /// Construct an instrument by name.
    pub fn create(&self, name: &str) -> Option<Box<dyn Instrument>> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, ctor)| ctor())
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(n, _)| *n)
    }

    /// Number of registered instrument kinds.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InstrumentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
