//! Lock-free parameter target bank.
//!
//! One `AtomicU32` cell per parameter holds the f32 bit pattern of the most
//! recent target value. Control threads write through a shared `Arc` while
//! the render thread folds targets into its smoothers at block start, so no
//! lock is ever taken on either side. Concurrent writers race as
//! last-write-wins; non-finite values are rejected at the writer so the
//! render side only ever observes finite targets.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use tw_core::ParamSpec;

/// Shared bank of parameter targets for one instrument unit.
pub struct ParamBank {
    specs: &'static [ParamSpec],
    values: Vec<AtomicU32>,
}

impl ParamBank {
    /// Create a bank initialized to each parameter's default.
    pub fn new(specs: &'static [ParamSpec]) -> Arc<Self> {
        let values = specs
            .iter()
            .map(|s| AtomicU32::new(s.default.to_bits()))
            .collect();
        Arc::new(Self { specs, values })
    }

    /// The static parameter table this bank was built from.
    pub fn specs(&self) -> &'static [ParamSpec] {
        self.specs
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns true if the instrument exposes no parameters.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    fn index_of(&self, id: u16) -> Option<usize> {
        self.specs.iter().position(|s| s.id == id)
    }

    /// Write a target value. Unknown ids and non-finite values are
    /// rejected; out-of-range values are clamped.
    pub fn set(&self, id: u16, value: f32) -> bool {
        if !value.is_finite() {
            return false;
        }
        let Some(index) = self.index_of(id) else {
            return false;
        };
        let clamped = self.specs[index].clamp(value);
        self.values[index].store(clamped.to_bits(), Ordering::Relaxed);
        true
    }

    /// Read a target value by id.
    pub fn get(&self, id: u16) -> Option<f32> {
        let index = self.index_of(id)?;
        Some(f32::from_bits(self.values[index].load(Ordering::Relaxed)))
    }

    /// Write a target by parameter name (host/preset convenience).
    pub fn set_by_name(&self, name: &str, value: f32) -> bool {
        match self.specs.iter().find(|s| s.name == name) {
            Some(spec) => self.set(spec.id, value),
            None => false,
        }
    }

    /// Read a target value at a table index (render-side fast path).
    pub fn value_at(&self, index: usize) -> f32 {
        f32::from_bits(self.values[index].load(Ordering::Relaxed))
    }

    /// Restore every parameter to its default.
    pub fn reset_defaults(&self) {
        for (spec, cell) in self.specs.iter().zip(&self.values) {
            cell.store(spec.default.to_bits(), Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SPECS: &[ParamSpec] = &[
        ParamSpec::normalized(0, "gain", 0.8, 10.0),
        ParamSpec::normalized(1, "cutoff", 0.5, 10.0),
    ];

    #[test]
    fn starts_at_defaults() {
        let bank = ParamBank::new(SPECS);
        assert_eq!(bank.get(0), Some(0.8));
        assert_eq!(bank.get(1), Some(0.5));
    }

    #[test]
    fn set_and_get() {
        let bank = ParamBank::new(SPECS);
        assert!(bank.set(1, 0.25));
        assert_eq!(bank.get(1), Some(0.25));
    }

    #[test]
    fn set_clamps_out_of_range() {
        let bank = ParamBank::new(SPECS);
        assert!(bank.set(0, 2.0));
        assert_eq!(bank.get(0), Some(1.0));
        assert!(bank.set(0, -1.0));
        assert_eq!(bank.get(0), Some(0.0));
    }

    #[test]
    fn rejects_non_finite() {
        let bank = ParamBank::new(SPECS);
        assert!(!bank.set(0, f32::NAN));
        assert!(!bank.set(0, f32::NEG_INFINITY));
        assert_eq!(bank.get(0), Some(0.8));
    }

    #[test]
    fn rejects_unknown_id() {
        let bank = ParamBank::new(SPECS);
        assert!(!bank.set(99, 0.5));
        assert_eq!(bank.get(99), None);
    }

    #[test]
    fn set_by_name_resolves_spec() {
        let bank = ParamBank::new(SPECS);
        assert!(bank.set_by_name("cutoff", 0.9));
        assert_eq!(bank.get(1), Some(0.9));
        assert!(!bank.set_by_name("resonance", 0.5));
    }

    #[test]
    fn reset_defaults_restores_all() {
        let bank = ParamBank::new(SPECS);
        bank.set(0, 0.1);
        bank.set(1, 0.1);
        bank.reset_defaults();
        assert_eq!(bank.get(0), Some(0.8));
        assert_eq!(bank.get(1), Some(0.5));
    }

    #[test]
    fn shared_across_threads() {
        let bank = ParamBank::new(SPECS);
        let writer = Arc::clone(&bank);
        let handle = std::thread::spawn(move || {
            for i in 0..100 {
                writer.set(0, i as f32 / 100.0);
            }
        });
        for _ in 0..100 {
            let v = bank.value_at(0);
            assert!(v.is_finite());
            assert!((0.0..=1.0).contains(&v));
        }
        handle.join().unwrap();
    }
}
