//! Preset text serialization.
//!
//! Presets are JSON: format version, instrument name, and a name→value map
//! of every parameter target. Loading validates the whole document before
//! applying anything, so a bad preset leaves the unit untouched.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::params::ParamBank;

/// Version tag embedded in saved presets.
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct PresetFile {
    format: u32,
    instrument: String,
    params: BTreeMap<String, f32>,
}

/// Serialize an instrument's full parameter set.
pub fn save(instrument: &str, bank: &ParamBank) -> String {
    let params = bank
        .specs()
        .iter()
        .map(|s| (s.name.to_string(), bank.get(s.id).unwrap_or(s.default)))
        .collect();
    let file = PresetFile {
        format: FORMAT_VERSION,
        instrument: instrument.to_string(),
        params,
    };
    serde_json::to_string(&file).expect("preset serialization cannot fail")
}

/// Apply preset text to a bank. Returns false — with the bank unchanged —
/// for unparseable text, a version or instrument mismatch, unknown
/// parameter names, or non-finite values. Out-of-range values clamp.
pub fn load(instrument: &str, bank: &ParamBank, text: &str) -> bool {
    let Ok(file) = serde_json::from_str::<PresetFile>(text) else {
        return false;
    };
    if file.format != FORMAT_VERSION || file.instrument != instrument {
        return false;
    }

    // Stage every write before touching the bank
    let mut staged: Vec<(u16, f32)> = Vec::with_capacity(file.params.len());
    for (name, value) in &file.params {
        let Some(spec) = bank.specs().iter().find(|s| s.name == name) else {
            return false;
        };
        if !value.is_finite() {
            return false;
        }
        staged.push((spec.id, spec.clamp(*value)));
    }

    for (id, value) in staged {
        bank.set(id, value);
    }
    true
}
