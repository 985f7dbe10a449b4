//! Built-in presets
//!
//! All factory presets are 10-band graphic curves. Storage of user presets
//! belongs to the persistence layer; only the in-memory shape lives here.

use crate::EqSettings;

/// Factory preset names and their 10-band gains (31 Hz .. 16 kHz)
const BUILTIN: [(&str, [f64; 10]); 8] = [
    ("Flat", [0.0; 10]),
    ("Vocal Boost", [-2.0, -1.0, 0.0, 2.0, 4.0, 4.0, 3.0, 1.0, -1.0, -2.0]),
    ("Bass Boost", [6.0, 5.0, 4.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
    ("Treble Boost", [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 4.0, 5.0, 6.0]),
    ("Rock", [4.0, 3.0, 1.0, 0.0, -1.0, 0.0, 1.0, 3.0, 4.0, 4.0]),
    ("Jazz", [3.0, 2.0, 1.0, 2.0, -1.0, -1.0, 0.0, 1.0, 2.0, 3.0]),
    ("Classical", [4.0, 3.0, 2.0, 1.0, 0.0, 0.0, 0.0, -1.0, 2.0, 3.0]),
    ("Electronic", [5.0, 4.0, 2.0, 0.0, 1.0, 2.0, 1.0, 3.0, 4.0, 4.0]),
];

/// Names of the factory presets, in display order
pub fn builtin_preset_names() -> impl Iterator<Item = &'static str> {
    BUILTIN.iter().map(|(name, _)| *name)
}

/// All factory presets
pub fn builtin_presets() -> Vec<EqSettings> {
    BUILTIN
        .iter()
        .map(|(name, gains)| EqSettings::graphic(*name, gains))
        .collect()
}

/// Look up a factory preset by name (case-insensitive)
pub fn preset(name: &str) -> Option<EqSettings> {
    BUILTIN
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name.trim()))
        .map(|(n, gains)| EqSettings::graphic(*n, gains))
}
