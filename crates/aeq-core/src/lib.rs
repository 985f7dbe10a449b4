//! aeq-core: Shared types for the AudioEQ engine
//!
//! Value types that every other crate agrees on: samples, sample-rate
//! validation, the band model, EQ settings and the built-in presets.

mod sample;
mod error;
mod band;
mod settings;
mod presets;

pub use sample::*;
pub use error::*;
pub use band::*;
pub use settings::*;
pub use presets::*;

/// Lowest frequency the EQ exposes (Hz)
pub const MIN_FREQUENCY_HZ: f64 = 20.0;

/// Highest frequency the EQ exposes (Hz)
pub const MAX_FREQUENCY_HZ: f64 = 20000.0;

/// Check that a sample rate can drive the designer and evaluator
pub fn validate_sample_rate(sample_rate: f64) -> AeqResult<f64> {
    if sample_rate > 0.0 && sample_rate.is_finite() {
        Ok(sample_rate)
    } else {
        Err(AeqError::InvalidSampleRate(sample_rate))
    }
}
