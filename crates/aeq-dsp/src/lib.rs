//! aeq-dsp: EQ DSP core
//!
//! Pure, allocation-free-after-construction signal processing.
//!
//! ## Modules
//! - `biquad` - RBJ coefficient formulas and the TDF-II section
//! - `design` - band + sample rate to normalized coefficients
//! - `cascade` - chained sections with click-free coefficient swaps
//! - `response` - magnitude/phase of a cascade at arbitrary frequencies
//! - `spectrum` - windowed FFT to log-spaced display bins

pub mod biquad;
pub mod design;
pub mod cascade;
pub mod response;
pub mod spectrum;

pub use biquad::{BiquadCoeffs, BiquadTDF2};
pub use cascade::Cascade;
pub use design::{design, design_all};
pub use response::{evaluate, log_frequencies, ResponseCurve, ResponsePoint};
pub use spectrum::{SpectrumConfig, SpectrumEstimator, SpectrumFrame};

use aeq_core::Sample;

/// Trait for all DSP processors
pub trait Processor: Send + Sync {
    /// Reset processor state
    fn reset(&mut self);
}

/// Mono processor trait
pub trait MonoProcessor: Processor {
    /// Process a single sample
    fn process_sample(&mut self, input: Sample) -> Sample;

    /// Process a block of samples
    fn process_block(&mut self, buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }
}
