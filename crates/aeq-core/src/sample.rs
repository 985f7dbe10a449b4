//! Sample types

/// Internal processing sample (always f64 so coefficient swaps and long
/// cascades accumulate as little rounding error as possible)
pub type Sample = f64;

/// Sample format handed over by the audio I/O collaborator
pub type IoSample = f32;

/// Widen an I/O sample for processing
#[inline(always)]
pub fn to_internal(sample: IoSample) -> Sample {
    sample as Sample
}

/// Narrow a processed sample back to the I/O format
#[inline(always)]
pub fn to_io(sample: Sample) -> IoSample {
    sample as IoSample
}

