//! Filter coefficient designer
//!
//! `design` is pure and deterministic: the same band at the same sample rate
//! always yields bit-identical coefficients.

use aeq_core::{Band, BandSet, FilterShape, MIN_Q};

use crate::biquad::BiquadCoeffs;

/// Fraction of Nyquist a design frequency is clamped to
pub const NYQUIST_GUARD: f64 = 0.999;

/// Keep `0 < ω0 < π` so the designer never produces a degenerate section
#[inline]
pub fn clamp_to_nyquist(freq: f64, sample_rate: f64) -> f64 {
    let limit = NYQUIST_GUARD * sample_rate * 0.5;
    if freq >= limit {
        limit
    } else {
        freq.max(f64::MIN_POSITIVE)
    }
}

/// Map a band to normalized biquad coefficients
///
/// Disabled bands, and sample rates that cannot describe any filter, yield
/// the pass-through set.
pub fn design(band: &Band, sample_rate: f64) -> BiquadCoeffs {
    if !band.is_enabled() {
        return BiquadCoeffs::bypass();
    }
    if !(sample_rate > 0.0 && sample_rate.is_finite()) {
        log::debug!("design: invalid sample rate {}, using bypass", sample_rate);
        return BiquadCoeffs::bypass();
    }

    let freq = clamp_to_nyquist(band.frequency(), sample_rate);
    let q = band.q().max(MIN_Q);
    let gain_db = band.gain_db();

    let coeffs = match band.shape() {
        FilterShape::Bell => BiquadCoeffs::peaking(freq, q, gain_db, sample_rate),
        FilterShape::LowShelf => BiquadCoeffs::low_shelf(freq, q, gain_db, sample_rate),
        FilterShape::HighShelf => BiquadCoeffs::high_shelf(freq, q, gain_db, sample_rate),
        FilterShape::LowPass => BiquadCoeffs::lowpass(freq, q, sample_rate),
        FilterShape::HighPass => BiquadCoeffs::highpass(freq, q, sample_rate),
    };

    debug_assert!(coeffs.is_finite(), "non-finite design for {:?}", band);
    coeffs
}

/// Design every band of a set, preserving order
pub fn design_all(bands: &BandSet, sample_rate: f64) -> Vec<BiquadCoeffs> {
    bands.iter().map(|band| design(band, sample_rate)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_is_bypass() {
        let band = Band::bell(1000.0, 12.0, 2.0).with_enabled(false);
        assert!(design(&band, 48000.0).is_bypass());
    }

    #[test]
    fn test_invalid_sample_rate_is_bypass() {
        let band = Band::bell(1000.0, 12.0, 2.0);
        assert!(design(&band, 0.0).is_bypass());
        assert!(design(&band, f64::NAN).is_bypass());
    }

    #[test]
    fn test_all_shapes_finite_and_stable() {
        for shape in FilterShape::ALL {
            for &sr in &[8000.0, 44100.0, 48000.0, 96000.0] {
                for &freq in &[20.0, 1000.0, 15000.0, 20000.0] {
                    for &q in &[0.1, 0.707, 10.0] {
                        let band = Band::new(shape, freq, 20.0, q);
                        let c = design(&band, sr);
                        assert!(c.is_finite(), "{:?} @ {} Hz / {} sr", shape, freq, sr);
                        assert!(c.is_stable(), "{:?} @ {} Hz / {} sr", shape, freq, sr);
                        assert_eq!(c.a0(), 1.0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_nyquist_clamp() {
        assert_eq!(clamp_to_nyquist(1000.0, 48000.0), 1000.0);
        assert_eq!(clamp_to_nyquist(24000.0, 48000.0), 0.999 * 24000.0);
        assert_eq!(clamp_to_nyquist(20000.0, 32000.0), 0.999 * 16000.0);

        // Above Nyquist designs the same filter as the clamped frequency
        let above = design(&Band::bell(20000.0, 6.0, 1.0), 32000.0);
        let at_limit = BiquadCoeffs::peaking(0.999 * 16000.0, 1.0, 6.0, 32000.0);
        assert_eq!(above, at_limit);
    }

    #[test]
    fn test_deterministic() {
        let band = Band::high_shelf(6000.0, -4.5, 0.8);
        assert_eq!(design(&band, 44100.0), design(&band, 44100.0));
    }

    #[test]
    fn test_design_all_preserves_order() {
        let set = BandSet::from_bands(vec![
            Band::low_pass(8000.0, 0.707),
            Band::bell(100.0, 3.0, 1.0).with_enabled(false),
            Band::high_pass(40.0, 0.707),
        ])
        .unwrap();
        let coeffs = design_all(&set, 48000.0);
        assert_eq!(coeffs.len(), 3);
        assert_eq!(coeffs[0], BiquadCoeffs::lowpass(8000.0, 0.707, 48000.0));
        assert!(coeffs[1].is_bypass());
        assert_eq!(coeffs[2], BiquadCoeffs::highpass(40.0, 0.707, 48000.0));
    }
}
