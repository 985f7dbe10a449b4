//! Frequency response evaluation
//!
//! Evaluates each section's transfer function on the unit circle and takes
//! the complex product across the cascade. Works only on coefficients, never
//! on samples, so it is safe to call from any control thread.

use aeq_core::{AeqError, AeqResult, MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ, validate_sample_rate};
use rustfft::num_complex::Complex;
use std::f64::consts::PI;

use crate::biquad::BiquadCoeffs;

/// Default number of points in a plotted curve
pub const DEFAULT_RESPONSE_POINTS: usize = 200;

/// Magnitudes below this read as the floor instead of `-inf`
pub const RESPONSE_FLOOR_DB: f64 = -240.0;

/// One point of a response curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponsePoint {
    pub frequency_hz: f64,
    pub magnitude_db: f64,
    pub phase_rad: f64,
}

/// Magnitude/phase of a cascade over an ordered set of frequencies
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseCurve {
    points: Vec<ResponsePoint>,
}

impl ResponseCurve {
    pub fn points(&self) -> &[ResponsePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResponsePoint> {
        self.points.iter()
    }

    /// Magnitude at `freq`, interpolated linearly in log-frequency
    ///
    /// Assumes the curve was evaluated on ascending frequencies. Outside the
    /// evaluated range the nearest end point is returned.
    pub fn magnitude_at(&self, freq: f64) -> Option<f64> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        if freq <= first.frequency_hz {
            return Some(first.magnitude_db);
        }
        if freq >= last.frequency_hz {
            return Some(last.magnitude_db);
        }

        let upper = self.points.partition_point(|p| p.frequency_hz < freq);
        let hi = self.points[upper];
        let lo = self.points[upper - 1];
        let span = (hi.frequency_hz / lo.frequency_hz).ln();
        if span <= 0.0 {
            return Some(hi.magnitude_db);
        }
        let t = (freq / lo.frequency_hz).ln() / span;
        Some(lo.magnitude_db + t * (hi.magnitude_db - lo.magnitude_db))
    }

    /// Highest magnitude on the curve
    pub fn max_db(&self) -> Option<f64> {
        self.points.iter().map(|p| p.magnitude_db).reduce(f64::max)
    }

    /// Lowest magnitude on the curve
    pub fn min_db(&self) -> Option<f64> {
        self.points.iter().map(|p| p.magnitude_db).reduce(f64::min)
    }

    /// `(frequency_hz, magnitude_db)` pairs for plotting
    pub fn to_pairs(&self) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .map(|p| (p.frequency_hz, p.magnitude_db))
            .collect()
    }
}

impl<'a> IntoIterator for &'a ResponseCurve {
    type Item = &'a ResponsePoint;
    type IntoIter = std::slice::Iter<'a, ResponsePoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// H(e^jω) of one normalized section
#[inline]
pub fn section_response(coeffs: &BiquadCoeffs, freq: f64, sample_rate: f64) -> Complex<f64> {
    let omega = 2.0 * PI * freq / sample_rate;
    // z^-1 and z^-2 on the unit circle
    let z1 = Complex::from_polar(1.0, -omega);
    let z2 = Complex::from_polar(1.0, -2.0 * omega);

    let num = coeffs.b0 + z1 * coeffs.b1 + z2 * coeffs.b2;
    let den = Complex::new(1.0, 0.0) + z1 * coeffs.a1 + z2 * coeffs.a2;
    num / den
}

/// Complex response of a whole cascade at one frequency
#[inline]
pub fn cascade_response(cascade: &[BiquadCoeffs], freq: f64, sample_rate: f64) -> Complex<f64> {
    cascade
        .iter()
        .fold(Complex::new(1.0, 0.0), |acc, c| {
            acc * section_response(c, freq, sample_rate)
        })
}

fn to_db(magnitude: f64) -> f64 {
    if magnitude > 0.0 && magnitude.is_finite() {
        (20.0 * magnitude.log10()).max(RESPONSE_FLOOR_DB)
    } else if magnitude.is_infinite() {
        f64::INFINITY
    } else {
        RESPONSE_FLOOR_DB
    }
}

/// Evaluate a cascade at the given frequencies
///
/// Section order only changes phase accumulation order; the magnitude is the
/// product of the section magnitudes either way.
pub fn evaluate(
    cascade: &[BiquadCoeffs],
    frequencies: &[f64],
    sample_rate: f64,
) -> AeqResult<ResponseCurve> {
    let sample_rate = validate_sample_rate(sample_rate)?;
    if frequencies.is_empty() {
        return Err(AeqError::InvalidParam(
            "response needs at least one query frequency".into(),
        ));
    }

    let points = frequencies
        .iter()
        .map(|&freq| {
            let h = cascade_response(cascade, freq, sample_rate);
            ResponsePoint {
                frequency_hz: freq,
                magnitude_db: to_db(h.norm()),
                phase_rad: h.arg(),
            }
        })
        .collect();

    Ok(ResponseCurve { points })
}

/// Evaluate over `DEFAULT_RESPONSE_POINTS` log-spaced points, 20 Hz to 20 kHz
pub fn evaluate_default(cascade: &[BiquadCoeffs], sample_rate: f64) -> AeqResult<ResponseCurve> {
    let freqs = log_frequencies(DEFAULT_RESPONSE_POINTS, MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ);
    evaluate(cascade, &freqs, sample_rate)
}

/// `points` log-spaced frequencies from `min` to `max` inclusive
pub fn log_frequencies(points: usize, min: f64, max: f64) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![min],
        _ => {
            let log_min = min.log10();
            let log_max = max.log10();
            (0..points)
                .map(|i| {
                    let t = i as f64 / (points - 1) as f64;
                    10.0_f64.powf(log_min + t * (log_max - log_min))
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_frequencies() {
        let f = log_frequencies(3, 20.0, 20000.0);
        assert_eq!(f.len(), 3);
        assert!((f[0] - 20.0).abs() < 1e-9);
        assert!((f[1] - 632.455_532).abs() < 1e-3);
        assert!((f[2] - 20000.0).abs() < 1e-6);
        assert!(log_frequencies(0, 20.0, 20000.0).is_empty());
        assert_eq!(log_frequencies(1, 20.0, 20000.0), vec![20.0]);
    }

    #[test]
    fn test_empty_cascade_is_flat() {
        let curve = evaluate_default(&[], 48000.0).unwrap();
        assert_eq!(curve.len(), DEFAULT_RESPONSE_POINTS);
        assert!(curve.iter().all(|p| p.magnitude_db.abs() < 1e-12));
    }

    #[test]
    fn test_invalid_sample_rate() {
        let freqs = [1000.0];
        assert!(matches!(
            evaluate(&[], &freqs, 0.0),
            Err(AeqError::InvalidSampleRate(_))
        ));
        assert!(matches!(
            evaluate(&[], &freqs, -44100.0),
            Err(AeqError::InvalidSampleRate(_))
        ));
        assert!(evaluate(&[], &freqs, f64::INFINITY).is_err());
    }

    #[test]
    fn test_empty_frequencies() {
        assert!(matches!(
            evaluate(&[], &[], 48000.0),
            Err(AeqError::InvalidParam(_))
        ));
    }

    #[test]
    fn test_bell_peak() {
        let c = BiquadCoeffs::peaking(1000.0, 1.0, 6.0, 44100.0);
        let curve = evaluate(&[c], &[1000.0], 44100.0).unwrap();
        assert!((curve.points()[0].magnitude_db - 6.0).abs() < 1e-6);
        // Zero phase at the centre of a peaking section
        assert!(curve.points()[0].phase_rad.abs() < 1e-6);
    }

    #[test]
    fn test_lowpass_floor() {
        // Lowpass has a true zero at Nyquist
        let c = BiquadCoeffs::lowpass(1000.0, 0.707, 48000.0);
        let curve = evaluate(&[c], &[24000.0], 48000.0).unwrap();
        let db = curve.points()[0].magnitude_db;
        assert!(db.is_finite());
        assert!(db >= RESPONSE_FLOOR_DB);
        assert!(db < -100.0);
    }

    #[test]
    fn test_magnitude_at_interpolates() {
        let c = BiquadCoeffs::peaking(1000.0, 1.0, 6.0, 48000.0);
        let curve = evaluate_default(&[c], 48000.0).unwrap();
        let exact = evaluate(&[c], &[1000.0], 48000.0).unwrap().points()[0].magnitude_db;
        let interpolated = curve.magnitude_at(1000.0).unwrap();
        assert!((interpolated - exact).abs() < 0.05);

        assert_eq!(curve.magnitude_at(1.0), Some(curve.points()[0].magnitude_db));
        assert_eq!(
            curve.magnitude_at(1e6),
            Some(curve.points()[curve.len() - 1].magnitude_db)
        );
        assert_eq!(ResponseCurve::default().magnitude_at(1000.0), None);
    }

    #[test]
    fn test_max_min_and_pairs() {
        let c = BiquadCoeffs::peaking(1000.0, 2.0, -9.0, 48000.0);
        let curve = evaluate_default(&[c], 48000.0).unwrap();
        assert!(curve.max_db().unwrap() < 0.01);
        assert!(curve.min_db().unwrap() < -8.5);
        let pairs = curve.to_pairs();
        assert_eq!(pairs.len(), curve.len());
        assert_eq!(pairs[0].0, curve.points()[0].frequency_hz);
    }

    #[test]
    fn test_matches_direct_formula() {
        // Cross-check the complex evaluation against the expanded form
        let c = BiquadCoeffs::high_shelf(3000.0, 0.9, 4.0, 44100.0);
        let freq = 5123.0;
        let w = 2.0 * PI * freq / 44100.0;
        let nr = c.b0 + c.b1 * w.cos() + c.b2 * (2.0 * w).cos();
        let ni = -c.b1 * w.sin() - c.b2 * (2.0 * w).sin();
        let dr = 1.0 + c.a1 * w.cos() + c.a2 * (2.0 * w).cos();
        let di = -c.a1 * w.sin() - c.a2 * (2.0 * w).sin();
        let expected = ((nr * nr + ni * ni) / (dr * dr + di * di)).sqrt();

        let h = section_response(&c, freq, 44100.0);
        assert!((h.norm() - expected).abs() < 1e-12);
    }
}
