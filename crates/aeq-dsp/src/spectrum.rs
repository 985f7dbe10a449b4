//! Spectrum estimator for the live analyzer display
//!
//! Keeps the most recent `fft_size` samples, applies a Hann window, runs a
//! real FFT and folds the result into log-spaced display bands.
//!
//! The output is a DISPLAY transform, not a measurement: after the
//! amplitude is taken in dBFS a tilt of `tilt_db_per_octave` (pivot 1 kHz)
//! is added so pink-ish material reads level, and the result is mapped from
//! `[floor_db, ceiling_db]` onto `[0, 1]`.

use aeq_core::{AeqError, AeqResult, IoSample, Sample, validate_sample_rate};
use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use std::sync::Arc;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Minimum FFT size
pub const MIN_FFT_SIZE: usize = 256;
/// Maximum FFT size
pub const MAX_FFT_SIZE: usize = 32768;
/// Default FFT size (~85 ms at 48 kHz, 11.7 Hz resolution)
pub const DEFAULT_FFT_SIZE: usize = 4096;
/// Default number of display bands
pub const DEFAULT_NUM_BINS: usize = 64;
/// Frequency where the display tilt is 0 dB
pub const TILT_PIVOT_HZ: f64 = 1000.0;

/// Estimator parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumConfig {
    pub sample_rate: f64,
    pub fft_size: usize,
    pub num_bins: usize,
    pub min_freq: f64,
    pub max_freq: f64,
    pub floor_db: f64,
    pub ceiling_db: f64,
    pub tilt_db_per_octave: f64,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            fft_size: DEFAULT_FFT_SIZE,
            num_bins: DEFAULT_NUM_BINS,
            min_freq: 20.0,
            max_freq: 20000.0,
            floor_db: -90.0,
            ceiling_db: 0.0,
            tilt_db_per_octave: 3.0,
        }
    }
}

/// FFT size accepted by the estimator, or the default
pub fn sanitize_fft_size(fft_size: usize) -> usize {
    if (MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft_size) && fft_size.is_power_of_two() {
        fft_size
    } else {
        DEFAULT_FFT_SIZE
    }
}

/// One analyzer frame; each frame replaces the previous one entirely
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFrame {
    /// Display magnitudes in `[0, 1]`
    pub magnitudes: Vec<f32>,
    /// Centre frequency of each band (Hz)
    pub frequencies: Vec<f32>,
    pub sequence: u64,
}

impl SpectrumFrame {
    /// All-zero frame over the given bands
    pub fn silent(frequencies: &[f32]) -> Self {
        Self {
            magnitudes: vec![0.0; frequencies.len()],
            frequencies: frequencies.to_vec(),
            sequence: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    pub fn is_silent(&self) -> bool {
        self.magnitudes.iter().all(|&m| m == 0.0)
    }

    /// Index of the strongest band (first on ties), `None` when silent
    pub fn peak_bin(&self) -> Option<usize> {
        if self.is_silent() {
            return None;
        }
        let mut best = 0;
        for (i, &m) in self.magnitudes.iter().enumerate() {
            if m > self.magnitudes[best] {
                best = i;
            }
        }
        Some(best)
    }
}

/// FFT bins feeding one display band
#[derive(Debug, Clone, Copy)]
enum BandBins {
    /// Strongest of `start..end`
    Range { start: usize, end: usize },
    /// No bin inside the band edges; use the nearest one
    Nearest(usize),
    /// Band lies above Nyquist
    Empty,
}

/// Windowed-FFT spectrum estimator
pub struct SpectrumEstimator {
    config: SpectrumConfig,
    fft: Arc<dyn RealToComplex<f64>>,
    history: Vec<f64>,
    write_pos: usize,
    filled: usize,
    /// Samples pushed since the last frame
    fresh: usize,
    window: Vec<f64>,
    amplitude_scale: f64,
    // Pre-allocated FFT buffers
    windowed: Vec<f64>,
    spectrum: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    bands: Vec<BandBins>,
    centres: Vec<f32>,
    tilt: Vec<f64>,
    sequence: u64,
}

impl SpectrumEstimator {
    /// Build an estimator; an unsupported FFT size falls back to the default
    pub fn new(config: SpectrumConfig) -> AeqResult<Self> {
        let sample_rate = validate_sample_rate(config.sample_rate)?;
        if config.num_bins == 0 {
            return Err(AeqError::InvalidParam("spectrum needs at least one band".into()));
        }
        if !(config.min_freq > 0.0 && config.min_freq < config.max_freq) {
            return Err(AeqError::InvalidParam(format!(
                "invalid spectrum range {}..{} Hz",
                config.min_freq, config.max_freq
            )));
        }
        if !(config.floor_db < config.ceiling_db) {
            return Err(AeqError::InvalidParam(format!(
                "invalid spectrum scale {}..{} dB",
                config.floor_db, config.ceiling_db
            )));
        }

        let fft_size = sanitize_fft_size(config.fft_size);
        if fft_size != config.fft_size {
            log::warn!(
                "Unsupported FFT size {}, using {}",
                config.fft_size,
                fft_size
            );
        }
        let config = SpectrumConfig {
            sample_rate,
            fft_size,
            ..config
        };

        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(fft_size);

        // Hann window
        let window: Vec<f64> = (0..fft_size)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (fft_size - 1) as f64).cos())
            })
            .collect();
        let window_sum: f64 = window.iter().sum();

        let (bands, centres) = Self::layout_bands(&config);
        let tilt = centres
            .iter()
            .map(|&f| config.tilt_db_per_octave * (f as f64 / TILT_PIVOT_HZ).log2())
            .collect();

        Ok(Self {
            spectrum: fft.make_output_vec(),
            scratch: fft.make_scratch_vec(),
            fft,
            history: vec![0.0; fft_size],
            write_pos: 0,
            filled: 0,
            fresh: 0,
            window,
            amplitude_scale: 2.0 / window_sum,
            windowed: vec![0.0; fft_size],
            bands,
            centres,
            tilt,
            sequence: 0,
            config,
        })
    }

    /// Log-spaced band edges `min·(max/min)^(i/K)` mapped onto FFT bins
    fn layout_bands(config: &SpectrumConfig) -> (Vec<BandBins>, Vec<f32>) {
        let k = config.num_bins;
        let n = config.fft_size as f64;
        let nyquist_bin = config.fft_size / 2;
        let bin_hz = config.sample_rate / n;
        let ratio = config.max_freq / config.min_freq;
        let edge = |i: usize| config.min_freq * ratio.powf(i as f64 / k as f64);

        let mut bands = Vec::with_capacity(k);
        let mut centres = Vec::with_capacity(k);
        for i in 0..k {
            let lo = edge(i);
            let hi = edge(i + 1);
            let centre = (lo * hi).sqrt();
            centres.push(centre as f32);

            if centre >= config.sample_rate * 0.5 {
                bands.push(BandBins::Empty);
                continue;
            }
            let start = (lo / bin_hz).ceil() as usize;
            let end = ((hi / bin_hz).ceil() as usize).min(nyquist_bin + 1);
            if start < end {
                bands.push(BandBins::Range { start, end });
            } else {
                let nearest = ((centre / bin_hz).round() as usize).min(nyquist_bin);
                bands.push(BandBins::Nearest(nearest));
            }
        }
        (bands, centres)
    }

    pub fn config(&self) -> &SpectrumConfig {
        &self.config
    }

    pub fn fft_size(&self) -> usize {
        self.config.fft_size
    }

    pub fn num_bins(&self) -> usize {
        self.config.num_bins
    }

    /// Centre frequency of every display band
    pub fn band_frequencies(&self) -> &[f32] {
        &self.centres
    }

    /// Add samples to the rolling history
    pub fn push_samples(&mut self, samples: &[Sample]) {
        let n = self.history.len();
        for &sample in samples {
            self.history[self.write_pos] = if sample.is_finite() { sample } else { 0.0 };
            self.write_pos = (self.write_pos + 1) % n;
        }
        self.filled = (self.filled + samples.len()).min(n);
        self.fresh = self.fresh.saturating_add(samples.len());
    }

    /// Add I/O-format samples to the rolling history
    pub fn push_samples_f32(&mut self, samples: &[IoSample]) {
        let n = self.history.len();
        for &sample in samples {
            let sample = sample as f64;
            self.history[self.write_pos] = if sample.is_finite() { sample } else { 0.0 };
            self.write_pos = (self.write_pos + 1) % n;
        }
        self.filled = (self.filled + samples.len()).min(n);
        self.fresh = self.fresh.saturating_add(samples.len());
    }

    /// Enough history for a full window
    pub fn has_full_window(&self) -> bool {
        self.filled >= self.history.len()
    }

    /// Samples arrived since the last frame
    pub fn has_new_samples(&self) -> bool {
        self.fresh > 0
    }

    /// Forget all history
    pub fn clear(&mut self) {
        self.history.fill(0.0);
        self.write_pos = 0;
        self.filled = 0;
        self.fresh = 0;
    }

    /// Silent frame over this estimator's bands, consuming a sequence number
    pub fn silent_frame(&mut self) -> SpectrumFrame {
        self.sequence += 1;
        SpectrumFrame {
            sequence: self.sequence,
            ..SpectrumFrame::silent(&self.centres)
        }
    }

    /// Compute a frame from the current history
    ///
    /// Returns a silent frame until a full window of history is available.
    pub fn compute_frame(&mut self) -> SpectrumFrame {
        self.fresh = 0;
        if !self.has_full_window() {
            return self.silent_frame();
        }

        // Oldest sample first, then window
        let n = self.history.len();
        for (i, (out, &w)) in self.windowed.iter_mut().zip(&self.window).enumerate() {
            *out = self.history[(self.write_pos + i) % n] * w;
        }

        if let Err(e) =
            self.fft
                .process_with_scratch(&mut self.windowed, &mut self.spectrum, &mut self.scratch)
        {
            log::warn!("Spectrum FFT failed: {}", e);
            return self.silent_frame();
        }

        let floor = self.config.floor_db;
        let range = self.config.ceiling_db - floor;
        let magnitudes = self
            .bands
            .iter()
            .zip(&self.tilt)
            .map(|(bins, &tilt)| {
                let amplitude = match *bins {
                    BandBins::Range { start, end } => self.spectrum[start..end]
                        .iter()
                        .map(|c| c.norm())
                        .fold(0.0, f64::max),
                    BandBins::Nearest(bin) => self.spectrum[bin].norm(),
                    BandBins::Empty => return 0.0,
                } * self.amplitude_scale;

                if amplitude <= 0.0 {
                    return 0.0;
                }
                let db = 20.0 * amplitude.log10() + tilt;
                ((db - floor) / range).clamp(0.0, 1.0) as f32
            })
            .collect();

        self.sequence += 1;
        SpectrumFrame {
            magnitudes,
            frequencies: self.centres.clone(),
            sequence: self.sequence,
        }
    }
}

impl std::fmt::Debug for SpectrumEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumEstimator")
            .field("config", &self.config)
            .field("filled", &self.filled)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(freq: f64, amplitude: f64, sample_rate: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_fft_size_fallback() {
        assert_eq!(sanitize_fft_size(1000), DEFAULT_FFT_SIZE);
        assert_eq!(sanitize_fft_size(64), DEFAULT_FFT_SIZE);
        assert_eq!(sanitize_fft_size(1 << 20), DEFAULT_FFT_SIZE);
        assert_eq!(sanitize_fft_size(2048), 2048);

        let est = SpectrumEstimator::new(SpectrumConfig {
            fft_size: 1000,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(est.fft_size(), DEFAULT_FFT_SIZE);
    }

    #[test]
    fn test_rejects_bad_config() {
        let bad_rate = SpectrumConfig {
            sample_rate: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            SpectrumEstimator::new(bad_rate),
            Err(AeqError::InvalidSampleRate(_))
        ));
        let no_bins = SpectrumConfig {
            num_bins: 0,
            ..Default::default()
        };
        assert!(SpectrumEstimator::new(no_bins).is_err());
        let inverted = SpectrumConfig {
            min_freq: 1000.0,
            max_freq: 100.0,
            ..Default::default()
        };
        assert!(SpectrumEstimator::new(inverted).is_err());
    }

    #[test]
    fn test_band_layout() {
        let est = SpectrumEstimator::new(SpectrumConfig::default()).unwrap();
        let f = est.band_frequencies();
        assert_eq!(f.len(), 64);
        assert!(f.windows(2).all(|w| w[1] > w[0]));
        assert!(f[0] > 20.0 && f[0] < 23.0);
        assert!(f[63] > 18000.0 && f[63] < 20000.0);
    }

    #[test]
    fn test_underrun_is_silent() {
        let mut est = SpectrumEstimator::new(SpectrumConfig::default()).unwrap();
        est.push_samples(&sine(1000.0, 1.0, 48000.0, 100));
        assert!(!est.has_full_window());
        let frame = est.compute_frame();
        assert_eq!(frame.len(), 64);
        assert!(frame.is_silent());
        assert_eq!(frame.peak_bin(), None);
    }

    #[test]
    fn test_digital_silence_is_silent() {
        let mut est = SpectrumEstimator::new(SpectrumConfig::default()).unwrap();
        est.push_samples(&vec![0.0; 8192]);
        assert!(est.compute_frame().is_silent());
    }

    #[test]
    fn test_full_scale_sine_reaches_top() {
        let mut est = SpectrumEstimator::new(SpectrumConfig {
            tilt_db_per_octave: 0.0,
            ..Default::default()
        })
        .unwrap();
        est.push_samples(&sine(1000.0, 1.0, 48000.0, 4096));
        let frame = est.compute_frame();
        let peak = frame.peak_bin().unwrap();
        // 0 dBFS minus at most the Hann scalloping loss
        assert!(frame.magnitudes[peak] > 1.0 - 1.5 / 90.0);
    }

    #[test]
    fn test_sequence_and_clear() {
        let mut est = SpectrumEstimator::new(SpectrumConfig::default()).unwrap();
        est.push_samples(&sine(440.0, 0.5, 48000.0, 4096));
        assert!(est.has_new_samples());
        let a = est.compute_frame();
        assert!(!est.has_new_samples());
        let b = est.compute_frame();
        assert!(b.sequence > a.sequence);

        est.clear();
        assert!(!est.has_full_window());
        assert!(est.compute_frame().is_silent());
    }

    #[test]
    fn test_non_finite_input_is_ignored() {
        let mut est = SpectrumEstimator::new(SpectrumConfig::default()).unwrap();
        let mut input = sine(2000.0, 0.5, 48000.0, 4096);
        input[100] = f64::NAN;
        input[200] = f64::INFINITY;
        est.push_samples(&input);
        let frame = est.compute_frame();
        assert!(frame.magnitudes.iter().all(|m| m.is_finite()));
    }

    #[test]
    fn test_bands_above_nyquist_read_zero() {
        let mut est = SpectrumEstimator::new(SpectrumConfig {
            sample_rate: 22050.0,
            ..Default::default()
        })
        .unwrap();
        est.push_samples(&vec![0.5; 4096]);
        let frame = est.compute_frame();
        assert_eq!(frame.magnitudes[63], 0.0);
    }
}
