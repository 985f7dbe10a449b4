//! Engine configuration
//!
//! Plain serde structs with defaults for every field, so a partial JSON
//! document is a valid configuration.

use std::time::Duration;

use aeq_core::{
    AeqError, AeqResult, MAX_BANDS, MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ, validate_sample_rate,
};
use aeq_dsp::response::DEFAULT_RESPONSE_POINTS;
use aeq_dsp::spectrum::{DEFAULT_FFT_SIZE, DEFAULT_NUM_BINS, sanitize_fft_size};
use aeq_dsp::SpectrumConfig;
use serde::{Deserialize, Serialize};

/// Slowest analyzer refresh (Hz)
pub const MIN_REFRESH_HZ: f64 = 1.0;
/// Fastest analyzer refresh (Hz)
pub const MAX_REFRESH_HZ: f64 = 120.0;

// ============ Analyzer Config ============

/// Where the analyzer taps the audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalyzerTap {
    /// Raw input, independent of the EQ chain
    #[default]
    PreEq,
    /// Equalized output
    PostEq,
}

/// Spectrum analyzer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyzerConfig {
    /// FFT size (power of two, 256..=32768)
    pub fft_size: usize,
    /// Display bands per frame
    pub num_bins: usize,
    /// Frames per second
    pub refresh_hz: f64,
    pub min_freq: f64,
    pub max_freq: f64,
    /// Level mapped to 0
    pub floor_db: f64,
    /// Level mapped to 1
    pub ceiling_db: f64,
    /// Display emphasis, pivoting at 1 kHz
    pub tilt_db_per_octave: f64,
    pub tap: AnalyzerTap,
    /// Samples buffered between the audio and analyzer threads
    pub tap_capacity: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            num_bins: DEFAULT_NUM_BINS,
            refresh_hz: 30.0,
            min_freq: MIN_FREQUENCY_HZ,
            max_freq: MAX_FREQUENCY_HZ,
            floor_db: -90.0,
            ceiling_db: 0.0,
            tilt_db_per_octave: 3.0,
            tap: AnalyzerTap::PreEq,
            tap_capacity: 16384,
        }
    }
}

impl AnalyzerConfig {
    /// Time between frames, with the refresh rate clamped to 1..=120 Hz
    pub fn refresh_interval(&self) -> Duration {
        let hz = if self.refresh_hz.is_finite() {
            self.refresh_hz.clamp(MIN_REFRESH_HZ, MAX_REFRESH_HZ)
        } else {
            30.0
        };
        Duration::from_secs_f64(1.0 / hz)
    }

    /// Estimator parameters at the given sample rate
    pub fn spectrum_config(&self, sample_rate: f64) -> SpectrumConfig {
        SpectrumConfig {
            sample_rate,
            fft_size: sanitize_fft_size(self.fft_size),
            num_bins: self.num_bins,
            min_freq: self.min_freq,
            max_freq: self.max_freq,
            floor_db: self.floor_db,
            ceiling_db: self.ceiling_db,
            tilt_db_per_octave: self.tilt_db_per_octave,
        }
    }

    fn validate(&self) -> AeqResult<()> {
        if self.num_bins == 0 {
            return Err(AeqError::InvalidParam("analyzer needs at least one bin".into()));
        }
        if !(self.min_freq > 0.0 && self.min_freq < self.max_freq) {
            return Err(AeqError::InvalidParam(format!(
                "analyzer range {}..{} Hz",
                self.min_freq, self.max_freq
            )));
        }
        if !(self.floor_db < self.ceiling_db) {
            return Err(AeqError::InvalidParam(format!(
                "analyzer scale {}..{} dB",
                self.floor_db, self.ceiling_db
            )));
        }
        if self.tap_capacity == 0 {
            return Err(AeqError::InvalidParam("analyzer tap capacity is zero".into()));
        }
        Ok(())
    }
}

// ============ Engine Config ============

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub sample_rate: f64,
    /// Channels processed by the audio side, one cascade each
    pub channels: usize,
    /// Sections allocated per cascade
    pub max_sections: usize,
    /// Control → audio command ring size
    pub command_queue_capacity: usize,
    /// Audio → control fault ring size
    pub fault_queue_capacity: usize,
    /// Points in a default response curve
    pub response_points: usize,
    pub analyzer: AnalyzerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            channels: 2,
            max_sections: MAX_BANDS,
            command_queue_capacity: 256,
            fault_queue_capacity: 64,
            response_points: DEFAULT_RESPONSE_POINTS,
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> AeqResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| AeqError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> AeqResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| AeqError::Serialization(e.to_string()))
    }

    /// Reject configurations the engine cannot be built from
    ///
    /// An unsupported FFT size is not an error; the estimator falls back
    /// to its default.
    pub fn validate(&self) -> AeqResult<()> {
        validate_sample_rate(self.sample_rate)?;
        if self.channels == 0 {
            return Err(AeqError::InvalidParam("channel count is zero".into()));
        }
        if self.max_sections == 0 || self.max_sections > MAX_BANDS {
            return Err(AeqError::InvalidParam(format!(
                "max sections must be 1..={}, got {}",
                MAX_BANDS, self.max_sections
            )));
        }
        if self.command_queue_capacity == 0 || self.fault_queue_capacity == 0 {
            return Err(AeqError::InvalidParam("queue capacity is zero".into()));
        }
        if self.response_points < 2 {
            return Err(AeqError::InvalidParam(format!(
                "response needs at least 2 points, got {}",
                self.response_points
            )));
        }
        self.analyzer.validate()
    }

    /// Estimator parameters at the engine sample rate
    pub fn spectrum_config(&self) -> SpectrumConfig {
        self.analyzer.spectrum_config(self.sample_rate)
    }
}
