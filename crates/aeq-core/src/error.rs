//! Error types for AudioEQ

use thiserror::Error;

/// Core error type
///
/// Only control-path operations return these. The real-time path converts
/// every failure into a safe local value and reports it out-of-band.
#[derive(Error, Debug)]
pub enum AeqError {
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Too many bands: {requested} requested, at most {max} supported")]
    TooManyBands { requested: usize, max: usize },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("State error: {0}")]
    State(String),
}

/// Result type alias
pub type AeqResult<T> = Result<T, AeqError>;
