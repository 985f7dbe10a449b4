//! aeq-engine: Real-time EQ engine
//!
//! Splits the EQ across two execution contexts:
//! - **Control**: `EqController` owns the bands, designs coefficients and
//!   evaluates response curves. May allocate and log.
//! - **Audio**: `EqProcessor` owns the filter state and runs the cascades.
//!   Never blocks, allocates or takes a lock.
//!
//! They talk only through SPSC rings (`handoff`). The `SpectrumAnalyzer`
//! runs on its own thread, fed by a third ring.

pub mod analyzer;
pub mod config;
pub mod controller;
pub mod engine;
pub mod handoff;
pub mod processor;

pub use analyzer::{AnalyzerState, SpectrumAnalyzer};
pub use config::{AnalyzerConfig, AnalyzerTap, EngineConfig};
pub use controller::{EqController, FaultReport};
pub use engine::EqEngine;
pub use handoff::{EngineStats, EqCommand, FaultEvent, FaultKind, StatsSnapshot};
pub use processor::EqProcessor;
