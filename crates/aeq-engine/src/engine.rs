//! Engine composition root
//!
//! Builds the queues, shared stats and the three engine halves from one
//! configuration. The caller places each half on its own thread.

use std::sync::Arc;

use aeq_core::AeqResult;
use aeq_dsp::SpectrumEstimator;

use crate::analyzer::SpectrumAnalyzer;
use crate::config::EngineConfig;
use crate::controller::EqController;
use crate::handoff::{CommandQueue, EngineStats, FaultQueue, TapQueue};
use crate::processor::EqProcessor;

/// A fully wired engine, not yet split across threads
pub struct EqEngine {
    config: EngineConfig,
    controller: EqController,
    processor: EqProcessor,
    analyzer: SpectrumAnalyzer,
    stats: Arc<EngineStats>,
}

impl EqEngine {
    /// Validate the configuration and wire every part
    pub fn build(config: EngineConfig) -> AeqResult<Self> {
        config.validate()?;

        let stats = Arc::new(EngineStats::default());
        let (command_tx, command_rx) = CommandQueue::new(config.command_queue_capacity).split();
        let (fault_tx, fault_rx) = FaultQueue::new(config.fault_queue_capacity).split();
        let (tap_tx, tap_rx) = TapQueue::new(config.analyzer.tap_capacity).split();

        let estimator = SpectrumEstimator::new(config.spectrum_config())?;

        let controller = EqController::new(
            config.sample_rate,
            config.max_sections,
            config.response_points,
            command_tx,
            fault_rx,
            stats.clone(),
        );
        let processor = EqProcessor::new(
            config.channels,
            config.max_sections,
            command_rx,
            fault_tx,
            tap_tx,
            config.analyzer.tap,
            stats.clone(),
        );
        let analyzer = SpectrumAnalyzer::new(
            config.analyzer.clone(),
            tap_rx,
            estimator,
            stats.clone(),
        );

        log::info!(
            "EQ engine built: {} Hz, {} channels, {} sections",
            config.sample_rate,
            config.channels,
            config.max_sections
        );

        Ok(Self {
            config,
            controller,
            processor,
            analyzer,
            stats,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    pub fn controller(&mut self) -> &mut EqController {
        &mut self.controller
    }

    pub fn processor(&mut self) -> &mut EqProcessor {
        &mut self.processor
    }

    pub fn analyzer(&mut self) -> &mut SpectrumAnalyzer {
        &mut self.analyzer
    }

    /// Hand out the control, audio and analyzer halves
    pub fn split(self) -> (EqController, EqProcessor, SpectrumAnalyzer) {
        (self.controller, self.processor, self.analyzer)
    }
}
