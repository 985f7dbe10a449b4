//! Audio-side EQ processor
//!
//! Lives on the real-time thread. Everything it owns is sized at build time;
//! a processing call drains pending commands, runs one cascade per channel,
//! feeds the analyzer tap and reports faults, all without allocating,
//! locking, logging or waiting.
//!
//! With the master enable off, audio passes through untouched except for
//! NaN/Inf samples, which become silence and are reported like cascade
//! faults.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use aeq_core::{IoSample, Sample};
use aeq_dsp::{Cascade, MonoProcessor, Processor};

use crate::config::AnalyzerTap;
use crate::handoff::{
    CommandConsumer, EngineStats, EqCommand, FaultEvent, FaultKind, FaultProducer, TapProducer,
};

/// Frames mixed down per tap write
const TAP_CHUNK: usize = 256;

/// Replace NaN/Inf by silence; returns how many were replaced
fn silence_non_finite(buffer: &mut [IoSample]) -> u64 {
    let mut count = 0;
    for sample in buffer.iter_mut().filter(|s| !s.is_finite()) {
        *sample = 0.0;
        count += 1;
    }
    count
}

fn silence_non_finite_f64(buffer: &mut [Sample]) -> u64 {
    let mut count = 0;
    for sample in buffer.iter_mut().filter(|s| !s.is_finite()) {
        *sample = 0.0;
        count += 1;
    }
    count
}

/// Real-time half of the engine
pub struct EqProcessor {
    cascades: Vec<Cascade>,
    commands: CommandConsumer,
    faults: FaultProducer,
    tap: TapProducer,
    tap_point: AnalyzerTap,
    enabled: bool,
    /// Non-finite samples silenced while bypassed, this block
    bypass_non_finite: u64,
    block: u64,
    stats: Arc<EngineStats>,
}

impl EqProcessor {
    pub(crate) fn new(
        channels: usize,
        max_sections: usize,
        commands: CommandConsumer,
        faults: FaultProducer,
        tap: TapProducer,
        tap_point: AnalyzerTap,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            cascades: (0..channels.max(1)).map(|_| Cascade::new(max_sections)).collect(),
            commands,
            faults,
            tap,
            tap_point,
            enabled: true,
            bypass_non_finite: 0,
            block: 0,
            stats,
        }
    }

    pub fn channels(&self) -> usize {
        self.cascades.len()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Active sections per channel
    pub fn section_count(&self) -> usize {
        self.cascades[0].len()
    }

    /// Cascade of one channel (read-only view for inspection)
    pub fn cascade(&self, channel: usize) -> Option<&Cascade> {
        self.cascades.get(channel)
    }

    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    // ============ Processing ============

    /// Process a mono block in place with the first channel's cascade
    pub fn process_mono(&mut self, buffer: &mut [IoSample]) {
        self.begin_block();
        if self.tap_point == AnalyzerTap::PreEq {
            self.tap_mono(buffer);
        }
        if self.enabled {
            self.cascades[0].process_block_io(buffer);
        } else {
            self.bypass_non_finite += silence_non_finite(buffer);
        }
        if self.tap_point == AnalyzerTap::PostEq {
            self.tap_mono(buffer);
        }
        self.end_block();
    }

    /// Process an interleaved block in place
    ///
    /// A trailing partial frame is left untouched.
    pub fn process_interleaved(&mut self, buffer: &mut [IoSample]) {
        let channels = self.cascades.len();
        let frames = buffer.len() / channels;
        let buffer = &mut buffer[..frames * channels];

        self.begin_block();
        if self.tap_point == AnalyzerTap::PreEq {
            self.tap_interleaved(buffer);
        }
        if self.enabled {
            for (ch, cascade) in self.cascades.iter_mut().enumerate() {
                cascade.process_strided(buffer, ch, channels);
            }
        } else {
            self.bypass_non_finite += silence_non_finite(buffer);
        }
        if self.tap_point == AnalyzerTap::PostEq {
            self.tap_interleaved(buffer);
        }
        self.end_block();
    }

    /// Process one slice per channel in place
    ///
    /// Channels beyond the configured count pass through.
    pub fn process_planar(&mut self, channels: &mut [&mut [IoSample]]) {
        self.begin_block();
        if self.tap_point == AnalyzerTap::PreEq {
            self.tap_planar(channels);
        }
        if self.enabled {
            for (cascade, buffer) in self.cascades.iter_mut().zip(channels.iter_mut()) {
                cascade.process_block_io(buffer);
            }
        } else {
            for buffer in channels.iter_mut().take(self.cascades.len()) {
                self.bypass_non_finite += silence_non_finite(buffer);
            }
        }
        if self.tap_point == AnalyzerTap::PostEq {
            self.tap_planar(channels);
        }
        self.end_block();
    }

    /// Process a mono block of internal-precision samples in place
    pub fn process_mono_f64(&mut self, buffer: &mut [Sample]) {
        self.begin_block();
        if self.tap_point == AnalyzerTap::PreEq {
            self.tap_f64(buffer);
        }
        if self.enabled {
            self.cascades[0].process_block(buffer);
        } else {
            self.bypass_non_finite += silence_non_finite_f64(buffer);
        }
        if self.tap_point == AnalyzerTap::PostEq {
            self.tap_f64(buffer);
        }
        self.end_block();
    }

    // ============ Block Boundaries ============

    /// Apply every command queued since the last block
    fn begin_block(&mut self) {
        let mut applied = 0;
        while let Some(command) = self.commands.pop() {
            self.apply(command);
            applied += 1;
        }
        if applied > 0 {
            self.stats
                .commands_applied
                .fetch_add(applied, Ordering::Relaxed);
        }
    }

    fn apply(&mut self, command: EqCommand) {
        match command {
            EqCommand::SetSection { index, coeffs } => {
                for cascade in &mut self.cascades {
                    cascade.set_section(index, coeffs);
                }
            }
            EqCommand::SetSectionCount(count) => {
                for cascade in &mut self.cascades {
                    cascade.set_len(count);
                }
            }
            EqCommand::SetEnabled(enabled) => {
                if self.enabled != enabled {
                    self.flush();
                }
                self.enabled = enabled;
            }
            EqCommand::Flush => self.flush(),
        }
    }

    fn flush(&mut self) {
        for cascade in &mut self.cascades {
            cascade.reset();
        }
    }

    /// Collect fault counts and hand them to the control side
    fn end_block(&mut self) {
        let samples: u64 = self
            .cascades
            .iter_mut()
            .map(|cascade| cascade.take_non_finite())
            .sum::<u64>()
            + std::mem::take(&mut self.bypass_non_finite);

        if samples > 0 {
            self.stats
                .non_finite_samples
                .fetch_add(samples, Ordering::Relaxed);
            let event = FaultEvent {
                kind: FaultKind::NonFiniteOutput,
                samples,
                block: self.block,
            };
            if !self.faults.push(event) {
                self.stats
                    .dropped_fault_events
                    .fetch_add(1, Ordering::Relaxed);
            }
        }

        self.block += 1;
        self.stats.blocks_processed.fetch_add(1, Ordering::Relaxed);
    }

    // ============ Analyzer Tap ============

    fn record_tap(&mut self, offered: usize, written: usize) {
        if written < offered {
            self.stats
                .dropped_analyzer_samples
                .fetch_add((offered - written) as u64, Ordering::Relaxed);
        }
    }

    fn tap_mono(&mut self, buffer: &[IoSample]) {
        let written = self.tap.push_slice(buffer);
        self.record_tap(buffer.len(), written);
    }

    fn tap_f64(&mut self, buffer: &[Sample]) {
        let mut mix = [0.0_f32; TAP_CHUNK];
        for chunk in buffer.chunks(TAP_CHUNK) {
            for (dst, &src) in mix.iter_mut().zip(chunk) {
                *dst = src as f32;
            }
            let written = self.tap.push_slice(&mix[..chunk.len()]);
            self.record_tap(chunk.len(), written);
        }
    }

    /// Average all channels of each frame into the tap
    fn tap_interleaved(&mut self, buffer: &[IoSample]) {
        let channels = self.cascades.len();
        if channels == 1 {
            self.tap_mono(buffer);
            return;
        }
        let scale = 1.0 / channels as f32;
        let mut mix = [0.0_f32; TAP_CHUNK];
        for chunk in buffer.chunks(TAP_CHUNK * channels) {
            let frames = chunk.len() / channels;
            for (dst, frame) in mix.iter_mut().zip(chunk.chunks_exact(channels)) {
                *dst = frame.iter().sum::<f32>() * scale;
            }
            let written = self.tap.push_slice(&mix[..frames]);
            self.record_tap(frames, written);
        }
    }

    fn tap_planar(&mut self, channels: &[&mut [IoSample]]) {
        let Some(frames) = channels.iter().map(|c| c.len()).min() else {
            return;
        };
        let scale = 1.0 / channels.len() as f32;
        let mut mix = [0.0_f32; TAP_CHUNK];
        let mut start = 0;
        while start < frames {
            let len = TAP_CHUNK.min(frames - start);
            mix[..len].fill(0.0);
            for channel in channels {
                for (dst, &src) in mix[..len].iter_mut().zip(&channel[start..start + len]) {
                    *dst += src;
                }
            }
            for dst in &mut mix[..len] {
                *dst *= scale;
            }
            let written = self.tap.push_slice(&mix[..len]);
            self.record_tap(len, written);
            start += len;
        }
    }
}

impl std::fmt::Debug for EqProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EqProcessor")
            .field("channels", &self.cascades.len())
            .field("sections", &self.section_count())
            .field("enabled", &self.enabled)
            .field("block", &self.block)
            .finish_non_exhaustive()
    }
}
