//! Control-side EQ controller
//!
//! Owns the authoritative band set and a snapshot of the coefficients it
//! has sent. Band edits are designed here and shipped to the processor as
//! complete coefficient sets; anything the command ring cannot take right
//! now is remembered and resent on the next control call.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use aeq_core::{AeqError, AeqResult, Band, BandSet, EqSettings, validate_sample_rate};
use aeq_core::{MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ};
use aeq_dsp::response::{ResponseCurve, evaluate, log_frequencies};
use aeq_dsp::{BiquadCoeffs, design};
use serde::Serialize;

use crate::handoff::{CommandProducer, EngineStats, EqCommand, FaultConsumer, FaultEvent};

/// Commands waiting for ring space
#[derive(Debug, Default)]
struct Pending {
    sections: Vec<bool>,
    count: bool,
    enabled: bool,
    flush: bool,
}

impl Pending {
    fn is_empty(&self) -> bool {
        !(self.count || self.enabled || self.flush || self.sections.iter().any(|&p| p))
    }

    fn len(&self) -> usize {
        self.sections.iter().filter(|&&p| p).count()
            + usize::from(self.count)
            + usize::from(self.enabled)
            + usize::from(self.flush)
    }
}

/// Faults drained by one `poll_faults` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultReport {
    pub events: Vec<FaultEvent>,
    /// Non-finite samples across the drained events
    pub non_finite_samples: u64,
    /// Events the audio side could not deliver (running total)
    pub dropped_events: u64,
}

impl FaultReport {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Control half of the engine
pub struct EqController {
    bands: BandSet,
    enabled: bool,
    sample_rate: f64,
    /// Coefficients as last designed, one per band
    coeffs: Vec<BiquadCoeffs>,
    max_sections: usize,
    response_points: usize,
    commands: CommandProducer,
    faults: FaultConsumer,
    pending: Pending,
    stats: Arc<EngineStats>,
}

impl EqController {
    pub(crate) fn new(
        sample_rate: f64,
        max_sections: usize,
        response_points: usize,
        commands: CommandProducer,
        faults: FaultConsumer,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            bands: BandSet::new(),
            enabled: true,
            sample_rate,
            coeffs: Vec::new(),
            max_sections,
            response_points,
            commands,
            faults,
            pending: Pending {
                sections: vec![false; max_sections],
                ..Default::default()
            },
            stats,
        }
    }

    pub fn bands(&self) -> &BandSet {
        &self.bands
    }

    /// Coefficients the processor is (or will shortly be) running
    pub fn coeffs(&self) -> &[BiquadCoeffs] {
        &self.coeffs
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn max_sections(&self) -> usize {
        self.max_sections
    }

    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    /// Commands still waiting for ring space
    pub fn pending_commands(&self) -> usize {
        self.pending.len()
    }

    // ============ Band Edits ============

    /// Replace the whole band set
    ///
    /// Only sections whose coefficients changed are resent.
    pub fn apply_band_set(&mut self, bands: BandSet) -> AeqResult<()> {
        if bands.len() > self.max_sections {
            return Err(AeqError::TooManyBands {
                requested: bands.len(),
                max: self.max_sections,
            });
        }
        self.retry_pending();

        let old_len = self.coeffs.len();
        let coeffs: Vec<BiquadCoeffs> =
            bands.iter().map(|band| design(band, self.sample_rate)).collect();

        for (index, c) in coeffs.iter().enumerate() {
            if index >= old_len || self.coeffs[index] != *c {
                self.send_section(index, *c);
            }
        }
        self.coeffs = coeffs;
        self.bands = bands;
        if self.coeffs.len() != old_len {
            self.send_count();
        }

        log::debug!(
            "Applied {} bands ({} enabled)",
            self.bands.len(),
            self.bands.enabled_count()
        );
        Ok(())
    }

    /// Load settings: bands for the active mode plus the master enable
    pub fn apply_settings(&mut self, settings: &EqSettings) -> AeqResult<()> {
        let bands = settings.band_set()?;
        self.apply_band_set(bands)?;
        self.set_enabled(settings.enabled);
        log::info!("Loaded EQ settings '{}' ({:?})", settings.name, settings.mode);
        Ok(())
    }

    /// Replace one band
    pub fn set_band(&mut self, index: usize, band: Band) -> AeqResult<()> {
        self.bands.set(index, band)?;
        self.redesign(index);
        Ok(())
    }

    /// Edit one band in place
    pub fn update_band<F>(&mut self, index: usize, f: F) -> AeqResult<()>
    where
        F: FnOnce(&mut Band),
    {
        let band = self.bands.get_mut(index).ok_or_else(|| {
            AeqError::InvalidParam(format!("band index {} out of range", index))
        })?;
        f(band);
        self.redesign(index);
        Ok(())
    }

    /// Append a band; returns its index
    pub fn add_band(&mut self, band: Band) -> AeqResult<usize> {
        if self.bands.len() >= self.max_sections {
            return Err(AeqError::TooManyBands {
                requested: self.bands.len() + 1,
                max: self.max_sections,
            });
        }
        let mut bands = self.bands.clone();
        let index = bands.push(band)?;
        self.apply_band_set(bands)?;
        Ok(index)
    }

    /// Remove a band; later bands move up one section
    pub fn remove_band(&mut self, index: usize) -> AeqResult<Band> {
        let mut bands = self.bands.clone();
        let removed = bands.remove(index).ok_or_else(|| {
            AeqError::InvalidParam(format!("band index {} out of range", index))
        })?;
        self.apply_band_set(bands)?;
        Ok(removed)
    }

    fn redesign(&mut self, index: usize) {
        self.retry_pending();
        let Some(band) = self.bands.get(index) else {
            return;
        };
        let coeffs = design(band, self.sample_rate);
        if self.coeffs[index] != coeffs {
            self.coeffs[index] = coeffs;
            self.send_section(index, coeffs);
        }
    }

    // ============ Engine State ============

    /// Master enable; disabled means pass-through with state flushed
    pub fn set_enabled(&mut self, enabled: bool) {
        self.retry_pending();
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        self.pending.enabled = !self.commands.push(EqCommand::SetEnabled(enabled));
        self.note_deferred(self.pending.enabled);
        log::info!("EQ {}", if enabled { "enabled" } else { "bypassed" });
    }

    /// Redesign every band for a new sample rate
    pub fn set_sample_rate(&mut self, sample_rate: f64) -> AeqResult<()> {
        let sample_rate = validate_sample_rate(sample_rate)?;
        if sample_rate == self.sample_rate {
            return Ok(());
        }
        self.sample_rate = sample_rate;
        let bands = self.bands.clone();
        self.apply_band_set(bands)?;
        log::info!("Sample rate changed to {} Hz", sample_rate);
        Ok(())
    }

    /// Zero the processor's filter state
    pub fn flush(&mut self) {
        self.retry_pending();
        self.pending.flush = !self.commands.push(EqCommand::Flush);
        self.note_deferred(self.pending.flush);
    }

    // ============ Response ============

    /// Response of what the processor runs, over the configured log grid
    pub fn response_curve(&self) -> AeqResult<ResponseCurve> {
        let freqs = log_frequencies(self.response_points, MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ);
        self.response_at(&freqs)
    }

    /// Response at arbitrary frequencies; flat while the EQ is disabled
    pub fn response_at(&self, frequencies: &[f64]) -> AeqResult<ResponseCurve> {
        let cascade: &[BiquadCoeffs] = if self.enabled { &self.coeffs } else { &[] };
        evaluate(cascade, frequencies, self.sample_rate)
    }

    // ============ Faults ============

    /// Drain fault events from the audio side, logging any found
    pub fn poll_faults(&mut self) -> FaultReport {
        let mut report = FaultReport::default();
        while let Some(event) = self.faults.pop() {
            report.non_finite_samples += event.samples;
            report.events.push(event);
        }
        report.dropped_events = self.stats.dropped_fault_events.load(Ordering::Relaxed);

        if !report.is_empty() {
            log::warn!(
                "Audio thread replaced {} non-finite samples with silence ({} events, {} undelivered)",
                report.non_finite_samples,
                report.events.len(),
                report.dropped_events
            );
        }
        report
    }

    // ============ Command Delivery ============

    fn note_deferred(&self, deferred: bool) {
        if deferred {
            self.stats.commands_deferred.fetch_add(1, Ordering::Relaxed);
            log::debug!("Command ring full, deferring");
        }
    }

    fn send_section(&mut self, index: usize, coeffs: BiquadCoeffs) {
        let sent = self.commands.push(EqCommand::SetSection { index, coeffs });
        self.pending.sections[index] = !sent;
        self.note_deferred(!sent);
    }

    /// Queue the section count behind every deferred section
    fn send_count(&mut self) {
        if self.pending.sections.iter().any(|&p| p) {
            if !self.pending.count {
                self.pending.count = true;
                self.note_deferred(true);
            }
            return;
        }
        let sent = self
            .commands
            .push(EqCommand::SetSectionCount(self.coeffs.len()));
        self.pending.count = !sent;
        self.note_deferred(!sent);
    }

    /// Resend whatever the ring could not take earlier
    ///
    /// Sections go first so a growing cascade never activates a slot before
    /// its coefficients arrive. Returns the number of commands still pending.
    pub fn retry_pending(&mut self) -> usize {
        if self.pending.is_empty() {
            return 0;
        }

        for index in 0..self.pending.sections.len() {
            if !self.pending.sections[index] {
                continue;
            }
            let coeffs = self
                .coeffs
                .get(index)
                .copied()
                .unwrap_or_else(BiquadCoeffs::bypass);
            if !self.commands.push(EqCommand::SetSection { index, coeffs }) {
                return self.pending.len();
            }
            self.pending.sections[index] = false;
        }

        if self.pending.count {
            if !self.commands.push(EqCommand::SetSectionCount(self.coeffs.len())) {
                return self.pending.len();
            }
            self.pending.count = false;
        }
        if self.pending.enabled {
            if !self.commands.push(EqCommand::SetEnabled(self.enabled)) {
                return self.pending.len();
            }
            self.pending.enabled = false;
        }
        if self.pending.flush {
            if !self.commands.push(EqCommand::Flush) {
                return self.pending.len();
            }
            self.pending.flush = false;
        }

        log::debug!("Deferred commands delivered");
        0
    }
}

impl std::fmt::Debug for EqController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EqController")
            .field("bands", &self.bands.len())
            .field("enabled", &self.enabled)
            .field("sample_rate", &self.sample_rate)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::{CommandConsumer, CommandQueue, FaultQueue};

    fn controller(capacity: usize) -> (EqController, CommandConsumer) {
        let (tx, rx) = CommandQueue::new(capacity).split();
        let (_fault_tx, fault_rx) = FaultQueue::new(4).split();
        let controller = EqController::new(
            48000.0,
            8,
            200,
            tx,
            fault_rx,
            Arc::new(EngineStats::default()),
        );
        (controller, rx)
    }

    fn drain(rx: &mut CommandConsumer) -> Vec<EqCommand> {
        std::iter::from_fn(|| rx.pop()).collect()
    }

    #[test]
    fn test_apply_band_set_sends_sections_then_count() {
        let (mut ctl, mut rx) = controller(64);
        let bands = BandSet::from_bands(vec![
            Band::bell(1000.0, 6.0, 1.0),
            Band::high_pass(40.0, 0.707),
        ])
        .unwrap();
        ctl.apply_band_set(bands).unwrap();

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 3);
        assert!(matches!(sent[0], EqCommand::SetSection { index: 0, .. }));
        assert!(matches!(sent[1], EqCommand::SetSection { index: 1, .. }));
        assert_eq!(sent[2], EqCommand::SetSectionCount(2));
    }

    #[test]
    fn test_unchanged_sections_not_resent() {
        let (mut ctl, mut rx) = controller(64);
        let mut bands = BandSet::flat_graphic();
        ctl.apply_band_set(bands.clone()).unwrap();
        drain(&mut rx);

        bands.get_mut(3).unwrap().set_gain_db(4.0);
        ctl.apply_band_set(bands).unwrap();
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], EqCommand::SetSection { index: 3, .. }));
    }

    #[test]
    fn test_too_many_bands() {
        let (mut ctl, _rx) = controller(64);
        let bands = BandSet::from_bands(vec![Band::default(); 9]).unwrap();
        assert!(matches!(
            ctl.apply_band_set(bands),
            Err(AeqError::TooManyBands { requested: 9, max: 8 })
        ));
    }

    #[test]
    fn test_update_band() {
        let (mut ctl, mut rx) = controller(64);
        ctl.apply_band_set(BandSet::from_bands(vec![Band::bell(500.0, 0.0, 1.0)]).unwrap())
            .unwrap();
        drain(&mut rx);

        ctl.update_band(0, |b| b.set_gain_db(9.0)).unwrap();
        assert_eq!(ctl.bands().get(0).unwrap().gain_db(), 9.0);
        let sent = drain(&mut rx);
        assert_eq!(
            sent,
            vec![EqCommand::SetSection {
                index: 0,
                coeffs: BiquadCoeffs::peaking(500.0, 1.0, 9.0, 48000.0)
            }]
        );
        assert!(ctl.update_band(5, |_| {}).is_err());
        assert!(ctl.set_band(5, Band::default()).is_err());
    }

    #[test]
    fn test_full_ring_defers_and_retries() {
        let (mut ctl, mut rx) = controller(4);
        let six = BandSet::from_bands(BandSet::flat_graphic().bands()[..6].to_vec()).unwrap();
        ctl.apply_band_set(six).unwrap();
        // 6 sections + count, only 4 fit
        assert_eq!(ctl.pending_commands(), 3);
        assert_eq!(drain(&mut rx).len(), 4);

        assert_eq!(ctl.retry_pending(), 0);
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[2], EqCommand::SetSectionCount(6));
        assert_eq!(ctl.stats().snapshot().commands_deferred, 3);
    }

    #[test]
    fn test_count_never_overtakes_deferred_section() {
        let (mut ctl, mut rx) = controller(1);
        let c = BiquadCoeffs::peaking(1000.0, 1.0, 3.0, 48000.0);
        ctl.coeffs = vec![c, c];

        ctl.send_section(0, c);
        ctl.send_section(1, c);
        assert!(ctl.pending.sections[1]);

        // Audio side drains between the section push and the count push
        assert_eq!(drain(&mut rx).len(), 1);
        ctl.send_count();
        assert!(drain(&mut rx).is_empty());
        assert_eq!(ctl.pending_commands(), 2);

        assert_eq!(ctl.retry_pending(), 1);
        assert_eq!(
            drain(&mut rx),
            vec![EqCommand::SetSection { index: 1, coeffs: c }]
        );
        assert_eq!(ctl.retry_pending(), 0);
        assert_eq!(drain(&mut rx), vec![EqCommand::SetSectionCount(2)]);
    }

    #[test]
    fn test_grow_with_full_ring_keeps_sections_first() {
        let (mut ctl, mut rx) = controller(3);
        let bands = BandSet::flat_graphic();
        ctl.apply_band_set(BandSet::from_bands(bands.bands()[..2].to_vec()).unwrap())
            .unwrap();
        drain(&mut rx);

        let mut grown = BandSet::from_bands(bands.bands()[..5].to_vec()).unwrap();
        grown.get_mut(0).unwrap().set_gain_db(6.0);
        ctl.apply_band_set(grown).unwrap();

        // Replay delivery the way the audio side sees it
        let mut delivered = Vec::new();
        for _ in 0..8 {
            delivered.extend(drain(&mut rx));
            if ctl.retry_pending() == 0 {
                delivered.extend(drain(&mut rx));
                break;
            }
        }
        let count_at = delivered
            .iter()
            .position(|c| *c == EqCommand::SetSectionCount(5))
            .unwrap();
        for index in 2..5 {
            let section_at = delivered
                .iter()
                .position(|c| matches!(c, EqCommand::SetSection { index: i, .. } if *i == index))
                .unwrap();
            assert!(section_at < count_at, "section {} after count", index);
        }
        assert_eq!(ctl.pending_commands(), 0);
    }

    #[test]
    fn test_disabled_response_is_flat() {
        let (mut ctl, _rx) = controller(64);
        ctl.apply_band_set(BandSet::from_bands(vec![Band::bell(1000.0, 12.0, 1.0)]).unwrap())
            .unwrap();
        let on = ctl.response_at(&[1000.0]).unwrap();
        assert!((on.points()[0].magnitude_db - 12.0).abs() < 1e-6);

        ctl.set_enabled(false);
        let off = ctl.response_curve().unwrap();
        assert_eq!(off.len(), 200);
        assert!(off.iter().all(|p| p.magnitude_db == 0.0));
    }

    #[test]
    fn test_sample_rate_change_redesigns() {
        let (mut ctl, mut rx) = controller(64);
        ctl.apply_band_set(BandSet::from_bands(vec![Band::bell(1000.0, 6.0, 1.0)]).unwrap())
            .unwrap();
        drain(&mut rx);

        assert!(ctl.set_sample_rate(-1.0).is_err());
        ctl.set_sample_rate(96000.0).unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![EqCommand::SetSection {
                index: 0,
                coeffs: BiquadCoeffs::peaking(1000.0, 1.0, 6.0, 96000.0)
            }]
        );
    }

    #[test]
    fn test_add_and_remove_band() {
        let (mut ctl, _rx) = controller(64);
        assert_eq!(ctl.add_band(Band::bell(100.0, 3.0, 1.0)).unwrap(), 0);
        assert_eq!(ctl.add_band(Band::bell(200.0, 3.0, 1.0)).unwrap(), 1);
        let removed = ctl.remove_band(0).unwrap();
        assert_eq!(removed.frequency(), 100.0);
        assert_eq!(ctl.bands().len(), 1);
        assert_eq!(ctl.coeffs().len(), 1);
        assert!(ctl.remove_band(4).is_err());
    }
}
