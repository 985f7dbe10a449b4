//! Cascade processor
//!
//! Chains biquad sections in series. All storage is sized at construction;
//! nothing here allocates, locks or logs once the cascade exists, so it can
//! live inside an audio callback.

use aeq_core::{IoSample, Sample, to_internal, to_io};

use crate::biquad::{BiquadCoeffs, BiquadTDF2};
use crate::{MonoProcessor, Processor};

/// One slot of the cascade
#[derive(Debug, Clone, Default)]
struct Section {
    filter: BiquadTDF2,
    bypassed: bool,
}

/// Series chain of up to `capacity` biquad sections
#[derive(Debug, Clone)]
pub struct Cascade {
    sections: Vec<Section>,
    active: usize,
    /// Non-finite outputs replaced by silence since the last `take_non_finite`
    non_finite: u64,
}

impl Cascade {
    /// Cascade with room for `capacity` sections, none active
    pub fn new(capacity: usize) -> Self {
        Self {
            sections: vec![
                Section {
                    filter: BiquadTDF2::new(),
                    bypassed: true,
                };
                capacity
            ],
            active: 0,
            non_finite: 0,
        }
    }

    /// Cascade running exactly the given coefficient sets
    pub fn with_coeffs(coeffs: &[BiquadCoeffs]) -> Self {
        let mut cascade = Self::new(coeffs.len());
        cascade.set_len(coeffs.len());
        for (i, c) in coeffs.iter().enumerate() {
            cascade.set_section(i, *c);
        }
        cascade
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.sections.len()
    }

    /// Number of active sections
    #[inline]
    pub fn len(&self) -> usize {
        self.active
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    /// Activate the first `len` sections (clamped to capacity)
    ///
    /// Sections that drop out are flushed so they start clean if reused.
    pub fn set_len(&mut self, len: usize) {
        let len = len.min(self.sections.len());
        for section in &mut self.sections[len..] {
            section.filter.reset();
        }
        self.active = len;
    }

    /// Swap in new coefficients for one section, keeping its state
    ///
    /// The pass-through set marks the section bypassed and zeroes its state.
    /// Returns false if `index` is beyond capacity.
    pub fn set_section(&mut self, index: usize, coeffs: BiquadCoeffs) -> bool {
        let Some(section) = self.sections.get_mut(index) else {
            return false;
        };
        section.filter.set_coeffs(coeffs);
        let bypass = coeffs.is_bypass();
        if bypass && !section.bypassed {
            section.filter.reset();
        }
        section.bypassed = bypass;
        true
    }

    /// Route a section straight through (state zeroed) or re-engage it
    pub fn set_bypass(&mut self, index: usize, bypass: bool) {
        if let Some(section) = self.sections.get_mut(index) {
            if bypass && !section.bypassed {
                section.filter.reset();
            }
            section.bypassed = bypass;
        }
    }

    pub fn is_bypassed(&self, index: usize) -> bool {
        self.sections.get(index).is_none_or(|s| s.bypassed)
    }

    /// Coefficients of the active sections, in processing order
    pub fn coeffs(&self) -> impl Iterator<Item = BiquadCoeffs> + '_ {
        self.sections[..self.active].iter().map(|s| *s.filter.coeffs())
    }

    /// Delay-line state of one section
    pub fn section_state(&self, index: usize) -> Option<(f64, f64)> {
        self.sections.get(index).map(|s| s.filter.state())
    }

    /// Process a block of I/O samples in place (f64 internally)
    pub fn process_block_io(&mut self, buffer: &mut [IoSample]) {
        for sample in buffer.iter_mut() {
            *sample = to_io(self.process_sample(to_internal(*sample)));
        }
    }

    /// Process an interleaved frame slice, one channel of it
    pub fn process_strided(&mut self, buffer: &mut [IoSample], offset: usize, stride: usize) {
        if stride == 0 {
            return;
        }
        for sample in buffer.iter_mut().skip(offset).step_by(stride) {
            *sample = to_io(self.process_sample(to_internal(*sample)));
        }
    }

    /// Non-finite outputs since the last call, resetting the counter
    #[inline]
    pub fn take_non_finite(&mut self) -> u64 {
        std::mem::take(&mut self.non_finite)
    }
}

impl Processor for Cascade {
    fn reset(&mut self) {
        for section in &mut self.sections {
            section.filter.reset();
        }
    }
}

impl MonoProcessor for Cascade {
    /// Run one sample through every active section
    ///
    /// A non-finite result is replaced by silence, counted, and the delay
    /// lines are flushed so the chain recovers on the next sample.
    #[inline]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let mut out = input;
        for section in &mut self.sections[..self.active] {
            if !section.bypassed {
                out = section.filter.process_sample(out);
            }
        }

        if out.is_finite() {
            out
        } else {
            self.non_finite += 1;
            self.reset();
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48000.0;

    #[test]
    fn test_empty_cascade_is_identity() {
        let mut cascade = Cascade::new(8);
        let mut buffer = [0.25, -0.5, 1.0, 0.0];
        cascade.process_block(&mut buffer);
        assert_eq!(buffer, [0.25, -0.5, 1.0, 0.0]);
    }

    #[test]
    fn test_bypassed_sections_are_identity() {
        let mut cascade = Cascade::with_coeffs(&[BiquadCoeffs::bypass(); 10]);
        assert_eq!(cascade.len(), 10);
        for i in 0..1000 {
            let x = ((i * 7919) % 2001) as f64 / 1000.0 - 1.0;
            assert_eq!(cascade.process_sample(x), x);
        }
    }

    #[test]
    fn test_set_len_clamps_to_capacity() {
        let mut cascade = Cascade::new(4);
        cascade.set_len(10);
        assert_eq!(cascade.len(), 4);
        assert!(!cascade.set_section(4, BiquadCoeffs::bypass()));
    }

    #[test]
    fn test_swap_keeps_state() {
        let mut cascade = Cascade::with_coeffs(&[BiquadCoeffs::lowpass(500.0, 0.707, SR)]);
        for _ in 0..64 {
            cascade.process_sample(0.8);
        }
        let before = cascade.section_state(0).unwrap();
        cascade.set_section(0, BiquadCoeffs::lowpass(800.0, 0.707, SR));
        assert_eq!(cascade.section_state(0).unwrap(), before);
    }

    #[test]
    fn test_bypass_zeroes_state() {
        let mut cascade = Cascade::with_coeffs(&[BiquadCoeffs::peaking(1000.0, 1.0, 6.0, SR)]);
        for _ in 0..64 {
            cascade.process_sample(0.8);
        }
        cascade.set_bypass(0, true);
        assert_eq!(cascade.section_state(0).unwrap(), (0.0, 0.0));
        assert!(cascade.is_bypassed(0));
        assert_eq!(cascade.process_sample(0.3), 0.3);

        cascade.set_bypass(0, false);
        assert!(!cascade.is_bypassed(0));
    }

    #[test]
    fn test_non_finite_output_becomes_silence() {
        let mut cascade = Cascade::with_coeffs(&[BiquadCoeffs::lowpass(1000.0, 0.707, SR)]);
        assert_eq!(cascade.process_sample(f64::NAN), 0.0);
        assert_eq!(cascade.take_non_finite(), 1);
        assert_eq!(cascade.take_non_finite(), 0);

        // State was flushed, so the chain is usable again
        let out = cascade.process_sample(0.5);
        assert!(out.is_finite());
        assert_eq!(cascade.section_state(0).map(|(a, b)| a.is_finite() && b.is_finite()), Some(true));
    }

    #[test]
    fn test_unstable_section_is_contained() {
        let runaway = BiquadCoeffs {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: -2.5,
            a2: 1.5,
        };
        let mut cascade = Cascade::with_coeffs(&[runaway]);
        let mut faults = 0;
        for _ in 0..20000 {
            let y = cascade.process_sample(1.0);
            assert!(y.is_finite());
            faults += cascade.take_non_finite();
        }
        assert!(faults > 0);
    }

    #[test]
    fn test_io_block_matches_f64_path() {
        let coeffs = [BiquadCoeffs::peaking(2000.0, 2.0, -6.0, SR)];
        let mut a = Cascade::with_coeffs(&coeffs);
        let mut b = Cascade::with_coeffs(&coeffs);

        let mut io: Vec<f32> = (0..256).map(|i| (i as f32 * 0.05).sin()).collect();
        let mut reference: Vec<f64> = io.iter().map(|&s| s as f64).collect();

        a.process_block_io(&mut io);
        b.process_block(&mut reference);
        for (x, y) in io.iter().zip(&reference) {
            assert_eq!(*x, *y as f32);
        }
    }

    #[test]
    fn test_strided_processes_one_channel() {
        let mut cascade = Cascade::with_coeffs(&[BiquadCoeffs::highpass(1000.0, 0.707, SR)]);
        let mut interleaved = vec![1.0_f32; 512];
        cascade.process_strided(&mut interleaved, 1, 2);
        // Left untouched, right high-passed
        assert!(interleaved.iter().step_by(2).all(|&s| s == 1.0));
        assert!(interleaved[511].abs() < 0.05);
    }
}
