//! Lock-free handoff between the control and audio contexts
//!
//! Three single-producer single-consumer rings:
//! - commands, control → audio, each carrying a complete coefficient set
//! - fault events, audio → control
//! - analyzer tap, audio → analyzer thread
//!
//! Every audio-side operation here is wait-free and allocation-free.

use std::sync::atomic::{AtomicU64, Ordering};

use aeq_dsp::{BiquadCoeffs, SpectrumEstimator};
use rtrb::{Consumer, Producer, RingBuffer};
use serde::Serialize;

// ============ Commands ============

/// Control → audio message
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EqCommand {
    /// Swap one section's coefficients, keeping its state
    SetSection { index: usize, coeffs: BiquadCoeffs },
    /// Number of active sections
    SetSectionCount(usize),
    /// Master enable; disabling flushes all state
    SetEnabled(bool),
    /// Zero every section's state
    Flush,
}

/// Lock-free command queue (control → audio)
pub struct CommandQueue {
    producer: Producer<EqCommand>,
    consumer: Consumer<EqCommand>,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        let (producer, consumer) = RingBuffer::new(capacity);
        Self { producer, consumer }
    }

    /// Split into producer and consumer
    pub fn split(self) -> (CommandProducer, CommandConsumer) {
        (
            CommandProducer {
                producer: self.producer,
            },
            CommandConsumer {
                consumer: self.consumer,
            },
        )
    }
}

pub struct CommandProducer {
    producer: Producer<EqCommand>,
}

impl CommandProducer {
    /// Push a command (non-blocking); false if the ring is full
    pub fn push(&mut self, command: EqCommand) -> bool {
        self.producer.push(command).is_ok()
    }

    /// Free slots
    pub fn slots(&self) -> usize {
        self.producer.slots()
    }
}

pub struct CommandConsumer {
    consumer: Consumer<EqCommand>,
}

impl CommandConsumer {
    /// Pop a command (non-blocking)
    #[inline]
    pub fn pop(&mut self) -> Option<EqCommand> {
        self.consumer.pop().ok()
    }
}

// ============ Faults ============

/// Kind of fault raised on the audio thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FaultKind {
    /// Cascade produced NaN/Inf; the samples were replaced by silence
    NonFiniteOutput,
}

/// Audio → control fault report for one block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FaultEvent {
    pub kind: FaultKind,
    /// Affected samples in the block
    pub samples: u64,
    /// Block counter at the time of the fault
    pub block: u64,
}

/// Lock-free fault queue (audio → control)
pub struct FaultQueue {
    producer: Producer<FaultEvent>,
    consumer: Consumer<FaultEvent>,
}

impl FaultQueue {
    pub fn new(capacity: usize) -> Self {
        let (producer, consumer) = RingBuffer::new(capacity);
        Self { producer, consumer }
    }

    pub fn split(self) -> (FaultProducer, FaultConsumer) {
        (
            FaultProducer {
                producer: self.producer,
            },
            FaultConsumer {
                consumer: self.consumer,
            },
        )
    }
}

pub struct FaultProducer {
    producer: Producer<FaultEvent>,
}

impl FaultProducer {
    #[inline]
    pub fn push(&mut self, event: FaultEvent) -> bool {
        self.producer.push(event).is_ok()
    }
}

pub struct FaultConsumer {
    consumer: Consumer<FaultEvent>,
}

impl FaultConsumer {
    pub fn pop(&mut self) -> Option<FaultEvent> {
        self.consumer.pop().ok()
    }
}

// ============ Analyzer Tap ============

/// Audio → analyzer sample ring
pub struct TapQueue {
    producer: Producer<f32>,
    consumer: Consumer<f32>,
}

impl TapQueue {
    pub fn new(capacity: usize) -> Self {
        let (producer, consumer) = RingBuffer::new(capacity);
        Self { producer, consumer }
    }

    pub fn split(self) -> (TapProducer, TapConsumer) {
        (
            TapProducer {
                producer: self.producer,
            },
            TapConsumer {
                consumer: self.consumer,
            },
        )
    }
}

pub struct TapProducer {
    producer: Producer<f32>,
}

impl TapProducer {
    /// Copy as many samples as fit; returns how many were written
    #[inline]
    pub fn push_slice(&mut self, samples: &[f32]) -> usize {
        let n = samples.len().min(self.producer.slots());
        if n == 0 {
            return 0;
        }
        match self.producer.write_chunk_uninit(n) {
            Ok(chunk) => chunk.fill_from_iter(samples.iter().copied()),
            Err(_) => 0,
        }
    }
}

pub struct TapConsumer {
    consumer: Consumer<f32>,
}

impl TapConsumer {
    /// Samples waiting in the ring
    pub fn available(&self) -> usize {
        self.consumer.slots()
    }

    /// Move everything waiting into the estimator; returns the sample count
    pub fn drain_into(&mut self, estimator: &mut SpectrumEstimator) -> usize {
        let n = self.consumer.slots();
        if n == 0 {
            return 0;
        }
        match self.consumer.read_chunk(n) {
            Ok(chunk) => {
                let (first, second) = chunk.as_slices();
                estimator.push_samples_f32(first);
                estimator.push_samples_f32(second);
                chunk.commit_all();
                n
            }
            Err(_) => 0,
        }
    }

    /// Throw away everything waiting
    pub fn discard(&mut self) -> usize {
        let n = self.consumer.slots();
        match self.consumer.read_chunk(n) {
            Ok(chunk) => {
                chunk.commit_all();
                n
            }
            Err(_) => 0,
        }
    }
}

// ============ Stats ============

/// Counters shared by every engine part
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Audio blocks processed
    pub blocks_processed: AtomicU64,
    /// Commands applied on the audio side
    pub commands_applied: AtomicU64,
    /// Commands that found the ring full (later resent)
    pub commands_deferred: AtomicU64,
    /// Non-finite samples replaced by silence
    pub non_finite_samples: AtomicU64,
    /// Fault events lost to a full ring
    pub dropped_fault_events: AtomicU64,
    /// Tap samples lost to a full ring
    pub dropped_analyzer_samples: AtomicU64,
    /// Analyzer frames published
    pub frames_published: AtomicU64,
}

/// Plain copy of `EngineStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub blocks_processed: u64,
    pub commands_applied: u64,
    pub commands_deferred: u64,
    pub non_finite_samples: u64,
    pub dropped_fault_events: u64,
    pub dropped_analyzer_samples: u64,
    pub frames_published: u64,
}

impl EngineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            blocks_processed: self.blocks_processed.load(Ordering::Relaxed),
            commands_applied: self.commands_applied.load(Ordering::Relaxed),
            commands_deferred: self.commands_deferred.load(Ordering::Relaxed),
            non_finite_samples: self.non_finite_samples.load(Ordering::Relaxed),
            dropped_fault_events: self.dropped_fault_events.load(Ordering::Relaxed),
            dropped_analyzer_samples: self.dropped_analyzer_samples.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
        }
    }
}
