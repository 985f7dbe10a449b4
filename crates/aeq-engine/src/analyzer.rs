//! Spectrum analyzer runner
//!
//! Drives a `SpectrumEstimator` from a worker thread at a fixed refresh rate,
//! independent of the audio block rate. Frames go to a shared "latest" slot
//! and to any number of bounded subscriber channels.
//!
//! ```text
//! Stopped --start()--> Running --stop()--> Stopped
//! ```
//! Both transitions are idempotent. `stop()` joins the worker before
//! returning, so the tap consumer and estimator are back in the analyzer
//! and nothing is left running against them.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use aeq_core::{AeqError, AeqResult};
use aeq_dsp::{SpectrumEstimator, SpectrumFrame};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use parking_lot::{Mutex, RwLock};

use crate::config::AnalyzerConfig;
use crate::handoff::{EngineStats, TapConsumer};

/// Analyzer lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerState {
    Stopped,
    Running,
}

/// Shortest gap in the tap that counts as audio having stopped
pub const MIN_SILENCE_TIMEOUT: Duration = Duration::from_millis(100);

/// Parts the worker borrows while running
struct Parts {
    tap: TapConsumer,
    estimator: SpectrumEstimator,
    /// Time between ticks
    interval: Duration,
    /// Ticks without new samples for this long mean no audio is flowing
    silence_after: Duration,
    idle: Duration,
}

/// Frame outputs shared between the worker and readers
struct Outputs {
    latest: RwLock<SpectrumFrame>,
    subscribers: Mutex<Vec<Sender<SpectrumFrame>>>,
    stats: Arc<EngineStats>,
}

impl Outputs {
    fn publish(&self, frame: SpectrumFrame) {
        self.subscribers
            .lock()
            .retain(|tx| match tx.try_send(frame.clone()) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            });
        *self.latest.write() = frame;
        self.stats.frames_published.fetch_add(1, Ordering::Relaxed);
    }
}

/// One analyzer tick: drain the tap and compute a frame
///
/// Audio blocks longer than the tick interval leave some ticks with nothing
/// to drain; those recompute from the history they have. Only a gap of
/// `silence_after` drops the history and yields silent frames.
fn tick(parts: &mut Parts) -> SpectrumFrame {
    if parts.tap.drain_into(&mut parts.estimator) > 0 {
        parts.idle = Duration::ZERO;
        return parts.estimator.compute_frame();
    }

    parts.idle = parts.idle.saturating_add(parts.interval);
    if parts.idle >= parts.silence_after {
        parts.estimator.clear();
        parts.estimator.silent_frame()
    } else {
        parts.estimator.compute_frame()
    }
}

/// Background spectrum analyzer
pub struct SpectrumAnalyzer {
    config: AnalyzerConfig,
    parts: Option<Parts>,
    outputs: Arc<Outputs>,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<Parts>>,
}

impl SpectrumAnalyzer {
    pub(crate) fn new(
        config: AnalyzerConfig,
        tap: TapConsumer,
        estimator: SpectrumEstimator,
        stats: Arc<EngineStats>,
    ) -> Self {
        let silent = SpectrumFrame::silent(estimator.band_frequencies());
        // One full FFT window, but never less than the minimum
        let window = Duration::from_secs_f64(
            estimator.fft_size() as f64 / estimator.config().sample_rate,
        );
        let parts = Parts {
            tap,
            estimator,
            interval: config.refresh_interval(),
            silence_after: window.max(MIN_SILENCE_TIMEOUT),
            idle: Duration::ZERO,
        };
        Self {
            config,
            parts: Some(parts),
            outputs: Arc::new(Outputs {
                latest: RwLock::new(silent),
                subscribers: Mutex::new(Vec::new()),
                stats,
            }),
            stop_tx: None,
            worker: None,
        }
    }

    pub fn state(&self) -> AnalyzerState {
        if self.worker.is_some() {
            AnalyzerState::Running
        } else {
            AnalyzerState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == AnalyzerState::Running
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Most recently published frame
    pub fn latest_frame(&self) -> SpectrumFrame {
        self.outputs.latest.read().clone()
    }

    /// Receive every frame published from now on
    ///
    /// The channel holds `capacity` frames; a subscriber that falls behind
    /// misses frames rather than slowing the analyzer.
    pub fn subscribe(&self, capacity: usize) -> Receiver<SpectrumFrame> {
        let (tx, rx) = bounded(capacity.max(1));
        self.outputs.subscribers.lock().push(tx);
        rx
    }

    /// Start the refresh cadence; no effect if already running
    pub fn start(&mut self) -> AeqResult<()> {
        if self.is_running() {
            return Ok(());
        }
        let mut parts = self
            .parts
            .take()
            .ok_or_else(|| AeqError::State("analyzer lost its audio tap".into()))?;

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let outputs = self.outputs.clone();
        let interval = self.config.refresh_interval();

        let handle = thread::Builder::new()
            .name("aeq-spectrum".into())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let frame = tick(&mut parts);
                            outputs.publish(frame);
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::info!("Spectrum analyzer thread exiting");
                parts
            })
            .map_err(|e| AeqError::State(format!("failed to spawn analyzer thread: {e}")))?;

        self.stop_tx = Some(stop_tx);
        self.worker = Some(handle);
        log::info!(
            "Spectrum analyzer started ({:.0} Hz refresh)",
            1.0 / interval.as_secs_f64()
        );
        Ok(())
    }

    /// Halt the cadence and quiesce the worker; no effect if stopped
    pub fn stop(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        match handle.join() {
            Ok(mut parts) => {
                parts.estimator.clear();
                parts.idle = Duration::ZERO;
                let silent = parts.estimator.silent_frame();
                self.parts = Some(parts);
                self.outputs.publish(silent);
            }
            Err(_) => {
                log::error!("Spectrum analyzer thread panicked");
                let silent = SpectrumFrame::silent(&self.latest_frame().frequencies);
                self.outputs.publish(silent);
            }
        }
        log::info!("Spectrum analyzer stopped");
    }

    /// Compute and publish one frame synchronously while stopped
    pub fn tick_now(&mut self) -> AeqResult<SpectrumFrame> {
        let parts = self
            .parts
            .as_mut()
            .ok_or_else(|| AeqError::State("analyzer is running".into()))?;
        let frame = tick(parts);
        self.outputs.publish(frame.clone());
        Ok(frame)
    }
}

impl Drop for SpectrumAnalyzer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
