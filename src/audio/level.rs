//! Continuous amplitude metering for UI consumption.
//!
//! Derives a bounded 0-100 level from a frequency-domain snapshot of the
//! mixed bus on a fixed cadence, decoupled from the audio callback. This
//! value is cosmetic; the segmentation engine computes its own RMS from raw
//! time-domain frames on a different scale, and the two must not be confused.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Samples retained for one spectral analysis pass.
pub(super) const ANALYSIS_WINDOW: usize = 256;
/// Bins computed per pass; half the window, matching a real-valued spectrum.
pub(super) const ANALYSIS_BINS: usize = 128;
const BYTE_SCALE: f32 = 255.0;

/// Latest-value level handle. Readers get whatever the monitor last
/// published; there is no queue and slow consumers miss updates by design.
#[derive(Clone, Debug)]
pub struct LevelHandle {
    level: Arc<AtomicU32>,
}

impl LevelHandle {
    pub fn new() -> Self {
        Self {
            level: Arc::new(AtomicU32::new(0)),
        }
    }

    pub(super) fn set(&self, level: u8) {
        self.level.store(u32::from(level), Ordering::Relaxed);
    }

    /// Current level in `0..=100`.
    pub fn get(&self) -> u8 {
        self.level.load(Ordering::Relaxed).min(100) as u8
    }
}

impl Default for LevelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared window of recent mono bus samples. The pump publishes with
/// `try_lock` and skips on contention, so the audio path never waits on the
/// monitor; the monitor clones the window on its own schedule.
#[derive(Clone)]
pub(super) struct AnalysisSnapshot {
    window: Arc<Mutex<Vec<f32>>>,
}

impl AnalysisSnapshot {
    pub(super) fn new() -> Self {
        Self {
            window: Arc::new(Mutex::new(vec![0.0; ANALYSIS_WINDOW])),
        }
    }

    /// Publish the tail of `mono` as the current analysis window. Skipped
    /// silently when the monitor holds the lock.
    pub(super) fn publish(&self, mono: &[f32]) {
        if let Ok(mut window) = self.window.try_lock() {
            window.clear();
            if mono.len() >= ANALYSIS_WINDOW {
                window.extend_from_slice(&mono[mono.len() - ANALYSIS_WINDOW..]);
            } else {
                window.resize(ANALYSIS_WINDOW - mono.len(), 0.0);
                window.extend_from_slice(mono);
            }
        }
    }

    pub(super) fn publish_silence(&self) {
        if let Ok(mut window) = self.window.try_lock() {
            window.clear();
            window.resize(ANALYSIS_WINDOW, 0.0);
        }
    }

    pub(super) fn read(&self) -> Vec<f32> {
        self.window
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Goertzel power of one frequency in `samples`, normalized by length.
pub(super) fn goertzel_power(samples: &[f32], sample_rate: u32, target_hz: f32) -> f32 {
    if samples.is_empty() || sample_rate == 0 {
        return 0.0;
    }
    let len = samples.len() as f32;
    let normalized_freq = target_hz / sample_rate as f32;
    let omega = 2.0 * std::f32::consts::PI * normalized_freq;
    let coeff = 2.0 * omega.cos();
    let mut q1 = 0.0;
    let mut q2 = 0.0;
    for &sample in samples {
        let q0 = coeff * q1 - q2 + sample;
        q2 = q1;
        q1 = q0;
    }
    let power = q1 * q1 + q2 * q2 - coeff * q1 * q2;
    (power / len).max(0.0)
}

/// Byte-scale (0-255) magnitude per analysis bin, one Goertzel pass each.
/// A full-scale sine lands at ~255 in its bin.
pub(super) fn band_magnitudes(window: &[f32], sample_rate: u32) -> Vec<f32> {
    let bin_width = sample_rate as f32 / ANALYSIS_WINDOW as f32;
    let len = window.len().max(1) as f32;
    (0..ANALYSIS_BINS)
        .map(|bin| {
            let freq = bin as f32 * bin_width;
            // goertzel_power is already normalized by length once; a second
            // division by length recovers the tone amplitude.
            let amplitude = 2.0 * (goertzel_power(window, sample_rate, freq) / len).sqrt();
            (amplitude * BYTE_SCALE).min(BYTE_SCALE)
        })
        .collect()
}

/// Map a window of mono samples to the 0-100 UI level: RMS over byte-scale
/// bin magnitudes, scaled by 100/128.
pub(super) fn level_from_window(window: &[f32], sample_rate: u32) -> u8 {
    if window.is_empty() || sample_rate == 0 {
        return 0;
    }
    let magnitudes = band_magnitudes(window, sample_rate);
    let sum: f32 = magnitudes.iter().map(|m| m * m).sum();
    let rms = (sum / magnitudes.len() as f32).sqrt();
    ((rms / 128.0) * 100.0).round().min(100.0) as u8
}

/// Spawn the monitor loop: read the snapshot, publish a level, sleep one
/// cadence. Lower priority than the pump in the sense that it only ever
/// reads; skipping passes under load costs nothing but meter smoothness.
pub(super) fn spawn_monitor(
    snapshot: AnalysisSnapshot,
    handle: LevelHandle,
    sample_rate: u32,
    cadence_ms: u64,
    stop: Arc<std::sync::atomic::AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let cadence = Duration::from_millis(cadence_ms.max(1));
        while !stop.load(Ordering::Relaxed) {
            let window = snapshot.read();
            handle.set(level_from_window(&window, sample_rate));
            thread::sleep(cadence);
        }
        handle.set(0);
    })
}
