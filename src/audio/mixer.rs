//! Channel router/mixer: system audio to the left channel, conditioned
//! microphone audio to the right, one synthetic stereo bus out.
//!
//! Gains are the only state mutated from outside the pump; they are stored as
//! f32 bits in an `AtomicU32` so command threads can flip them while the pump
//! reads them per block without taking a lock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

// Fixed conditioning parameters for the microphone path. The high-pass sits
// below the speech band to strip rumble; the compressor normalizes speech
// level without pumping.
const HIGH_PASS_CUTOFF_HZ: f32 = 80.0;
const COMPRESSOR_THRESHOLD: f32 = 0.5;
const COMPRESSOR_RATIO: f32 = 4.0;
const COMPRESSOR_ATTACK_MS: f32 = 5.0;
const COMPRESSOR_RELEASE_MS: f32 = 50.0;

/// Lock-free gain scalar in `[0, 1]` for one logical channel. Cloning shares
/// the underlying value, so a handle can live on a command thread while the
/// pump reads it.
#[derive(Clone, Debug)]
pub struct ChannelGain {
    bits: Arc<AtomicU32>,
}

impl ChannelGain {
    pub fn new(initial: f32) -> Self {
        Self {
            bits: Arc::new(AtomicU32::new(initial.clamp(0.0, 1.0).to_bits())),
        }
    }

    pub fn set(&self, gain: f32) {
        self.bits
            .store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// The pair of gain handles a session exposes. Mutating the microphone gain
/// never touches device resources; sources stay open and only the scalar
/// changes.
#[derive(Clone, Debug)]
pub struct MixerGains {
    pub system: ChannelGain,
    pub mic: ChannelGain,
}

impl MixerGains {
    pub fn new() -> Self {
        Self {
            system: ChannelGain::new(1.0),
            mic: ChannelGain::new(0.0),
        }
    }
}

impl Default for MixerGains {
    fn default() -> Self {
        Self::new()
    }
}

/// One-pole high-pass. Removes DC offset and low rumble from the mic path.
pub(super) struct HighPass {
    r: f32,
    x_prev: f32,
    y_prev: f32,
}

impl HighPass {
    pub(super) fn new(cutoff_hz: f32, sample_rate: u32) -> Self {
        let sr = sample_rate.max(1) as f32;
        Self {
            r: (-2.0 * std::f32::consts::PI * cutoff_hz / sr).exp(),
            x_prev: 0.0,
            y_prev: 0.0,
        }
    }

    fn process(&mut self, x: f32) -> f32 {
        let y = x - self.x_prev + self.r * self.y_prev;
        self.x_prev = x;
        self.y_prev = y;
        y
    }
}

/// Feed-forward dynamics compressor with a fixed knee. An envelope follower
/// tracks block-to-block level; samples above the threshold are scaled down
/// by the ratio.
pub(super) struct Compressor {
    threshold: f32,
    ratio: f32,
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
}

impl Compressor {
    pub(super) fn new(sample_rate: u32) -> Self {
        let sr = sample_rate.max(1) as f32;
        let coeff = |ms: f32| (-1.0 / (ms * 0.001 * sr)).exp();
        Self {
            threshold: COMPRESSOR_THRESHOLD,
            ratio: COMPRESSOR_RATIO,
            attack_coeff: coeff(COMPRESSOR_ATTACK_MS),
            release_coeff: coeff(COMPRESSOR_RELEASE_MS),
            envelope: 0.0,
        }
    }

    fn process(&mut self, x: f32) -> f32 {
        let magnitude = x.abs();
        let coeff = if magnitude > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = coeff * self.envelope + (1.0 - coeff) * magnitude;

        if self.envelope <= self.threshold || self.envelope <= f32::EPSILON {
            return x;
        }
        let compressed = self.threshold + (self.envelope - self.threshold) / self.ratio;
        x * (compressed / self.envelope)
    }
}

/// The per-source filter chain applied to microphone audio before gain
/// scaling. Built once when the mic is first enabled; state persists across
/// blocks so the filters stay warm through gain toggles.
pub(super) struct MicConditioner {
    high_pass: HighPass,
    compressor: Compressor,
}

impl MicConditioner {
    pub(super) fn new(sample_rate: u32) -> Self {
        Self {
            high_pass: HighPass::new(HIGH_PASS_CUTOFF_HZ, sample_rate),
            compressor: Compressor::new(sample_rate),
        }
    }

    pub(super) fn process_block(&mut self, block: &mut [f32]) {
        for sample in block.iter_mut() {
            let filtered = self.high_pass.process(*sample);
            *sample = self.compressor.process(filtered);
        }
    }
}

/// Scale proportionally instead of hard-clipping so overdriven input does not
/// turn into edge distortion.
fn soft_clip(sample: f32) -> f32 {
    let magnitude = sample.abs();
    if magnitude > 1.0 {
        sample / magnitude
    } else {
        sample
    }
}

/// Interleave two mono blocks into `out` as a stereo bus: system on the left,
/// microphone on the right, each scaled by its gain. A short mic block is
/// padded with silence; channels are never summed together.
pub(super) fn mix_stereo(
    system: &[f32],
    mic: &[f32],
    system_gain: f32,
    mic_gain: f32,
    out: &mut Vec<f32>,
) {
    out.clear();
    out.reserve(system.len() * 2);
    for (i, &sys_sample) in system.iter().enumerate() {
        let mic_sample = mic.get(i).copied().unwrap_or(0.0);
        out.push(soft_clip(sys_sample * system_gain));
        out.push(soft_clip(mic_sample * mic_gain));
    }
}

/// Mono downmix of an interleaved stereo block, used only for metering and
/// silence classification; the bus itself stays channel-preserving.
pub(super) fn downmix_block(stereo: &[f32], out: &mut Vec<f32>) {
    out.clear();
    out.reserve(stereo.len() / 2);
    for pair in stereo.chunks_exact(2) {
        out.push((pair[0] + pair[1]) * 0.5);
    }
}
