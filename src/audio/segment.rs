//! Segmentation engine: decides, per block of interleaved stereo frames,
//! whether the accumulated segment should be flushed.
//!
//! The engine owns no devices and no threads. It receives blocks and the
//! current wall-clock instant from its caller, which keeps it deterministic
//! under test and keeps every per-block operation O(block size).

use super::encode::{encode_wav, EncodedChunk};
use super::resample::resample_frames;
use super::TARGET_RATE;
use std::time::{Duration, Instant};

/// Multiplier applied to the raw block RMS before mapping to the 0-100
/// activity level, so quiet speech still clears UI-perceptible thresholds.
const LEVEL_BOOST: f32 = 4.0;

/// Tuning constants for segmentation, immutable for the life of a session.
#[derive(Debug, Clone)]
pub struct SegmentationPolicy {
    /// Activity threshold in level units (0-100); blocks above it count as
    /// speech.
    pub silence_threshold: u8,
    /// Quiet duration tolerated before a segment ends (milliseconds).
    pub silence_timeout_ms: u64,
    /// Hard upper bound on segment duration (milliseconds).
    pub max_segment_ms: u64,
    /// Minimum segment duration before a silence flush may fire
    /// (milliseconds); guards against flushing near-empty segments.
    pub min_segment_ms: u64,
}

impl Default for SegmentationPolicy {
    fn default() -> Self {
        Self {
            silence_threshold: 2,
            silence_timeout_ms: 2_000,
            max_segment_ms: 60_000,
            min_segment_ms: 1_000,
        }
    }
}

/// Map one block of interleaved stereo frames to a 0-100 activity level:
/// RMS over the per-frame mono average, boosted and clamped. A zero-frame
/// block is level 0, never a classification error.
pub(super) fn block_level(frames: &[f32]) -> u8 {
    let frame_count = frames.len() / 2;
    if frame_count == 0 {
        return 0;
    }
    let mut sum = 0.0f64;
    for pair in frames.chunks_exact(2) {
        let mono = f64::from((pair[0] + pair[1]) * 0.5);
        sum += mono * mono;
    }
    let rms = (sum / frame_count as f64).sqrt() as f32;
    ((rms * LEVEL_BOOST * 100.0).round()).min(100.0) as u8
}

/// Ordered frame blocks collected since the last flush, plus the counters
/// the flush rules need. Cleared atomically exactly once per flush.
pub(super) struct AccumulationBuffer {
    blocks: Vec<Vec<f32>>,
    total_frames: usize,
}

impl AccumulationBuffer {
    pub(super) fn new() -> Self {
        Self {
            blocks: Vec::new(),
            total_frames: 0,
        }
    }

    pub(super) fn append(&mut self, block: &[f32]) {
        self.total_frames += block.len() / 2;
        self.blocks.push(block.to_vec());
    }

    pub(super) fn is_empty(&self) -> bool {
        self.total_frames == 0
    }

    pub(super) fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// Drain every accumulated block into one contiguous buffer, leaving the
    /// accumulator empty for the next segment.
    pub(super) fn drain(&mut self) -> Vec<f32> {
        let mut frames = Vec::with_capacity(self.total_frames * 2);
        for block in self.blocks.drain(..) {
            frames.extend(block);
        }
        self.total_frames = 0;
        frames
    }
}

/// One flushed span of audio, still at the native rate.
#[derive(Debug)]
pub(super) struct Segment {
    pub(super) frames: Vec<f32>,
    pub(super) frame_count: usize,
    pub(super) native_rate: u32,
}

/// State machine over the accumulation buffer. `Accumulating` is the only
/// resting state; a flush is instantaneous and returns straight to it.
pub(super) struct SegmentationEngine {
    policy: SegmentationPolicy,
    native_rate: u32,
    buffer: AccumulationBuffer,
    segment_start: Instant,
    last_active: Instant,
}

impl SegmentationEngine {
    pub(super) fn new(policy: SegmentationPolicy, native_rate: u32, now: Instant) -> Self {
        Self {
            policy,
            native_rate,
            buffer: AccumulationBuffer::new(),
            segment_start: now,
            last_active: now,
        }
    }

    /// Append one block and apply the flush rules at `now`.
    ///
    /// Flush fires when the segment exceeds `max_segment_ms`, or when the
    /// quiet tail exceeds `silence_timeout_ms` and the segment has lasted at
    /// least `min_segment_ms`. A flush with nothing accumulated emits
    /// nothing but still resets the segment clock.
    pub(super) fn push_block(&mut self, frames: &[f32], now: Instant) -> Option<Segment> {
        if !frames.is_empty() {
            self.buffer.append(frames);
        }

        let level = block_level(frames);
        if level > self.policy.silence_threshold {
            self.last_active = now;
        }

        let elapsed_ms = duration_ms(self.segment_start, now);
        let quiet_ms = duration_ms(self.last_active, now);
        let should_flush = elapsed_ms > self.policy.max_segment_ms
            || (quiet_ms > self.policy.silence_timeout_ms
                && elapsed_ms > self.policy.min_segment_ms);
        if !should_flush {
            return None;
        }

        self.segment_start = now;
        self.last_active = now;
        if self.buffer.is_empty() {
            return None;
        }
        let frame_count = self.buffer.total_frames();
        Some(Segment {
            frames: self.buffer.drain(),
            frame_count,
            native_rate: self.native_rate,
        })
    }

    /// Frames currently accumulated; a session drops these on stop rather
    /// than flushing them.
    pub(super) fn pending_frames(&self) -> usize {
        self.buffer.total_frames()
    }
}

fn duration_ms(earlier: Instant, now: Instant) -> u64 {
    now.saturating_duration_since(earlier).as_millis() as u64
}

/// Run the full segmentation-resample-encode pipeline against synthetic
/// stereo PCM with a clock derived from block timing instead of real time.
/// Lets benchmarks and integration tests exercise the pipeline without
/// audio devices. Pending frames at end of input are dropped, matching a
/// live session's stop behavior.
pub fn offline_segment_pcm(
    samples: &[f32],
    native_rate: u32,
    block_frames: usize,
    policy: &SegmentationPolicy,
) -> Vec<EncodedChunk> {
    let block_frames = block_frames.max(1);
    let block_samples = block_frames * 2;
    let start = Instant::now();
    let mut engine = SegmentationEngine::new(policy.clone(), native_rate, start);
    let mut chunks = Vec::new();

    for (index, block) in samples.chunks(block_samples).enumerate() {
        let elapsed_us =
            (index as u64 + 1) * block_frames as u64 * 1_000_000 / u64::from(native_rate.max(1));
        let now = start + Duration::from_micros(elapsed_us);
        if let Some(segment) = engine.push_block(block, now) {
            let resampled = resample_frames(&segment.frames, segment.native_rate, TARGET_RATE);
            chunks.push(encode_wav(&resampled, TARGET_RATE));
        }
    }

    chunks
}
