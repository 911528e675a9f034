//! Audio capture pipeline: system audio and microphone in, segmented 16 kHz
//! stereo WAV chunks out.
//!
//! The bus is a synthetic stereo pair, system audio on the left channel and
//! conditioned microphone audio on the right, so a downstream consumer can
//! attribute speech to a side. Segmentation runs on silence gaps with hard
//! duration limits; every flushed segment is resampled to 16 kHz and encoded
//! as a standalone WAV chunk.

mod dispatch;
mod encode;
mod level;
mod mixer;
mod resample;
mod segment;
mod session;

#[cfg(test)]
mod tests;

pub use encode::{encode_wav, EncodedChunk};
pub use level::LevelHandle;
pub use mixer::{ChannelGain, MixerGains};
pub use segment::{offline_segment_pcm, SegmentationPolicy};
pub use session::{CaptureConfig, CaptureSession, SessionState};

/// Sample rate of every emitted chunk.
pub const TARGET_RATE: u32 = 16_000;
/// Channel count of every emitted chunk.
pub const TARGET_CHANNELS: u16 = 2;
