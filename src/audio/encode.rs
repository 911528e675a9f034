//! WAV container serialization.
//!
//! Produces the minimal 44-byte-header PCM16 container the transcription
//! consumer expects. The layout is bit-exact: downstream parsers seek to
//! fixed offsets rather than walking RIFF chunks.

use super::TARGET_CHANNELS;

pub(super) const WAV_HEADER_LEN: usize = 44;
const BYTES_PER_SAMPLE: u32 = 2;

/// One flushed segment, serialized and ready to hand to the emission sink.
/// The pipeline never reads a chunk again after producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedChunk {
    pub data: Vec<u8>,
    pub frame_count: usize,
    pub sample_rate: u32,
    pub channel_count: u16,
}

/// Serialize interleaved stereo f32 samples into a WAV byte buffer.
///
/// Output is exactly `44 + samples.len() * 2` bytes. Samples are clamped to
/// `[-1, 1]` and scaled asymmetrically: negative values by 32768, everything
/// else by 32767, so both rails are reachable without overflow.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> EncodedChunk {
    let payload_len = samples.len() as u32 * BYTES_PER_SAMPLE;
    let byte_rate = sample_rate * u32::from(TARGET_CHANNELS) * BYTES_PER_SAMPLE;
    let block_align = TARGET_CHANNELS * BYTES_PER_SAMPLE as u16;

    let mut data = Vec::with_capacity(WAV_HEADER_LEN + payload_len as usize);
    data.extend_from_slice(b"RIFF");
    data.extend_from_slice(&(36 + payload_len).to_le_bytes());
    data.extend_from_slice(b"WAVEfmt ");
    data.extend_from_slice(&16u32.to_le_bytes());
    data.extend_from_slice(&1u16.to_le_bytes());
    data.extend_from_slice(&TARGET_CHANNELS.to_le_bytes());
    data.extend_from_slice(&sample_rate.to_le_bytes());
    data.extend_from_slice(&byte_rate.to_le_bytes());
    data.extend_from_slice(&block_align.to_le_bytes());
    data.extend_from_slice(&16u16.to_le_bytes());
    data.extend_from_slice(b"data");
    data.extend_from_slice(&payload_len.to_le_bytes());

    for &sample in samples {
        data.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
    }

    EncodedChunk {
        data,
        frame_count: samples.len() / usize::from(TARGET_CHANNELS),
        sample_rate,
        channel_count: TARGET_CHANNELS,
    }
}

pub(super) fn sample_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped < 0.0 {
        (clamped * 32768.0) as i16
    } else {
        (clamped * 32767.0) as i16
    }
}
