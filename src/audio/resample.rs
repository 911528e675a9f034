//! Sample-rate conversion for the capture pipeline.
//!
//! Two distinct jobs live here: converting a flushed stereo segment to the
//! fixed target rate (frame-pair decimation, optionally upgraded to a sinc
//! resampler), and aligning mono microphone blocks with the system stream's
//! native rate before mixing (linear interpolation, the lighter path).

use crate::log_debug;
#[cfg(feature = "high-quality-audio")]
use anyhow::{anyhow, Result};
#[cfg(feature = "high-quality-audio")]
use rubato::{InterpolationParameters, InterpolationType, Resampler, SincFixedIn, WindowFunction};
use std::cmp::Ordering as CmpOrdering;
#[cfg(feature = "high-quality-audio")]
use std::sync::atomic::{AtomicBool, Ordering};

// Practical device-rate bounds for the sinc path (~0.01x .. 8x against 16 kHz).
#[cfg(feature = "high-quality-audio")]
pub(super) const MIN_NATIVE_RATE: u32 = 2_000;
#[cfg(feature = "high-quality-audio")]
pub(super) const MAX_NATIVE_RATE: u32 = 1_600_000;

#[cfg(feature = "high-quality-audio")]
static SINC_WARNING_SHOWN: AtomicBool = AtomicBool::new(false);

/// Stereo frame count produced by converting `frames` from `native_rate`.
pub(super) fn expected_frames(frames: usize, native_rate: u32, target_rate: u32) -> usize {
    if native_rate == 0 || native_rate == target_rate {
        return frames;
    }
    ((frames as f64) * f64::from(target_rate) / f64::from(native_rate)).round() as usize
}

/// Convert an interleaved stereo segment to `target_rate`.
///
/// Output length is always `expected_frames(..) * 2` (even, valid stereo).
/// The sinc path runs both channels through one resampler call so left and
/// right cannot drift; any sinc failure falls back to decimation once-warned.
pub(super) fn resample_frames(input: &[f32], native_rate: u32, target_rate: u32) -> Vec<f32> {
    if native_rate == 0 || input.is_empty() || native_rate == target_rate {
        return input.to_vec();
    }

    #[cfg(feature = "high-quality-audio")]
    {
        match sinc_resample_frames(input, native_rate, target_rate) {
            Ok(output) => return output,
            Err(err) => {
                if !SINC_WARNING_SHOWN.swap(true, Ordering::AcqRel) {
                    log_debug(&format!(
                        "sinc resampler failed ({err}); falling back to decimation"
                    ));
                }
            }
        }
    }

    decimate_frames(input, native_rate, target_rate)
}

/// Nearest-source-frame decimation. Both channel samples of an output frame
/// always come from the same source frame, so stereo pairing is exact.
pub(super) fn decimate_frames(input: &[f32], native_rate: u32, target_rate: u32) -> Vec<f32> {
    if native_rate == 0 || input.is_empty() || native_rate == target_rate {
        return input.to_vec();
    }
    if input.len() % 2 != 0 {
        log_debug("resample: dropping trailing unpaired sample");
    }
    let frames = input.len() / 2;
    if frames == 0 {
        return Vec::new();
    }

    let ratio = f64::from(native_rate) / f64::from(target_rate);
    let out_frames = expected_frames(frames, native_rate, target_rate);
    let mut output = Vec::with_capacity(out_frames * 2);
    for i in 0..out_frames {
        // Clamp so the last output frame never reads past the input.
        let src = ((i as f64 * ratio).floor() as usize).min(frames - 1);
        output.push(input[src * 2]);
        output.push(input[src * 2 + 1]);
    }
    output
}

#[cfg(feature = "high-quality-audio")]
fn sinc_resample_frames(input: &[f32], native_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    if !(MIN_NATIVE_RATE..=MAX_NATIVE_RATE).contains(&native_rate) {
        return Err(anyhow!(
            "unsupported native sample rate {native_rate}Hz for resampling"
        ));
    }
    if input.len() % 2 != 0 {
        log_debug("resample: dropping trailing unpaired sample");
    }
    let frames = input.len() / 2;
    if frames == 0 {
        return Ok(Vec::new());
    }
    let ratio = f64::from(target_rate) / f64::from(native_rate);

    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for pair in input.chunks_exact(2) {
        left.push(pair[0]);
        right.push(pair[1]);
    }

    let chunk = 256usize;
    let params = InterpolationParameters {
        sinc_len: 64,
        f_cutoff: 0.90,
        interpolation: InterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut rs = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk, 2)
        .map_err(|e| anyhow!("failed to construct sinc resampler: {e:?}"))?;

    let expected = expected_frames(frames, native_rate, target_rate);
    let mut out_left = Vec::with_capacity(expected + 8);
    let mut out_right = Vec::with_capacity(expected + 8);

    let mut idx = 0usize;
    while idx < frames {
        let end = (idx + chunk).min(frames);
        if end == idx {
            return Err(anyhow!("resampler made no progress"));
        }
        let len = end - idx;
        let mut left_seg = vec![left[end - 1]; chunk];
        let mut right_seg = vec![right[end - 1]; chunk];
        left_seg[..len].copy_from_slice(&left[idx..end]);
        right_seg[..len].copy_from_slice(&right[idx..end]);
        let produced = rs
            .process(&[left_seg, right_seg], None)
            .map_err(|e| anyhow!("resampler process failed: {e:?}"))?;
        out_left.extend_from_slice(&produced[0]);
        out_right.extend_from_slice(&produced[1]);
        idx = end;
    }

    let out_left = adjust_block_length(out_left, expected);
    let out_right = adjust_block_length(out_right, expected);
    let mut output = Vec::with_capacity(expected * 2);
    for i in 0..expected {
        output.push(out_left[i]);
        output.push(out_right[i]);
    }
    Ok(output)
}

/// Lightweight linear resampler for mono blocks; phase accuracy matters less
/// than latency on the per-block mic alignment path.
pub(super) fn resample_linear(input: &[f32], ratio: f32) -> Vec<f32> {
    let input_len = input.len();
    let output_len = (input_len as f32 * ratio).round() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_idx = i as f32 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = src_idx - idx as f32;

        if idx + 1 < input_len {
            let sample = input[idx] * (1.0 - frac) + input[idx + 1] * frac;
            output.push(sample);
        } else {
            let pad = input.last().copied().unwrap_or(0.0);
            output.push(pad);
        }
    }

    output
}

pub(super) fn adjust_block_length(mut data: Vec<f32>, desired: usize) -> Vec<f32> {
    match data.len().cmp(&desired) {
        CmpOrdering::Greater => {
            data.truncate(desired);
        }
        CmpOrdering::Less => {
            let pad = *data.last().unwrap_or(&0.0);
            data.resize(desired, pad);
        }
        CmpOrdering::Equal => {}
    }
    data
}

/// Align a mono block from `src_rate` to `dst_rate` at exactly `desired_len`
/// samples, so microphone blocks pair one-to-one with system blocks.
pub(super) fn convert_block_rate(
    block: Vec<f32>,
    src_rate: u32,
    dst_rate: u32,
    desired_len: usize,
) -> Vec<f32> {
    if src_rate == 0 || src_rate == dst_rate {
        return adjust_block_length(block, desired_len);
    }
    let ratio = dst_rate as f32 / src_rate as f32;
    adjust_block_length(resample_linear(&block, ratio), desired_len)
}
