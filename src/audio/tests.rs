use super::dispatch::{append_mono_samples, BlockDispatcher};
use super::encode::{sample_to_i16, WAV_HEADER_LEN};
use super::level::{
    goertzel_power, level_from_window, AnalysisSnapshot, LevelHandle, ANALYSIS_WINDOW,
};
use super::mixer::{mix_stereo, ChannelGain, MicConditioner, MixerGains};
use super::resample::{
    adjust_block_length, convert_block_rate, decimate_frames, expected_frames, resample_frames,
    resample_linear,
};
use super::segment::{block_level, SegmentationEngine, SegmentationPolicy};
use super::session::{scale_block_frames, CaptureConfig, CaptureSession, SessionState};
use super::{encode_wav, offline_segment_pcm, TARGET_RATE};
use crate::error::CaptureError;
use crossbeam_channel::bounded;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn stereo_block(frames: usize, value: f32) -> Vec<f32> {
    vec![value; frames * 2]
}

fn sine(len: usize, amplitude: f32, freq_hz: f32, sample_rate: u32) -> Vec<f32> {
    (0..len)
        .map(|i| amplitude * (2.0 * PI * freq_hz * i as f32 / sample_rate as f32).sin())
        .collect()
}

// ---- encoding ----

#[test]
fn wav_header_layout_is_bit_exact() {
    let chunk = encode_wav(&[0.0, 0.5, -0.5, 1.0], 16_000);
    let header = &chunk.data[..WAV_HEADER_LEN];
    assert_eq!(&header[0..4], b"RIFF");
    assert_eq!(&header[4..8], &(36u32 + 8).to_le_bytes());
    assert_eq!(&header[8..16], b"WAVEfmt ");
    assert_eq!(&header[16..20], &16u32.to_le_bytes());
    assert_eq!(&header[20..22], &1u16.to_le_bytes());
    assert_eq!(&header[22..24], &2u16.to_le_bytes());
    assert_eq!(&header[24..28], &16_000u32.to_le_bytes());
    assert_eq!(&header[28..32], &64_000u32.to_le_bytes());
    assert_eq!(&header[32..34], &4u16.to_le_bytes());
    assert_eq!(&header[34..36], &16u16.to_le_bytes());
    assert_eq!(&header[36..40], b"data");
    assert_eq!(&header[40..44], &8u32.to_le_bytes());
}

#[test]
fn wav_length_tracks_sample_count() {
    let samples = vec![0.25f32; 320];
    let chunk = encode_wav(&samples, TARGET_RATE);
    assert_eq!(chunk.data.len(), WAV_HEADER_LEN + 320 * 2);
    assert_eq!(chunk.frame_count, 160);
    assert_eq!(chunk.sample_rate, TARGET_RATE);
    assert_eq!(chunk.channel_count, 2);
}

#[test]
fn sample_scaling_is_asymmetric_and_clamped() {
    assert_eq!(sample_to_i16(-1.0), -32_768);
    assert_eq!(sample_to_i16(1.0), 32_767);
    assert_eq!(sample_to_i16(-0.5), -16_384);
    assert_eq!(sample_to_i16(0.5), 16_383);
    assert_eq!(sample_to_i16(0.0), 0);
    assert_eq!(sample_to_i16(-2.0), -32_768);
    assert_eq!(sample_to_i16(2.0), 32_767);
}

#[test]
fn payload_is_little_endian_pcm16() {
    let chunk = encode_wav(&[0.5, -1.0], TARGET_RATE);
    let payload = &chunk.data[WAV_HEADER_LEN..];
    assert_eq!(&payload[0..2], &16_383i16.to_le_bytes());
    assert_eq!(&payload[2..4], &(-32_768i16).to_le_bytes());
}

// ---- resampling ----

#[test]
fn resample_passthrough_when_rates_match() {
    let input = vec![0.1f32, 0.2, 0.3, 0.4];
    assert_eq!(resample_frames(&input, TARGET_RATE, TARGET_RATE), input);
}

#[test]
fn expected_frames_rounds_to_nearest() {
    assert_eq!(expected_frames(44_100, 44_100, 16_000), 16_000);
    assert_eq!(expected_frames(339_968, 48_000, 16_000), 113_323);
    assert_eq!(expected_frames(48_000, 48_000, 16_000), 16_000);
    assert_eq!(expected_frames(100, 0, 16_000), 100);
}

#[test]
fn resample_produces_exact_frame_count() {
    let input: Vec<f32> = sine(48_000 * 2, 0.5, 440.0, 48_000);
    let output = resample_frames(&input, 48_000, TARGET_RATE);
    assert_eq!(output.len(), expected_frames(48_000, 48_000, TARGET_RATE) * 2);

    let input: Vec<f32> = sine(44_100 * 2, 0.5, 440.0, 44_100);
    let output = resample_frames(&input, 44_100, TARGET_RATE);
    assert_eq!(output.len(), 16_000 * 2);
}

#[test]
fn decimation_keeps_channel_pairs_from_one_source_frame() {
    // Left carries the frame index, right carries index + 1000.
    let frames = 4_800usize;
    let mut input = Vec::with_capacity(frames * 2);
    for i in 0..frames {
        input.push(i as f32);
        input.push(i as f32 + 1_000.0);
    }
    let output = decimate_frames(&input, 48_000, TARGET_RATE);
    assert_eq!(output.len(), 1_600 * 2);
    for pair in output.chunks_exact(2) {
        assert!((pair[1] - pair[0] - 1_000.0).abs() < f32::EPSILON);
    }
    // Nearest-frame selection is monotonic.
    for window in output.chunks_exact(2).collect::<Vec<_>>().windows(2) {
        assert!(window[1][0] >= window[0][0]);
    }
}

#[test]
fn decimation_handles_degenerate_inputs() {
    assert!(decimate_frames(&[], 48_000, TARGET_RATE).is_empty());
    let input = vec![0.5f32, 0.5];
    assert_eq!(decimate_frames(&input, 0, TARGET_RATE), input);
}

#[test]
fn adjust_block_length_truncates_and_pads() {
    assert_eq!(adjust_block_length(vec![1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
    assert_eq!(
        adjust_block_length(vec![1.0, 2.0], 4),
        vec![1.0, 2.0, 2.0, 2.0]
    );
    assert_eq!(adjust_block_length(Vec::new(), 2), vec![0.0, 0.0]);
}

#[test]
fn resample_linear_scales_length() {
    let input = sine(480, 0.5, 200.0, 48_000);
    let output = resample_linear(&input, 2.0);
    assert_eq!(output.len(), 960);
    let output = resample_linear(&input, 1.0 / 3.0);
    assert_eq!(output.len(), 160);
}

#[test]
fn convert_block_rate_pins_output_length() {
    let block = sine(441, 0.5, 200.0, 44_100);
    let output = convert_block_rate(block, 44_100, 48_000, 480);
    assert_eq!(output.len(), 480);

    let block = vec![0.25f32; 100];
    let output = convert_block_rate(block, 16_000, 16_000, 64);
    assert_eq!(output.len(), 64);
}

// ---- mixing ----

#[test]
fn mix_routes_system_left_and_mic_right() {
    let system = vec![0.5f32, -0.5, 0.25];
    let mic = vec![0.1f32, 0.2, 0.3];
    let mut out = Vec::new();
    mix_stereo(&system, &mic, 1.0, 1.0, &mut out);
    assert_eq!(out, vec![0.5, 0.1, -0.5, 0.2, 0.25, 0.3]);
}

#[test]
fn muted_mic_leaves_right_channel_silent() {
    let system = vec![0.5f32; 8];
    let mic = vec![0.9f32; 8];
    let mut out = Vec::new();
    mix_stereo(&system, &mic, 1.0, 0.0, &mut out);
    for pair in out.chunks_exact(2) {
        assert_eq!(pair[0], 0.5);
        assert_eq!(pair[1], 0.0);
    }
}

#[test]
fn short_mic_block_is_padded_with_silence() {
    let system = vec![0.5f32; 4];
    let mic = vec![0.2f32; 2];
    let mut out = Vec::new();
    mix_stereo(&system, &mic, 1.0, 1.0, &mut out);
    assert_eq!(out.len(), 8);
    assert_eq!(out[5], 0.0);
    assert_eq!(out[7], 0.0);
}

#[test]
fn overdriven_samples_are_scaled_not_clipped() {
    let system = vec![2.0f32, -3.0];
    let mic = vec![0.0f32; 2];
    let mut out = Vec::new();
    mix_stereo(&system, &mic, 1.0, 0.0, &mut out);
    assert_eq!(out[0], 1.0);
    assert_eq!(out[2], -1.0);
}

#[test]
fn channel_gain_clamps_and_shares_across_clones() {
    let gain = ChannelGain::new(0.5);
    let clone = gain.clone();
    gain.set(1.5);
    assert_eq!(clone.get(), 1.0);
    gain.set(-0.5);
    assert_eq!(clone.get(), 0.0);
}

#[test]
fn mixer_gains_default_to_system_only() {
    let gains = MixerGains::default();
    assert_eq!(gains.system.get(), 1.0);
    assert_eq!(gains.mic.get(), 0.0);
}

#[test]
fn conditioner_removes_dc_offset() {
    let mut conditioner = MicConditioner::new(16_000);
    let mut block = vec![0.5f32; 1_600];
    conditioner.process_block(&mut block);
    let tail = &block[1_200..];
    let mean: f32 = tail.iter().sum::<f32>() / tail.len() as f32;
    assert!(mean.abs() < 0.05, "residual DC {mean}");
}

#[test]
fn conditioner_tames_loud_input_and_passes_quiet() {
    let mut conditioner = MicConditioner::new(16_000);
    let mut loud = sine(4_800, 0.9, 200.0, 16_000);
    conditioner.process_block(&mut loud);
    let loud_peak = loud[3_200..]
        .iter()
        .fold(0.0f32, |acc, s| acc.max(s.abs()));
    assert!(loud_peak < 0.8, "loud peak {loud_peak}");
    assert!(loud_peak > 0.3, "over-compressed to {loud_peak}");

    let mut conditioner = MicConditioner::new(16_000);
    let mut quiet = sine(4_800, 0.3, 200.0, 16_000);
    conditioner.process_block(&mut quiet);
    let quiet_peak = quiet[3_200..]
        .iter()
        .fold(0.0f32, |acc, s| acc.max(s.abs()));
    assert!((quiet_peak - 0.3).abs() < 0.1, "quiet peak {quiet_peak}");
}

// ---- level monitoring ----

#[test]
fn silence_maps_to_level_zero() {
    let window = vec![0.0f32; ANALYSIS_WINDOW];
    assert_eq!(level_from_window(&window, TARGET_RATE), 0);
}

#[test]
fn louder_windows_report_higher_levels() {
    let loud = sine(ANALYSIS_WINDOW, 1.0, 1_000.0, TARGET_RATE);
    let quiet = sine(ANALYSIS_WINDOW, 0.1, 1_000.0, TARGET_RATE);
    let loud_level = level_from_window(&loud, TARGET_RATE);
    let quiet_level = level_from_window(&quiet, TARGET_RATE);
    assert!(loud_level > quiet_level);
    assert!(loud_level <= 100);
    assert!(quiet_level >= 1);
}

#[test]
fn goertzel_isolates_the_target_tone() {
    let tone = sine(ANALYSIS_WINDOW, 1.0, 1_000.0, TARGET_RATE);
    let on_target = goertzel_power(&tone, TARGET_RATE, 1_000.0);
    let off_target = goertzel_power(&tone, TARGET_RATE, 3_000.0);
    assert!(on_target > off_target * 10.0);
}

#[test]
fn level_handle_round_trips_and_bounds() {
    let handle = LevelHandle::new();
    assert_eq!(handle.get(), 0);
    handle.set(42);
    assert_eq!(handle.get(), 42);
    handle.set(100);
    assert_eq!(handle.get(), 100);
}

#[test]
fn snapshot_keeps_the_freshest_window_tail() {
    let snapshot = AnalysisSnapshot::new();
    let ramp: Vec<f32> = (0..300).map(|i| i as f32).collect();
    snapshot.publish(&ramp);
    let window = snapshot.read();
    assert_eq!(window.len(), ANALYSIS_WINDOW);
    assert_eq!(window[0], (300 - ANALYSIS_WINDOW) as f32);
    assert_eq!(window[ANALYSIS_WINDOW - 1], 299.0);
}

#[test]
fn snapshot_zero_pads_short_blocks() {
    let snapshot = AnalysisSnapshot::new();
    snapshot.publish(&[0.5f32; 100]);
    let window = snapshot.read();
    assert_eq!(window.len(), ANALYSIS_WINDOW);
    assert_eq!(window[0], 0.0);
    assert_eq!(window[ANALYSIS_WINDOW - 1], 0.5);
}

// ---- segmentation ----

#[test]
fn block_level_boosts_rms_and_clamps() {
    assert_eq!(block_level(&stereo_block(1_024, 0.05)), 20);
    assert_eq!(block_level(&stereo_block(1_024, 1.0)), 100);
    assert_eq!(block_level(&[]), 0);
    assert_eq!(block_level(&stereo_block(1_024, 0.0)), 0);
}

#[test]
fn speech_then_silence_flushes_after_the_quiet_tail() {
    // 48 kHz, 4096-frame blocks (~85.3 ms). Roughly five seconds of tone
    // followed by silence; the quiet tail crosses the two-second timeout at
    // block 82, flushing 83 blocks including the silent span.
    let block_frames = 4_096usize;
    let mut samples = Vec::new();
    for block in 0..100usize {
        let value = if block < 59 { 0.05 } else { 0.0 };
        samples.extend(stereo_block(block_frames, value));
    }
    let chunks = offline_segment_pcm(&samples, 48_000, block_frames, &SegmentationPolicy::default());
    assert_eq!(chunks.len(), 1);
    let chunk = &chunks[0];
    assert_eq!(chunk.frame_count, 113_323);
    assert_eq!(chunk.sample_rate, TARGET_RATE);
    assert_eq!(chunk.data.len(), WAV_HEADER_LEN + 113_323 * 2 * 2);
}

#[test]
fn continuous_speech_flushes_at_the_duration_cap() {
    let block_frames = 4_096usize;
    let block_us = block_frames as u64 * 1_000_000 / 48_000;
    let start = Instant::now();
    let mut engine = SegmentationEngine::new(SegmentationPolicy::default(), 48_000, start);
    let block = stereo_block(block_frames, 0.05);

    let mut flushed = None;
    for index in 0..710u64 {
        let now = start + Duration::from_micros((index + 1) * block_us);
        if let Some(segment) = engine.push_block(&block, now) {
            flushed = Some((index, segment));
            break;
        }
    }
    let (index, segment) = flushed.expect("no flush within the duration cap");
    assert_eq!(index, 703);
    assert_eq!(segment.frame_count, 704 * block_frames);
    assert_eq!(segment.native_rate, 48_000);
}

#[test]
fn min_duration_holds_back_early_silence_flushes() {
    let policy = SegmentationPolicy {
        silence_threshold: 2,
        silence_timeout_ms: 1_000,
        max_segment_ms: 60_000,
        min_segment_ms: 3_000,
    };
    let start = Instant::now();
    let mut engine = SegmentationEngine::new(policy, 48_000, start);
    let silent = stereo_block(480, 0.0);

    for index in 0..300u64 {
        let now = start + Duration::from_millis((index + 1) * 10);
        assert!(engine.push_block(&silent, now).is_none(), "flush at {index}");
    }
    let now = start + Duration::from_millis(3_010);
    let segment = engine
        .push_block(&silent, now)
        .expect("flush once past the minimum duration");
    assert_eq!(segment.frame_count, 301 * 480);
}

#[test]
fn empty_flush_resets_the_clock_without_emitting() {
    let start = Instant::now();
    let mut engine = SegmentationEngine::new(SegmentationPolicy::default(), 48_000, start);

    assert!(engine
        .push_block(&[], start + Duration::from_millis(500))
        .is_none());
    // Timeout elapses with nothing accumulated; the clock resets silently.
    assert!(engine
        .push_block(&[], start + Duration::from_millis(2_500))
        .is_none());

    let loud = stereo_block(480, 0.05);
    assert!(engine
        .push_block(&loud, start + Duration::from_millis(3_000))
        .is_none());
    let silent = stereo_block(480, 0.0);
    let segment = engine
        .push_block(&silent, start + Duration::from_millis(5_600))
        .expect("flush after the post-reset timeout");
    assert_eq!(segment.frame_count, 960);
}

#[test]
fn short_gap_resuming_into_speech_does_not_flush() {
    let start = Instant::now();
    let mut engine = SegmentationEngine::new(SegmentationPolicy::default(), 48_000, start);
    let loud = stereo_block(4_800, 0.05);
    for index in 0..10u64 {
        let now = start + Duration::from_millis((index + 1) * 100);
        assert!(engine.push_block(&loud, now).is_none());
    }
    // One second of no pushes, then speech again: activity is updated before
    // the flush check, so the gap alone changes nothing.
    let resumed = start + Duration::from_millis(2_000);
    assert!(engine.push_block(&loud, resumed).is_none());
    assert_eq!(engine.pending_frames(), 11 * 4_800);
}

#[test]
fn gap_in_pushes_flushes_on_the_first_block_after() {
    // A paused session stops pushing blocks; wall-clock time still counts,
    // so the first block after a long gap triggers the silence flush.
    let start = Instant::now();
    let mut engine = SegmentationEngine::new(SegmentationPolicy::default(), 48_000, start);
    let loud = stereo_block(4_800, 0.05);
    for index in 0..10u64 {
        let now = start + Duration::from_millis((index + 1) * 100);
        assert!(engine.push_block(&loud, now).is_none());
    }

    let resumed = start + Duration::from_secs(6);
    let segment = engine
        .push_block(&stereo_block(4_800, 0.0), resumed)
        .expect("flush on first block after the gap");
    assert_eq!(segment.frame_count, 11 * 4_800);
}

#[test]
fn flushed_frames_preserve_push_order() {
    let start = Instant::now();
    let mut engine = SegmentationEngine::new(SegmentationPolicy::default(), 48_000, start);
    for index in 0..5u64 {
        let now = start + Duration::from_millis((index + 1) * 100);
        let block = stereo_block(480, 0.01 * (index + 1) as f32);
        assert!(engine.push_block(&block, now).is_none());
    }
    let segment = engine
        .push_block(&stereo_block(480, 0.0), start + Duration::from_secs(6))
        .expect("flush");
    assert_eq!(segment.frame_count, 6 * 480);
    for index in 0..5usize {
        let expected = 0.01 * (index + 1) as f32;
        assert!((segment.frames[index * 960] - expected).abs() < f32::EPSILON);
    }
}

#[test]
fn short_input_emits_no_chunks() {
    let samples = stereo_block(4_096 * 10, 0.05);
    let chunks = offline_segment_pcm(&samples, 48_000, 4_096, &SegmentationPolicy::default());
    assert!(chunks.is_empty());
}

// ---- dispatch ----

#[test]
fn downmixes_multi_channel_audio() {
    let mut buf = Vec::new();
    let samples = [1.0f32, -1.0, 0.5, 0.5];
    append_mono_samples(&mut buf, &samples, 2, |sample| sample);
    assert_eq!(buf, vec![0.0, 0.5]);
}

#[test]
fn preserves_single_channel_audio() {
    let mut buf = Vec::new();
    let samples = [0.1f32, 0.2, 0.3];
    append_mono_samples(&mut buf, &samples, 1, |sample| sample);
    assert_eq!(buf, samples);
}

#[test]
fn dispatcher_reblocks_into_fixed_sizes() {
    let (tx, rx) = bounded::<Vec<f32>>(8);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = BlockDispatcher::new(4, tx, dropped.clone());

    let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
    dispatcher.push(&samples, 1, |s| s);

    assert_eq!(rx.try_recv().unwrap(), vec![0.0, 1.0, 2.0, 3.0]);
    assert_eq!(rx.try_recv().unwrap(), vec![4.0, 5.0, 6.0, 7.0]);
    assert!(rx.try_recv().is_err());
    assert_eq!(dropped.load(Ordering::Relaxed), 0);

    // The two leftover samples complete the next block.
    dispatcher.push(&[10.0f32, 11.0], 1, |s| s);
    assert_eq!(rx.try_recv().unwrap(), vec![8.0, 9.0, 10.0, 11.0]);
}

#[test]
fn dispatcher_counts_drops_when_the_channel_is_full() {
    let (tx, rx) = bounded::<Vec<f32>>(1);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = BlockDispatcher::new(2, tx, dropped.clone());

    dispatcher.push(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], 1, |s| s);
    assert_eq!(dropped.load(Ordering::Relaxed), 2);
    assert_eq!(rx.try_recv().unwrap(), vec![1.0, 2.0]);
}

// ---- session plumbing ----

#[test]
fn capture_config_defaults_are_sane() {
    let config = CaptureConfig::default();
    assert_eq!(config.block_frames, 4_096);
    assert_eq!(config.channel_capacity, 64);
    assert_eq!(config.level_cadence_ms, 16);
}

#[test]
fn scale_block_frames_tracks_the_rate_ratio() {
    assert_eq!(scale_block_frames(4_096, 48_000, 16_000), 1_365);
    assert_eq!(scale_block_frames(4_096, 48_000, 48_000), 4_096);
    assert_eq!(scale_block_frames(4_096, 0, 16_000), 4_096);
}

#[test]
fn session_lifecycle_without_devices() {
    let (tx, _rx) = bounded(4);
    let mut session = CaptureSession::new(
        CaptureConfig::default(),
        SegmentationPolicy::default(),
        tx,
    );
    assert_eq!(session.state(), SessionState::Idle);

    // Pause is a no-op before capture starts.
    session.set_paused(true);
    assert_eq!(session.state(), SessionState::Idle);

    // The mic cannot attach before the session is capturing.
    assert!(matches!(
        session.set_mic_enabled(true, None),
        Err(CaptureError::ResourceExhausted(_))
    ));

    session.stop();
    assert_eq!(session.state(), SessionState::Stopped);
    session.stop();
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.level_handle().get(), 0);
}
