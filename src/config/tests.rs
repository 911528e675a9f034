use super::{
    AppConfig, DEFAULT_BLOCK_FRAMES, DEFAULT_MAX_SEGMENT_MS, DEFAULT_SILENCE_THRESHOLD,
    DEFAULT_SILENCE_TIMEOUT_MS,
};
use clap::Parser;

#[test]
fn defaults_parse_and_validate() {
    let mut cfg = AppConfig::parse_from(["test-app"]);
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.silence_threshold, DEFAULT_SILENCE_THRESHOLD);
    assert_eq!(cfg.silence_timeout_ms, DEFAULT_SILENCE_TIMEOUT_MS);
    assert_eq!(cfg.max_segment_ms, DEFAULT_MAX_SEGMENT_MS);
    assert_eq!(cfg.block_frames, DEFAULT_BLOCK_FRAMES);
    assert!(!cfg.mic);
}

#[test]
fn rejects_seconds_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--seconds", "0"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--seconds", "86401"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn list_sources_skips_duration_checks() {
    let mut cfg = AppConfig::parse_from(["test-app", "--list-sources", "--seconds", "0"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_threshold_above_scale() {
    let mut cfg = AppConfig::parse_from(["test-app", "--silence-threshold", "101"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_zero_silence_timeout() {
    let mut cfg = AppConfig::parse_from(["test-app", "--silence-timeout-ms", "0"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_inverted_segment_durations() {
    let mut cfg = AppConfig::parse_from([
        "test-app",
        "--min-segment-ms",
        "5000",
        "--max-segment-ms",
        "5000",
    ]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from([
        "test-app",
        "--min-segment-ms",
        "1000",
        "--max-segment-ms",
        "5000",
    ]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_segment_cap_above_hard_limit() {
    let mut cfg = AppConfig::parse_from(["test-app", "--max-segment-ms", "600001"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_block_and_channel_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--block-frames", "32"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--channel-capacity", "0"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--level-cadence-ms", "1001"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_blank_device_names() {
    let mut cfg = AppConfig::parse_from(["test-app", "--source", "  "]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--mic-device", ""]);
    assert!(cfg.validate().is_err());
}

#[test]
fn snapshots_mirror_cli_values() {
    let cfg = AppConfig::parse_from([
        "test-app",
        "--silence-timeout-ms",
        "1500",
        "--min-segment-ms",
        "500",
        "--block-frames",
        "2048",
    ]);
    let policy = cfg.segmentation_policy();
    assert_eq!(policy.silence_timeout_ms, 1_500);
    assert_eq!(policy.min_segment_ms, 500);
    let capture = cfg.capture_config();
    assert_eq!(capture.block_frames, 2_048);
}
