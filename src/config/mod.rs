//! Command-line parsing and validation helpers.

mod defaults;
#[cfg(test)]
mod tests;
mod validation;

use crate::audio::{CaptureConfig, SegmentationPolicy};
use clap::Parser;
use std::path::PathBuf;

pub use defaults::{
    DEFAULT_BLOCK_FRAMES, DEFAULT_CAPTURE_SECONDS, DEFAULT_CHANNEL_CAPACITY,
    DEFAULT_LEVEL_CADENCE_MS, DEFAULT_MAX_SEGMENT_MS, DEFAULT_MIN_SEGMENT_MS, DEFAULT_OUT_DIR,
    DEFAULT_SILENCE_THRESHOLD, DEFAULT_SILENCE_TIMEOUT_MS, MAX_SEGMENT_HARD_LIMIT_MS,
};

/// CLI options for the stereotap capture tool.
#[derive(Debug, Parser, Clone)]
#[command(about = "Capture system audio and microphone into segmented WAV chunks", author, version)]
pub struct AppConfig {
    /// Print capture-capable source names and exit
    #[arg(long = "list-sources", default_value_t = false)]
    pub list_sources: bool,

    /// Capture source device name (defaults to the host default input)
    #[arg(long)]
    pub source: Option<String>,

    /// Enable the microphone channel from the start
    #[arg(short = 'm', long = "mic", default_value_t = false)]
    pub mic: bool,

    /// Microphone device name (defaults to the host default input)
    #[arg(long = "mic-device")]
    pub mic_device: Option<String>,

    /// Directory where emitted WAV chunks are written
    #[arg(long = "out-dir", default_value = defaults::DEFAULT_OUT_DIR)]
    pub out_dir: PathBuf,

    /// Capture duration in seconds before an orderly stop
    #[arg(long, default_value_t = DEFAULT_CAPTURE_SECONDS)]
    pub seconds: u64,

    /// Activity level (0-100) at or below which a block counts as silence
    #[arg(long = "silence-threshold", default_value_t = DEFAULT_SILENCE_THRESHOLD)]
    pub silence_threshold: u8,

    /// Trailing quiet required before a segment flushes (milliseconds)
    #[arg(long = "silence-timeout-ms", default_value_t = DEFAULT_SILENCE_TIMEOUT_MS)]
    pub silence_timeout_ms: u64,

    /// Hard cap on segment duration (milliseconds)
    #[arg(long = "max-segment-ms", default_value_t = DEFAULT_MAX_SEGMENT_MS)]
    pub max_segment_ms: u64,

    /// Minimum segment duration before a silence flush may fire (milliseconds)
    #[arg(long = "min-segment-ms", default_value_t = DEFAULT_MIN_SEGMENT_MS)]
    pub min_segment_ms: u64,

    /// Frames per pipeline block
    #[arg(long = "block-frames", default_value_t = DEFAULT_BLOCK_FRAMES)]
    pub block_frames: usize,

    /// Source-to-pump channel capacity (blocks)
    #[arg(long = "channel-capacity", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,

    /// Level monitor refresh cadence (milliseconds)
    #[arg(long = "level-cadence-ms", default_value_t = DEFAULT_LEVEL_CADENCE_MS)]
    pub level_cadence_ms: u64,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "STEREOTAP_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "STEREOTAP_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Enable verbose timing logs
    #[arg(long)]
    pub log_timings: bool,
}

impl AppConfig {
    /// Snapshot the CLI-controlled segmentation settings for the session.
    pub fn segmentation_policy(&self) -> SegmentationPolicy {
        SegmentationPolicy {
            silence_threshold: self.silence_threshold,
            silence_timeout_ms: self.silence_timeout_ms,
            max_segment_ms: self.max_segment_ms,
            min_segment_ms: self.min_segment_ms,
        }
    }

    /// Snapshot the CLI-controlled plumbing settings for the session.
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            block_frames: self.block_frames,
            channel_capacity: self.channel_capacity,
            level_cadence_ms: self.level_cadence_ms,
        }
    }
}
