//! Default values shared between the CLI definition and validation.

pub const DEFAULT_SILENCE_THRESHOLD: u8 = 2;
pub const DEFAULT_SILENCE_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_MAX_SEGMENT_MS: u64 = 60_000;
pub const DEFAULT_MIN_SEGMENT_MS: u64 = 1_000;

pub const DEFAULT_BLOCK_FRAMES: usize = 4_096;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;
pub const DEFAULT_LEVEL_CADENCE_MS: u64 = 16;

pub const DEFAULT_CAPTURE_SECONDS: u64 = 30;
pub const DEFAULT_OUT_DIR: &str = "chunks";

/// Hard ceiling on segment duration so a misconfigured cap cannot buffer
/// unbounded audio in memory.
pub const MAX_SEGMENT_HARD_LIMIT_MS: u64 = 600_000;
