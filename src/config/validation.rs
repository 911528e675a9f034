use super::defaults::MAX_SEGMENT_HARD_LIMIT_MS;
use super::AppConfig;
use anyhow::{bail, Result};
use clap::Parser;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values before any device is touched.
    pub fn validate(&mut self) -> Result<()> {
        const MIN_CAPTURE_SECONDS: u64 = 1;
        const MAX_CAPTURE_SECONDS: u64 = 86_400;

        if !self.list_sources && !(MIN_CAPTURE_SECONDS..=MAX_CAPTURE_SECONDS).contains(&self.seconds)
        {
            bail!(
                "--seconds must be between {MIN_CAPTURE_SECONDS} and {MAX_CAPTURE_SECONDS}, got {}",
                self.seconds
            );
        }

        if self.silence_threshold > 100 {
            bail!(
                "--silence-threshold must be between 0 and 100, got {}",
                self.silence_threshold
            );
        }
        if self.silence_timeout_ms == 0 {
            bail!("--silence-timeout-ms must be greater than 0");
        }
        if self.max_segment_ms == 0 || self.max_segment_ms > MAX_SEGMENT_HARD_LIMIT_MS {
            bail!(
                "--max-segment-ms must be between 1 and {MAX_SEGMENT_HARD_LIMIT_MS} ms, got {}",
                self.max_segment_ms
            );
        }
        if self.min_segment_ms >= self.max_segment_ms {
            bail!(
                "--min-segment-ms ({}) must be less than --max-segment-ms ({})",
                self.min_segment_ms,
                self.max_segment_ms
            );
        }
        if !(64..=1_048_576).contains(&self.block_frames) {
            bail!(
                "--block-frames must be between 64 and 1048576, got {}",
                self.block_frames
            );
        }
        if !(1..=4_096).contains(&self.channel_capacity) {
            bail!(
                "--channel-capacity must be between 1 and 4096, got {}",
                self.channel_capacity
            );
        }
        if !(1..=1_000).contains(&self.level_cadence_ms) {
            bail!(
                "--level-cadence-ms must be between 1 and 1000, got {}",
                self.level_cadence_ms
            );
        }
        if let Some(source) = &self.source {
            if source.trim().is_empty() {
                bail!("--source must not be empty");
            }
        }
        if let Some(mic) = &self.mic_device {
            if mic.trim().is_empty() {
                bail!("--mic-device must not be empty");
            }
        }

        Ok(())
    }
}
